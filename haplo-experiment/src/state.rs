use std::time::Duration;

use haplo_calibration::CalibrationPolicy;
use haplo_core::{PromptPolicy, Stimulus, TrialPhase, TrialRecord};
use haplo_input::{AcceptedResponse, InputArbitrator, InputDevices, InputEvent, PollMode};
use haplo_render::{DisplaySurface, Scene, StereoDisplays, TextOverlay};
use haplo_timing::Timer;
use tracing::{debug, info};

use crate::trial::{TrialContext, TrialDurations, TrialError};

/// Onsets and counters gathered while a trial runs.
#[derive(Debug, Default)]
struct TrialTimestamps {
    stimulus_onset: Option<u64>,
    prompt_onset: Option<u64>,
    last_flip: Option<u64>,
    stimulus_frames: u32,
}

/// Drives one trial through its phases on a pair of displays.
///
/// A polling cycle is: check the phase deadline, draw and flip both eyes,
/// poll input once, sleep the poll interval. Quit is honoured in every
/// polling cycle; the first accepted response ends the trial.
pub struct TrialRunner<'a> {
    arbitrator: &'a InputArbitrator,
    calibration: &'a CalibrationPolicy,
    durations: TrialDurations,
    prompt_policy: PromptPolicy,
    log_calibration: bool,
}

impl<'a> TrialRunner<'a> {
    pub fn new(
        arbitrator: &'a InputArbitrator,
        calibration: &'a CalibrationPolicy,
        durations: TrialDurations,
        prompt_policy: PromptPolicy,
    ) -> Self {
        Self {
            arbitrator,
            calibration,
            durations,
            prompt_policy,
            log_calibration: false,
        }
    }

    /// Log per-trial calibration at info instead of debug.
    pub fn log_calibration(mut self, enabled: bool) -> Self {
        self.log_calibration = enabled;
        self
    }

    /// Resolves calibration for `stimulus`; done once, before fixation.
    pub fn prepare<'s>(
        &self,
        trial_index: usize,
        stimulus: &'s Stimulus,
        prompt: &'s TextOverlay,
    ) -> Result<TrialContext<'s>, TrialError> {
        let calibration = self
            .calibration
            .resolve(stimulus.iod_mm, stimulus.focal_distance_mm)?;
        if self.log_calibration {
            info!(
                "trial {} calibration: iod {:.2} mm ({:?}), focal {:.2} mm ({:?}), displays {:.3}/{:.3}, eyes {:.3}/{:.3}, arm {:.4} deg",
                trial_index,
                calibration.iod_mm,
                calibration.iod_source,
                calibration.focal_distance_mm,
                calibration.focal_source,
                calibration.result.display_left,
                calibration.result.display_right,
                calibration.result.eye_left,
                calibration.result.eye_right,
                calibration.result.angle_degrees,
            );
        } else {
            debug!(trial = trial_index, ?calibration, "calibration resolved");
        }
        Ok(TrialContext {
            trial_index,
            stimulus,
            prompt,
            calibration,
        })
    }

    /// Runs fixation through response and returns the trial's record.
    ///
    /// A quit key yields `Err(TrialError::Abort)`; nothing is recorded.
    pub fn run<D, T>(
        &self,
        ctx: &TrialContext<'_>,
        displays: &mut StereoDisplays<D>,
        devices: &mut InputDevices<'_>,
        timer: &mut T,
    ) -> Result<TrialRecord, TrialError>
    where
        D: DisplaySurface,
        T: Timer,
    {
        let calibration_metadata = serde_json::to_string(&ctx.calibration)?;
        let mut stamps = TrialTimestamps::default();
        let mut response: Option<AcceptedResponse> = None;
        let mut phase = TrialPhase::default();

        info!("trial {} ({}) started", ctx.trial_index, ctx.stimulus.id);

        while phase != TrialPhase::Complete {
            debug!(trial = ctx.trial_index, ?phase, at_ns = timer.now(), "phase entered");
            match phase {
                TrialPhase::Fixation => {
                    displays.present(&Scene::Fixation)?;
                    timer.sleep(self.durations.fixation);
                    // Quit pressed during fixation still counts; responses do not.
                    if let Some(InputEvent::Quit(signal)) =
                        self.arbitrator.poll(devices, PollMode::QuitOnly, &*timer)
                    {
                        info!("trial {} aborted by '{}'", ctx.trial_index, signal.key);
                        return Err(signal.into());
                    }
                    devices.clear();
                }
                _ => {
                    response = self.poll_phase(phase, ctx, displays, devices, timer, &mut stamps)?;
                }
            }

            let Some(next) = phase.next(response.is_some()) else {
                break;
            };
            if next == TrialPhase::ResponseWait && self.prompt_policy == PromptPolicy::Deferred {
                devices.clear();
            }
            phase = next;
        }

        Ok(self.record(ctx, response, &stamps, calibration_metadata))
    }

    fn phase_limit(&self, phase: TrialPhase) -> Option<Duration> {
        match phase {
            TrialPhase::StimulusPresentation => Some(self.durations.stimulus),
            TrialPhase::PromptDisplay => Some(self.durations.prompt),
            _ => None,
        }
    }

    fn poll_phase<D, T>(
        &self,
        phase: TrialPhase,
        ctx: &TrialContext<'_>,
        displays: &mut StereoDisplays<D>,
        devices: &mut InputDevices<'_>,
        timer: &mut T,
        stamps: &mut TrialTimestamps,
    ) -> Result<Option<AcceptedResponse>, TrialError>
    where
        D: DisplaySurface,
        T: Timer,
    {
        let limit = self.phase_limit(phase);
        let mode = if phase.collects_responses(self.prompt_policy) {
            PollMode::Responses
        } else {
            PollMode::QuitOnly
        };
        let scene = Scene::Stereo {
            left: &ctx.stimulus.left_image,
            right: &ctx.stimulus.right_image,
            prompt: phase.shows_prompt().then_some(ctx.prompt),
        };

        let entered = timer.now();
        loop {
            // The stimulus gets at least one frame so its onset always exists.
            let first_stimulus_frame =
                phase == TrialPhase::StimulusPresentation && stamps.stimulus_onset.is_none();
            if !first_stimulus_frame && limit.is_some_and(|limit| timer.elapsed(entered) >= limit) {
                return Ok(None);
            }

            displays.present(&scene)?;
            let flipped = timer.now();
            if let Some(prev) = stamps.last_flip {
                timer.record_frame(Duration::from_nanos(flipped.saturating_sub(prev)));
            }
            stamps.last_flip = Some(flipped);
            if phase == TrialPhase::StimulusPresentation {
                stamps.stimulus_onset.get_or_insert(flipped);
                stamps.stimulus_frames += 1;
            }
            if phase.shows_prompt() {
                stamps.prompt_onset.get_or_insert(flipped);
            }

            match self.arbitrator.poll(devices, mode, &*timer) {
                Some(InputEvent::Quit(signal)) => {
                    info!("trial {} aborted by '{}'", ctx.trial_index, signal.key);
                    return Err(signal.into());
                }
                Some(InputEvent::Response(accepted)) => return Ok(Some(accepted)),
                None => {}
            }

            timer.sleep(self.durations.poll_interval);
        }
    }

    fn record(
        &self,
        ctx: &TrialContext<'_>,
        response: Option<AcceptedResponse>,
        stamps: &TrialTimestamps,
        calibration_metadata: String,
    ) -> TrialRecord {
        let since = |onset: Option<u64>, at: u64| match onset {
            Some(onset) if at >= onset => (at - onset) as f64 / 1e9,
            _ => f64::NAN,
        };
        let (response_key, response_label, response_source, rt_s, rt_prompt_s) = match response {
            Some(r) => {
                let rt_s = since(stamps.stimulus_onset, r.accepted_at_ns);
                let rt_prompt_s = since(stamps.prompt_onset, r.accepted_at_ns);
                info!(
                    "trial {}: response '{}' ({}) via {}, RT = {:.3} s",
                    ctx.trial_index,
                    r.symbol,
                    r.label,
                    r.source.as_str(),
                    rt_s
                );
                (r.symbol, r.label, r.source.as_str().to_string(), rt_s, rt_prompt_s)
            }
            None => (String::new(), String::new(), String::new(), f64::NAN, f64::NAN),
        };

        let stimulus = ctx.stimulus;
        TrialRecord {
            trial_index: ctx.trial_index,
            stimulus_id: stimulus.id.clone(),
            stimulus_label: stimulus.label.clone().unwrap_or_default(),
            response_key,
            response_label,
            response_source,
            rt_s,
            rt_prompt_s,
            stimulus_duration_s: self.durations.stimulus.as_secs_f64(),
            fixation_duration_s: self.durations.fixation.as_secs_f64(),
            prompt_duration_s: self.durations.prompt.as_secs_f64(),
            stimulus_frames: stamps.stimulus_frames,
            left_image: stimulus.left_image.display().to_string(),
            right_image: stimulus.right_image.display().to_string(),
            stimulus_metadata: stimulus.metadata_json(),
            calibration_metadata,
        }
    }
}
