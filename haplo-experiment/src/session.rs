use chrono::{DateTime, Local};
use haplo_calibration::{CalibrationPolicy, TIMER_MS};
use haplo_core::{AbortSignal, Stimulus, TrialRecord};
use haplo_input::{InputArbitrator, InputDevices, InputError};
use haplo_render::{DisplaySurface, RenderError, Scene, StereoDisplays, TextOverlay};
use haplo_timing::Timer;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{ConfigError, ExperimentConfig};
use crate::persist::{save_results, ParticipantInfo, PersistError, SessionMetadata};
use crate::state::TrialRunner;
use crate::trial::TrialError;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Trial(TrialError),

    #[error(transparent)]
    Persist(#[from] PersistError),
}

impl From<RenderError> for SessionError {
    fn from(e: RenderError) -> Self {
        SessionError::Trial(TrialError::Render(e))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Completed(Vec<TrialRecord>),
    /// Trials finished before the quit key; the interrupted trial is not included.
    Aborted {
        completed: Vec<TrialRecord>,
        signal: AbortSignal,
    },
}

impl SessionOutcome {
    pub fn records(&self) -> &[TrialRecord] {
        match self {
            SessionOutcome::Completed(records) => records,
            SessionOutcome::Aborted { completed, .. } => completed,
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, SessionOutcome::Aborted { .. })
    }
}

/// Runs a whole session: instructions, every trial, rest breaks, teardown.
pub struct SessionDriver<'a> {
    config: &'a ExperimentConfig,
    arbitrator: InputArbitrator,
    calibration: CalibrationPolicy,
    prompt: TextOverlay,
}

impl<'a> SessionDriver<'a> {
    pub fn new(config: &'a ExperimentConfig) -> Result<Self, SessionError> {
        config.validate()?;
        Ok(Self {
            config,
            arbitrator: config.arbitrator()?,
            calibration: config.calibration_policy(),
            prompt: config.prompt_overlay(),
        })
    }

    /// Presentation order: as loaded, or shuffled (seeded when configured).
    pub fn order_stimuli(&self, mut stimuli: Vec<Stimulus>) -> Vec<Stimulus> {
        if self.config.session.shuffle {
            let mut rng = match self.config.session.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            };
            stimuli.shuffle(&mut rng);
            info!("stimulus order shuffled (seed {:?})", self.config.session.seed);
        }
        stimuli
    }

    /// Runs every trial, then closes displays and the keypad whatever happened.
    pub fn run<D, T>(
        &self,
        stimuli: &[Stimulus],
        displays: &mut StereoDisplays<D>,
        devices: &mut InputDevices<'_>,
        timer: &mut T,
    ) -> Result<SessionOutcome, SessionError>
    where
        D: DisplaySurface,
        T: Timer,
    {
        info!(
            "{} trials; keyboard responses {}, keypad {}",
            stimuli.len(),
            if self.config.keyboard_responses { "on" } else { "off" },
            if devices.has_keypad() { "connected" } else { "absent" }
        );
        let outcome = self.run_trials(stimuli, displays, devices, timer);
        displays.close();
        devices.close();

        let stats = timer.frame_stats();
        info!(
            "frame timing: {} frames, {:.3} ms average, {:.3} ms jitter, {:.1} fps",
            stats.samples,
            stats.average_frame_time_ns / 1e6,
            stats.jitter_ns / 1e6,
            stats.effective_fps
        );
        if stats.average_frame_time_ns / 1e6 > TIMER_MS {
            warn!(
                "average frame time {:.3} ms is slower than the rig refresh period ({} ms)",
                stats.average_frame_time_ns / 1e6,
                TIMER_MS
            );
        }
        outcome
    }

    fn run_trials<D, T>(
        &self,
        stimuli: &[Stimulus],
        displays: &mut StereoDisplays<D>,
        devices: &mut InputDevices<'_>,
        timer: &mut T,
    ) -> Result<SessionOutcome, SessionError>
    where
        D: DisplaySurface,
        T: Timer,
    {
        let session = &self.config.session;
        let total = stimuli.len();
        let mut completed = Vec::with_capacity(total);

        if session.show_instructions {
            let text = self.config.instructions_text();
            if let Err(signal) = self.wait_on_message(&text, displays, devices, &*timer)? {
                return Ok(SessionOutcome::Aborted { completed, signal });
            }
        }

        let runner = TrialRunner::new(
            &self.arbitrator,
            &self.calibration,
            self.config.durations(),
            self.config.prompt.policy,
        )
        .log_calibration(self.config.calibration.log_to_console);

        for (i, stimulus) in stimuli.iter().enumerate() {
            let trial_index = i + 1;
            let result = match runner.prepare(trial_index, stimulus, &self.prompt) {
                Ok(ctx) => runner.run(&ctx, displays, devices, timer),
                Err(e) => Err(e),
            };
            match result {
                Ok(record) => completed.push(record),
                Err(TrialError::Abort(signal)) => {
                    warn!(
                        "session aborted during trial {}/{} by '{}'",
                        trial_index, total, signal.key
                    );
                    return Ok(SessionOutcome::Aborted { completed, signal });
                }
                Err(e) => return Err(SessionError::Trial(e)),
            }

            let every = session.rest_break_every;
            if every > 0 && trial_index % every == 0 && trial_index < total {
                info!("rest break after trial {}", trial_index);
                let text = self.config.rest_text(trial_index, total);
                if let Err(signal) = self.wait_on_message(&text, displays, devices, &*timer)? {
                    return Ok(SessionOutcome::Aborted { completed, signal });
                }
            }
        }

        info!("session complete: {} trials", completed.len());
        Ok(SessionOutcome::Completed(completed))
    }

    /// Shows `text` on both eyes until a continue key (or any keypad
    /// response) arrives. The outer error is a display failure; the inner one
    /// is a quit.
    fn wait_on_message<D, T>(
        &self,
        text: &str,
        displays: &mut StereoDisplays<D>,
        devices: &mut InputDevices<'_>,
        timer: &T,
    ) -> Result<Result<(), AbortSignal>, RenderError>
    where
        D: DisplaySurface,
        T: Timer,
    {
        let overlay = TextOverlay::centered(text, self.config.display.text_height_px);
        let interval = self.config.durations().poll_interval;
        devices.clear();
        loop {
            displays.present(&Scene::Message(&overlay))?;
            match self
                .arbitrator
                .poll_continue(devices, &self.config.session.continue_keys)
            {
                Some(Ok(key)) => {
                    info!("continuing on '{}'", key);
                    devices.clear();
                    return Ok(Ok(()));
                }
                Some(Err(signal)) => return Ok(Err(signal)),
                None => timer.sleep(interval),
            }
        }
    }

    /// Persists the outcome unless it was aborted and `save_on_abort` is off.
    pub fn finish(
        &self,
        outcome: &SessionOutcome,
        participant: &ParticipantInfo,
        started_at: DateTime<Local>,
    ) -> Result<Option<PathBuf>, SessionError> {
        if outcome.is_aborted() && !self.config.session.save_on_abort {
            warn!(
                "session aborted; discarding {} completed trials",
                outcome.records().len()
            );
            return Ok(None);
        }

        let abort_key = match outcome {
            SessionOutcome::Aborted { signal, .. } => Some(signal.key.clone()),
            SessionOutcome::Completed(_) => None,
        };
        let metadata = SessionMetadata {
            experiment_name: self.config.experiment_name.clone(),
            participant: participant.clone(),
            started_at,
            finished_at: Local::now(),
            trial_count: outcome.records().len(),
            aborted: outcome.is_aborted(),
            abort_key,
            instructions: self.config.instructions_text(),
            config: self.config.clone(),
        };
        let path = save_results(self.config, outcome.records(), &metadata)?;
        Ok(Some(path))
    }
}
