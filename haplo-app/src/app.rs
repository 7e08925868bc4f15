use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Local;
use haplo_core::{Stimulus, Viewport};
use haplo_experiment::{
    load_stimulus_pairs, ExperimentConfig, ParticipantInfo, SessionDriver, SessionOutcome,
};
use haplo_input::{open_serial_keypad, InputDevices, KeyboardDevice, PortKeypad, ResponseKeypad};
use haplo_render::{find_font, EyeCanvas, FontArc, StereoDisplays};
use haplo_timing::HighPrecisionTimer;
use tracing::{info, warn};

use crate::stage::{SharedStage, Stage, WindowPlan, WindowSurface, WinitKeyboard};

/// Where each eye lands: window index and viewport within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EyePlacement {
    pub window: usize,
    pub viewport: Viewport,
}

/// Windows to open. Debug mode shares one window between both eyes.
pub fn window_plan(config: &ExperimentConfig) -> Vec<WindowPlan> {
    let display = &config.display;
    if config.debug_mode {
        return vec![WindowPlan {
            title: format!("{} (debug)", config.experiment_name),
            monitor: display.debug_screen_index,
            size: display.debug_window_size,
            fullscreen: false,
            eyes: 2,
        }];
    }
    let eye = |name: &str, monitor: usize| WindowPlan {
        title: format!("{} {}", config.experiment_name, name),
        monitor,
        size: display.window_size,
        fullscreen: display.fullscreen,
        eyes: 1,
    };
    vec![
        eye("left eye", display.left_screen_index),
        eye("right eye", display.right_screen_index),
    ]
}

/// Per-eye placement once the window sizes are known.
pub fn eye_placements(
    config: &ExperimentConfig,
    sizes: &[[u32; 2]],
) -> Result<(EyePlacement, EyePlacement)> {
    if config.debug_mode {
        let [w, h] = *sizes.first().context("debug window missing")?;
        let (left, right) = Viewport::full(w, h).split_horizontal();
        return Ok((
            EyePlacement { window: 0, viewport: left },
            EyePlacement { window: 0, viewport: right },
        ));
    }
    let (Some(left_size), Some(right_size)) = (sizes.first(), sizes.get(1)) else {
        bail!("expected two eye windows, found {}", sizes.len());
    };
    let (left, _) = config.eye_viewports(*left_size);
    let (_, right) = config.eye_viewports(*right_size);
    Ok((
        EyePlacement { window: 0, viewport: left },
        EyePlacement { window: 1, viewport: right },
    ))
}

/// Prints the calibration each stimulus would get, without opening a window.
pub fn dry_run(config: &ExperimentConfig) -> Result<()> {
    let driver = SessionDriver::new(config)?;
    let stimuli = load_stimuli(config, &driver)?;
    let policy = config.calibration_policy();

    println!(
        "{:<24} {:>8} {:>10} {:>10} {:>10} {:>10} {:>10} {:>8}",
        "stimulus", "iod", "focal", "DISP_L", "DISP_R", "EYE_L", "EYE_R", "ARM"
    );
    for stimulus in &stimuli {
        match policy.resolve(stimulus.iod_mm, stimulus.focal_distance_mm) {
            Ok(cal) => println!(
                "{:<24} {:>8.1} {:>10.1} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>8.3}",
                stimulus.id,
                cal.iod_mm,
                cal.focal_distance_mm,
                cal.result.display_left,
                cal.result.display_right,
                cal.result.eye_left,
                cal.result.eye_right,
                cal.result.angle_degrees,
            ),
            Err(e) => println!("{:<24} error: {}", stimulus.id, e),
        }
    }
    println!("{} stimuli", stimuli.len());
    Ok(())
}

/// Waits for one key on the configured keypad and reports it.
pub fn check_keypad(config: &ExperimentConfig, seconds: f64) -> Result<()> {
    let port = config
        .keypad
        .port
        .as_deref()
        .context("No keypad port configured (use --serial-port)")?;
    let max_wait = Duration::try_from_secs_f64(seconds).with_context(|| {
        format!("--check-keypad needs a non-negative number of seconds, got {seconds}")
    })?;
    let mut keypad = open_serial_keypad(port, config.keypad.baud)?;
    let allowed: Vec<&str> = config.response_keys.symbols().collect();
    println!("Press one of [{}] on the keypad...", allowed.join(", "));

    let timer = HighPrecisionTimer::new();
    let key = keypad.wait_for_key(&allowed, max_wait, &timer);
    keypad.close();
    match key {
        Some(key) => {
            let label = config.response_keys.label(&key).unwrap_or("?");
            println!("Received '{}' ({})", key, label);
            Ok(())
        }
        None => bail!("No keypad response within {} s", seconds),
    }
}

pub fn run_experiment(config: &ExperimentConfig, participant: &ParticipantInfo) -> Result<()> {
    let driver = SessionDriver::new(config)?;
    let stimuli = load_stimuli(config, &driver)?;

    let font = find_font(config.display.font_path.as_deref())
        .context("No usable font for text screens")?;
    let mut timer = HighPrecisionTimer::new();
    let close_key = config.quit_keys.first().map(String::as_str).unwrap_or("escape");

    let plan = window_plan(config);
    let window_count = plan.len();
    let stage = Stage::open(plan, timer.clone(), close_key)?;
    let sizes: Vec<[u32; 2]> = {
        let s = stage.borrow();
        (0..window_count).filter_map(|i| s.surface_size(i)).collect()
    };
    let (left, right) = eye_placements(config, &sizes)?;
    info!(
        "eye viewports: left {:?} in window {}, right {:?} in window {}",
        left.viewport, left.window, right.viewport, right.window
    );

    let mut left = eye_surface(config, &stage, left, font.clone())?;
    let mut right = eye_surface(config, &stage, right, font)?;
    for stimulus in &stimuli {
        left.preload(&stimulus.left_image)?;
        right.preload(&stimulus.right_image)?;
    }
    let mut displays = StereoDisplays::new(left, right);

    let mut keyboard = WinitKeyboard::new(stage.clone());
    let mut keypad = open_response_keypad(config)?;
    let mut devices = InputDevices::new(
        Some(&mut keyboard as &mut dyn KeyboardDevice),
        keypad.as_mut().map(|k| k as &mut dyn ResponseKeypad),
        config.keyboard_responses,
    )?;

    let started_at = Local::now();
    info!(
        "session start: participant {}, session {}, {} trials",
        participant.participant,
        participant.session,
        stimuli.len()
    );
    let outcome = driver.run(&stimuli, &mut displays, &mut devices, &mut timer)?;
    match &outcome {
        SessionOutcome::Completed(records) => info!("session complete: {} trials", records.len()),
        SessionOutcome::Aborted { completed, signal } => warn!(
            "session aborted by '{}' after {} trials",
            signal.key,
            completed.len()
        ),
    }

    if let Some(path) = driver.finish(&outcome, participant, started_at)? {
        info!("results saved to {}", path.display());
    }
    Ok(())
}

/// Opens the configured keypad. A keypad that fails to open is dropped with a
/// warning while the keyboard can still take responses.
pub fn open_response_keypad(config: &ExperimentConfig) -> Result<Option<PortKeypad>> {
    let Some(port) = config.keypad.port.as_deref() else {
        return Ok(None);
    };
    match open_serial_keypad(port, config.keypad.baud) {
        Ok(k) => Ok(Some(k)),
        Err(e) if config.keyboard_responses => {
            warn!("{}; continuing with keyboard responses only", e);
            Ok(None)
        }
        Err(e) => Err(e).context("Keypad is the only response device"),
    }
}

fn load_stimuli(config: &ExperimentConfig, driver: &SessionDriver<'_>) -> Result<Vec<Stimulus>> {
    let stimuli = load_stimulus_pairs(&config.stimulus_directory).with_context(|| {
        format!(
            "Failed to load stimuli from {}",
            config.stimulus_directory.display()
        )
    })?;
    info!("{} stimulus pairs loaded", stimuli.len());
    Ok(driver.order_stimuli(stimuli))
}

fn eye_surface(
    config: &ExperimentConfig,
    stage: &SharedStage,
    placement: EyePlacement,
    font: FontArc,
) -> Result<WindowSurface> {
    let [r, g, b] = config.display.background_color;
    let canvas = EyeCanvas::new(
        placement.viewport.width,
        placement.viewport.height,
        [r, g, b, 255],
        Some(font),
        config.display.fixation_size_px,
    )?;
    Ok(WindowSurface::new(
        stage.clone(),
        placement.window,
        placement.viewport,
        canvas,
    ))
}
