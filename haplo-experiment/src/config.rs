//! Experiment configuration.
//!
//! Loaded from TOML, every field optional, then validated before any display
//! or device is opened. Command-line flags are applied on top by the binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use haplo_calibration::{CalibrationPolicy, LEFT_VIEWPORT, RIGHT_VIEWPORT};
use haplo_core::{InvalidViewport, PromptPolicy, ResponseMapping, TrialRecord, Viewport};
use haplo_input::{InputArbitrator, InputError};
use haplo_render::TextOverlay;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::persist::is_file_name_component;
use crate::trial::TrialDurations;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Viewport(#[from] InvalidViewport),

    #[error(transparent)]
    Input(#[from] InputError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub experiment_name: String,
    /// CSV header, in column order.
    pub data_fields: Vec<String>,
    pub stimulus_duration_s: f64,
    pub fixation_duration_s: f64,
    pub prompt_duration_s: f64,
    /// Response symbol to label, in display order.
    pub response_keys: ResponseMapping,
    pub quit_keys: Vec<String>,
    pub stimulus_directory: PathBuf,
    pub results_directory: PathBuf,
    /// Single shared window with side-by-side eyes, debug calibration values.
    pub debug_mode: bool,
    /// Accept responses from the keyboard as well as the keypad.
    pub keyboard_responses: bool,
    /// Sleep between polling cycles.
    pub poll_interval_ms: u64,
    pub display: DisplayConfig,
    pub calibration: CalibrationConfig,
    pub keypad: KeypadConfig,
    pub prompt: PromptConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub left_screen_index: usize,
    pub right_screen_index: usize,
    pub fullscreen: bool,
    pub window_size: [u32; 2],
    pub background_color: [u8; 3],
    /// Sub-rectangle of the left window to draw into.
    pub left_viewport: Option<Viewport>,
    pub right_viewport: Option<Viewport>,
    /// Fall back to the rig's measured viewports when none is configured.
    pub use_rig_viewports: bool,
    pub debug_window_size: [u32; 2],
    pub debug_screen_index: usize,
    pub font_path: Option<PathBuf>,
    pub fixation_size_px: u32,
    pub text_height_px: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub iod_override_mm: Option<f64>,
    pub focal_override_mm: Option<f64>,
    pub default_iod_mm: f64,
    pub default_focal_mm: f64,
    pub debug_iod_mm: Option<f64>,
    pub debug_focal_mm: Option<f64>,
    /// Log each trial's calibration at info rather than debug.
    pub log_to_console: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeypadConfig {
    pub port: Option<String>,
    pub baud: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    pub policy: PromptPolicy,
    /// Defaults to a question built from the response labels.
    pub text: Option<String>,
    pub height_px: f32,
    /// Offset from the display centre, y up.
    pub position: [f32; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub show_instructions: bool,
    /// Rest break after every N trials; 0 disables breaks.
    pub rest_break_every: usize,
    pub continue_keys: Vec<String>,
    pub shuffle: bool,
    pub seed: Option<u64>,
    /// Persist completed trials when the session is aborted.
    pub save_on_abort: bool,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        let mut data_fields = vec!["participant".to_string()];
        data_fields.extend(TrialRecord::FIELDS.iter().map(|f| f.to_string()));
        Self {
            experiment_name: "johnston_stereopsis".to_string(),
            data_fields,
            stimulus_duration_s: 1.5,
            fixation_duration_s: 0.75,
            prompt_duration_s: 0.75,
            response_keys: [("1", "squashed"), ("2", "stretched")].into_iter().collect(),
            quit_keys: vec!["escape".to_string()],
            stimulus_directory: PathBuf::from("stimuli"),
            results_directory: PathBuf::from("data"),
            debug_mode: false,
            keyboard_responses: true,
            poll_interval_ms: 10,
            display: DisplayConfig::default(),
            calibration: CalibrationConfig::default(),
            keypad: KeypadConfig::default(),
            prompt: PromptConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            left_screen_index: 1,
            right_screen_index: 0,
            fullscreen: true,
            window_size: [1280, 720],
            background_color: [0, 0, 0],
            left_viewport: None,
            right_viewport: None,
            use_rig_viewports: false,
            debug_window_size: [1024, 768],
            debug_screen_index: 0,
            font_path: None,
            fixation_size_px: 40,
            text_height_px: 32.0,
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        let policy = CalibrationPolicy::default();
        Self {
            iod_override_mm: None,
            focal_override_mm: None,
            default_iod_mm: policy.default_iod_mm,
            default_focal_mm: policy.default_focal_mm,
            debug_iod_mm: None,
            debug_focal_mm: None,
            log_to_console: false,
        }
    }
}

impl Default for KeypadConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud: 9600,
        }
    }
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            policy: PromptPolicy::default(),
            text: None,
            height_px: 32.0,
            position: [0.0, -300.0],
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            show_instructions: true,
            rest_break_every: 0,
            continue_keys: vec!["space".to_string()],
            shuffle: false,
            seed: None,
            save_on_abort: false,
        }
    }
}

impl ExperimentConfig {
    /// Reads and validates a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ExperimentConfig =
            toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_file_name_component(&self.experiment_name) {
            return Err(ConfigError::Invalid(format!(
                "experiment_name '{}' must be non-empty and contain no path separators",
                self.experiment_name
            )));
        }

        for (name, value) in [
            ("stimulus_duration_s", self.stimulus_duration_s),
            ("fixation_duration_s", self.fixation_duration_s),
            ("prompt_duration_s", self.prompt_duration_s),
        ] {
            seconds(name, value)?;
        }
        if seconds("stimulus_duration_s", self.stimulus_duration_s)?.is_zero() {
            return Err(ConfigError::Invalid(
                "stimulus_duration_s must be at least one nanosecond".into(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be positive".into()));
        }

        // Quit/response overlap and emptiness.
        self.arbitrator()?;

        if !self.keyboard_responses && self.keypad.port.is_none() {
            return Err(InputError::NoResponseDevice.into());
        }

        let needs_continue = self.session.show_instructions || self.session.rest_break_every > 0;
        if needs_continue && self.session.continue_keys.is_empty() {
            return Err(ConfigError::Invalid(
                "continue_keys is empty but instructions or rest breaks are enabled".into(),
            ));
        }
        if let Some(k) = self
            .session
            .continue_keys
            .iter()
            .find(|k| self.quit_keys.contains(k))
        {
            return Err(ConfigError::Invalid(format!(
                "key '{k}' is both a continue key and a quit key"
            )));
        }

        for field in &self.data_fields {
            if field != "participant" && !TrialRecord::FIELDS.contains(&field.as_str()) {
                return Err(ConfigError::Invalid(format!("unknown data field '{field}'")));
            }
        }

        let [w, h] = self.window_size();
        Viewport::full(w, h).validate()?;
        if let Some(vp) = self.display.left_viewport {
            vp.validate()?;
        }
        if let Some(vp) = self.display.right_viewport {
            vp.validate()?;
        }

        let cal = &self.calibration;
        for (name, value) in [
            ("default_iod_mm", Some(cal.default_iod_mm)),
            ("default_focal_mm", Some(cal.default_focal_mm)),
            ("iod_override_mm", cal.iod_override_mm),
            ("focal_override_mm", cal.focal_override_mm),
            ("debug_iod_mm", cal.debug_iod_mm),
            ("debug_focal_mm", cal.debug_focal_mm),
        ] {
            if let Some(v) = value {
                if !v.is_finite() {
                    return Err(ConfigError::Invalid(format!("{name} must be finite")));
                }
            }
        }

        if self.keypad.baud == 0 {
            return Err(ConfigError::Invalid("keypad baud rate must be positive".into()));
        }
        Ok(())
    }

    pub fn calibration_policy(&self) -> CalibrationPolicy {
        let cal = &self.calibration;
        CalibrationPolicy {
            iod_override_mm: cal.iod_override_mm,
            focal_override_mm: cal.focal_override_mm,
            debug_mode: self.debug_mode,
            debug_iod_mm: cal.debug_iod_mm,
            debug_focal_mm: cal.debug_focal_mm,
            default_iod_mm: cal.default_iod_mm,
            default_focal_mm: cal.default_focal_mm,
        }
    }

    pub fn arbitrator(&self) -> Result<InputArbitrator, InputError> {
        InputArbitrator::new(self.quit_keys.clone(), self.response_keys.clone())
    }

    /// Phase durations. Values `validate` would reject come out as zero.
    pub fn durations(&self) -> TrialDurations {
        let secs = |v: f64| Duration::try_from_secs_f64(v).unwrap_or_default();
        TrialDurations {
            fixation: secs(self.fixation_duration_s),
            stimulus: secs(self.stimulus_duration_s),
            prompt: secs(self.prompt_duration_s),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }

    /// Window size in use: the debug window in debug mode.
    pub fn window_size(&self) -> [u32; 2] {
        if self.debug_mode {
            self.display.debug_window_size
        } else {
            self.display.window_size
        }
    }

    /// Per-eye viewports: configured, else the rig's, else the whole surface.
    pub fn eye_viewports(&self, surface: [u32; 2]) -> (Viewport, Viewport) {
        let [w, h] = surface;
        let full = Viewport::full(w, h);
        let (rig_left, rig_right) = if self.display.use_rig_viewports {
            (Some(LEFT_VIEWPORT), Some(RIGHT_VIEWPORT))
        } else {
            (None, None)
        };
        let left = self.display.left_viewport.or(rig_left).unwrap_or(full);
        let right = self.display.right_viewport.or(rig_right).unwrap_or(full);
        (left.clamp_to(w, h), right.clamp_to(w, h))
    }

    pub fn prompt_overlay(&self) -> TextOverlay {
        let text = self.prompt.text.clone().unwrap_or_else(|| {
            let options: Vec<String> = self
                .response_keys
                .iter()
                .map(|(key, label)| format!("{label} ({key})"))
                .collect();
            format!("{}?", options.join(" or "))
        });
        let [x, y] = self.prompt.position;
        TextOverlay::new(text, (x, y), self.prompt.height_px)
    }

    pub fn instructions_text(&self) -> String {
        let continue_key = self
            .session
            .continue_keys
            .first()
            .map(String::as_str)
            .unwrap_or("space");
        let quit_key = self.quit_keys.first().map(String::as_str).unwrap_or("escape");
        format!(
            "Stereo shape judgement\n\n\
             Judge whether the half-cylinder appears squashed or stretched.\n\n\
             Response keys:\n{}\n\n\
             Each stimulus is shown for {} s after a fixation cross.\n\
             Press {} to begin. Press {} at any time to exit.",
            self.response_keys.describe(),
            self.stimulus_duration_s,
            continue_key.to_uppercase(),
            quit_key.to_uppercase(),
        )
    }

    pub fn rest_text(&self, completed: usize, total: usize) -> String {
        let continue_key = self
            .session
            .continue_keys
            .first()
            .map(String::as_str)
            .unwrap_or("space");
        format!(
            "Take a short break.\n\n{completed} of {total} trials done.\n\nPress {} to continue.",
            continue_key.to_uppercase()
        )
    }
}

/// Seconds as a `Duration`; negative, non-finite and overflowing values are errors.
fn seconds(name: &str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|_| {
        ConfigError::Invalid(format!(
            "{name} must be a non-negative number of seconds, got {value}"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ExperimentConfig::default();
        config.validate().unwrap();
        assert_eq!(config.data_fields[0], "participant");
        assert_eq!(config.data_fields.len(), TrialRecord::FIELDS.len() + 1);
        assert_eq!(config.response_keys.label("2"), Some("stretched"));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: ExperimentConfig = toml::from_str(
            r#"
            stimulus_duration_s = 2.0
            debug_mode = true

            [response_keys]
            "4" = "squashed"
            "6" = "stretched"

            [calibration]
            iod_override_mm = 70.0

            [prompt]
            policy = "deferred"
            "#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.stimulus_duration_s, 2.0);
        assert_eq!(config.fixation_duration_s, 0.75);
        assert_eq!(config.response_keys.symbols().collect::<Vec<_>>(), ["4", "6"]);
        assert_eq!(config.prompt.policy, PromptPolicy::Deferred);
        assert_eq!(config.window_size(), [1024, 768]);

        let policy = config.calibration_policy();
        assert!(policy.debug_mode);
        assert_eq!(policy.iod_override_mm, Some(70.0));
        assert_eq!(policy.default_focal_mm, 1070.0);
    }

    #[test]
    fn load_reports_missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = ExperimentConfig::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Read { .. }));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "stimulus_duration_s = \"long\"").unwrap();
        assert!(matches!(
            ExperimentConfig::load(&bad),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn quit_key_cannot_be_a_response() {
        let mut config = ExperimentConfig::default();
        config.quit_keys = vec!["1".into()];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Input(InputError::OverlappingKeys(k))) if k == "1"
        ));
    }

    #[test]
    fn some_response_device_is_required() {
        let mut config = ExperimentConfig::default();
        config.keyboard_responses = false;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Input(InputError::NoResponseDevice))
        ));
        config.keypad.port = Some("/dev/ttyUSB0".into());
        config.validate().unwrap();
    }

    #[test]
    fn degenerate_viewport_is_rejected() {
        let mut config = ExperimentConfig::default();
        config.display.right_viewport = Some(Viewport {
            x: 0,
            y: 0,
            width: 0,
            height: 100,
        });
        assert!(matches!(config.validate(), Err(ConfigError::Viewport(_))));
    }

    #[test]
    fn unknown_data_field_is_rejected() {
        let mut config = ExperimentConfig::default();
        config.data_fields.push("shoe_size".into());
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn negative_duration_is_rejected() {
        let mut config = ExperimentConfig::default();
        config.prompt_duration_s = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn experiment_name_must_be_a_plain_file_name() {
        let mut config = ExperimentConfig::default();
        config.experiment_name = "../johnston".into();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        config.experiment_name = "  ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn durations_must_fit_a_duration() {
        let mut config = ExperimentConfig::default();
        config.stimulus_duration_s = 1e20;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        assert_eq!(config.durations().stimulus, Duration::ZERO);

        config.stimulus_duration_s = 1.5;
        config.fixation_duration_s = f64::INFINITY;
        assert!(config.validate().is_err());
    }

    #[test]
    fn stimulus_duration_below_a_nanosecond_is_rejected() {
        let mut config = ExperimentConfig::default();
        config.stimulus_duration_s = 1e-10;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.stimulus_duration_s = 1e-9;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn prompt_text_follows_response_keys() {
        let config = ExperimentConfig::default();
        let prompt = config.prompt_overlay();
        assert_eq!(prompt.text, "squashed (1) or stretched (2)?");
        assert_eq!(prompt.position, (0.0, -300.0));
    }

    #[test]
    fn rig_viewports_are_clamped_to_the_surface() {
        let mut config = ExperimentConfig::default();
        config.display.use_rig_viewports = true;
        let (left, right) = config.eye_viewports([3840, 2160]);
        assert_eq!(left, LEFT_VIEWPORT);
        assert_eq!(right, RIGHT_VIEWPORT);

        config.display.use_rig_viewports = false;
        let (left, _) = config.eye_viewports([800, 600]);
        assert_eq!(left, Viewport::full(800, 600));
    }

    #[test]
    fn instructions_list_the_mapping() {
        let text = ExperimentConfig::default().instructions_text();
        assert!(text.contains("1 = squashed\n2 = stretched"));
        assert!(text.contains("SPACE"));
    }
}
