use serde::{Deserialize, Serialize};

use crate::geometry::{full_calibration, CalibrationError, CalibrationInput, CalibrationResult};

/// Where a resolved calibration value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueSource {
    Override,
    Debug,
    Stimulus,
    Default,
}

/// Session-wide inputs for per-trial calibration.
///
/// Precedence per value: explicit override, then the debug value (debug mode
/// only), then stimulus metadata, then the configured default.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationPolicy {
    pub iod_override_mm: Option<f64>,
    pub focal_override_mm: Option<f64>,
    pub debug_mode: bool,
    pub debug_iod_mm: Option<f64>,
    pub debug_focal_mm: Option<f64>,
    pub default_iod_mm: f64,
    pub default_focal_mm: f64,
}

impl Default for CalibrationPolicy {
    fn default() -> Self {
        Self {
            iod_override_mm: None,
            focal_override_mm: None,
            debug_mode: false,
            debug_iod_mm: None,
            debug_focal_mm: None,
            default_iod_mm: 64.0,
            default_focal_mm: 1070.0,
        }
    }
}

/// Calibration attached verbatim to a trial record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedCalibration {
    pub iod_mm: f64,
    pub focal_distance_mm: f64,
    pub iod_source: ValueSource,
    pub focal_source: ValueSource,
    #[serde(flatten)]
    pub result: CalibrationResult,
}

impl CalibrationPolicy {
    fn pick(
        &self,
        override_mm: Option<f64>,
        debug_mm: Option<f64>,
        stimulus_mm: Option<f64>,
        default_mm: f64,
    ) -> (f64, ValueSource) {
        if let Some(v) = override_mm {
            (v, ValueSource::Override)
        } else if let Some(v) = debug_mm.filter(|_| self.debug_mode) {
            (v, ValueSource::Debug)
        } else if let Some(v) = stimulus_mm {
            (v, ValueSource::Stimulus)
        } else {
            (default_mm, ValueSource::Default)
        }
    }

    /// Resolves IOD and focal distance for one stimulus and runs the rig math.
    pub fn resolve(
        &self,
        stimulus_iod_mm: Option<f64>,
        stimulus_focal_mm: Option<f64>,
    ) -> Result<ResolvedCalibration, CalibrationError> {
        let (iod_mm, iod_source) = self.pick(
            self.iod_override_mm,
            self.debug_iod_mm,
            stimulus_iod_mm,
            self.default_iod_mm,
        );
        let (focal_distance_mm, focal_source) = self.pick(
            self.focal_override_mm,
            self.debug_focal_mm,
            stimulus_focal_mm,
            self.default_focal_mm,
        );
        let result = full_calibration(CalibrationInput {
            iod_mm,
            focal_distance_mm,
        })?;
        Ok(ResolvedCalibration {
            iod_mm,
            focal_distance_mm,
            iod_source,
            focal_source,
            result,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_beats_stimulus_metadata() {
        let policy = CalibrationPolicy {
            iod_override_mm: Some(70.0),
            ..Default::default()
        };
        let resolved = policy.resolve(Some(60.0), None).unwrap();
        assert_eq!(resolved.iod_mm, 70.0);
        assert_eq!(resolved.iod_source, ValueSource::Override);
        assert_eq!(resolved.focal_distance_mm, 1070.0);
        assert_eq!(resolved.focal_source, ValueSource::Default);
    }

    #[test]
    fn stimulus_beats_default() {
        let policy = CalibrationPolicy::default();
        let resolved = policy.resolve(Some(60.0), Some(800.0)).unwrap();
        assert_eq!(resolved.iod_mm, 60.0);
        assert_eq!(resolved.focal_distance_mm, 800.0);
        assert_eq!(resolved.iod_source, ValueSource::Stimulus);
    }

    #[test]
    fn debug_values_only_apply_in_debug_mode() {
        let mut policy = CalibrationPolicy {
            debug_iod_mm: Some(58.0),
            ..Default::default()
        };
        assert_eq!(policy.resolve(Some(60.0), None).unwrap().iod_mm, 60.0);

        policy.debug_mode = true;
        let resolved = policy.resolve(Some(60.0), None).unwrap();
        assert_eq!(resolved.iod_mm, 58.0);
        assert_eq!(resolved.iod_source, ValueSource::Debug);

        policy.iod_override_mm = Some(66.0);
        assert_eq!(policy.resolve(Some(60.0), None).unwrap().iod_mm, 66.0);
    }

    #[test]
    fn zero_focal_override_fails() {
        let policy = CalibrationPolicy {
            focal_override_mm: Some(0.0),
            ..Default::default()
        };
        assert!(policy.resolve(None, Some(900.0)).is_err());
    }

    #[test]
    fn metadata_serialises_flat() {
        let resolved = CalibrationPolicy::default().resolve(None, None).unwrap();
        let value = serde_json::to_value(resolved).unwrap();
        assert_eq!(value["iod_source"], "default");
        assert_eq!(value["EYE_LEFT"], 27.5);
    }
}
