use serde::{Deserialize, Serialize};
use thiserror::Error;

// Fixed rig geometry in millimetres. These come from the physical haploscope
// and must not be tuned.
pub const MIN_FOCAL_DISTANCE: f64 = 387.5;
pub const MIN_IOD: f64 = 56.0;
pub const DISPLAY_LEFT_ZERO: f64 = 551.0;
pub const DISPLAY_RIGHT_ZERO: f64 = 1.0;
pub const EYE_LEFT_ZERO: f64 = 31.5;
pub const EYE_RIGHT_ZERO: f64 = 91.0;

/// Smallest focal distance magnitude accepted by the arm rotation math.
const FOCAL_EPSILON: f64 = 1e-6;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("focal distance must be non-zero for arm rotation (got {0} mm)")]
    FocalDistanceTooSmall(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationInput {
    pub iod_mm: f64,
    pub focal_distance_mm: f64,
}

/// Physical rig settings for one (IOD, focal distance) pair.
///
/// Serialises with the key names printed by the rig's original console tools.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    #[serde(rename = "DISPLAY_LEFT")]
    pub display_left: f64,
    #[serde(rename = "DISPLAY_RIGHT")]
    pub display_right: f64,
    #[serde(rename = "EYE_LEFT")]
    pub eye_left: f64,
    #[serde(rename = "EYE_RIGHT")]
    pub eye_right: f64,
    #[serde(rename = "ANGLE")]
    pub angle_degrees: f64,
}

/// Left/right display carriage positions for a focal distance.
///
/// Moving the focal plane away from [`MIN_FOCAL_DISTANCE`] shifts the left
/// carriage back and the right carriage forward by the same amount.
pub fn display_positions(focal_distance: f64) -> (f64, f64) {
    let delta = focal_distance.abs() - MIN_FOCAL_DISTANCE;
    (DISPLAY_LEFT_ZERO - delta, DISPLAY_RIGHT_ZERO + delta)
}

/// Left/right mirror eye positions for an interpupillary distance.
pub fn eye_positions(iod: f64) -> (f64, f64) {
    let delta = (iod.abs() - MIN_IOD) / 2.0;
    (EYE_LEFT_ZERO - delta, EYE_RIGHT_ZERO + delta)
}

/// Mirror arm rotation in degrees: `atan(iod / 2 / focal_distance)`.
pub fn arm_rotation_degrees(iod: f64, focal_distance: f64) -> Result<f64, CalibrationError> {
    if focal_distance.is_nan() || focal_distance.abs() < FOCAL_EPSILON {
        return Err(CalibrationError::FocalDistanceTooSmall(focal_distance));
    }
    Ok((0.5 * iod / focal_distance).atan().to_degrees())
}

pub fn full_calibration(input: CalibrationInput) -> Result<CalibrationResult, CalibrationError> {
    let angle_degrees = arm_rotation_degrees(input.iod_mm, input.focal_distance_mm)?;
    let (display_left, display_right) = display_positions(input.focal_distance_mm);
    let (eye_left, eye_right) = eye_positions(input.iod_mm);
    Ok(CalibrationResult {
        display_left,
        display_right,
        eye_left,
        eye_right,
        angle_degrees,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_zero_iod_gives_zero_angle() {
        assert_eq!(arm_rotation_degrees(0.0, 1000.0), Ok(0.0));
    }

    #[test]
    fn test_zero_focal_distance_is_domain_error() {
        assert_eq!(
            arm_rotation_degrees(64.0, 0.0),
            Err(CalibrationError::FocalDistanceTooSmall(0.0))
        );
        assert!(arm_rotation_degrees(64.0, 5e-7).is_err());
        assert!(arm_rotation_degrees(64.0, f64::NAN).is_err());
    }

    #[test]
    fn test_min_iod_returns_eye_zeros() {
        assert_eq!(eye_positions(MIN_IOD), (EYE_LEFT_ZERO, EYE_RIGHT_ZERO));
    }

    #[test]
    fn test_min_focal_returns_display_zeros() {
        assert_eq!(
            display_positions(MIN_FOCAL_DISTANCE),
            (DISPLAY_LEFT_ZERO, DISPLAY_RIGHT_ZERO)
        );
        // Sign of the focal distance is ignored.
        assert_eq!(
            display_positions(-MIN_FOCAL_DISTANCE),
            (DISPLAY_LEFT_ZERO, DISPLAY_RIGHT_ZERO)
        );
    }

    #[test]
    fn test_reference_configuration() {
        let result = full_calibration(CalibrationInput {
            iod_mm: 64.0,
            focal_distance_mm: 1070.0,
        })
        .unwrap();
        assert_eq!(result.display_left, 551.0 - 682.5);
        assert_eq!(result.display_right, 1.0 + 682.5);
        assert_eq!(result.eye_left, 27.5);
        assert_eq!(result.eye_right, 95.0);
        let expected = (32.0f64 / 1070.0).atan().to_degrees();
        assert!((result.angle_degrees - expected).abs() < 1e-12);
    }

    #[test]
    fn test_full_calibration_propagates_domain_error() {
        let err = full_calibration(CalibrationInput {
            iod_mm: 64.0,
            focal_distance_mm: 0.0,
        });
        assert!(matches!(err, Err(CalibrationError::FocalDistanceTooSmall(_))));
    }

    #[test]
    fn test_result_uses_legacy_keys() {
        let result = full_calibration(CalibrationInput {
            iod_mm: 56.0,
            focal_distance_mm: 387.5,
        })
        .unwrap();
        let json = serde_json::to_string(&result).unwrap();
        for key in ["DISPLAY_LEFT", "DISPLAY_RIGHT", "EYE_LEFT", "EYE_RIGHT", "ANGLE"] {
            assert!(json.contains(key), "missing {key} in {json}");
        }
    }

    proptest! {
        #[test]
        fn prop_display_positions_symmetric(focal in -5000.0f64..5000.0) {
            let (left, right) = display_positions(focal);
            let l = left - DISPLAY_LEFT_ZERO;
            let r = right - DISPLAY_RIGHT_ZERO;
            prop_assert!((l + r).abs() < 1e-9);
        }

        #[test]
        fn prop_eye_positions_symmetric(iod in 0.0f64..120.0) {
            let (left, right) = eye_positions(iod);
            prop_assert!(((left - EYE_LEFT_ZERO) + (right - EYE_RIGHT_ZERO)).abs() < 1e-9);
        }

        #[test]
        fn prop_angle_finite_away_from_zero(iod in 0.0f64..120.0, focal in 1.0f64..5000.0) {
            let angle = arm_rotation_degrees(iod, focal).unwrap();
            prop_assert!(angle.is_finite());
            prop_assert!((0.0..90.0).contains(&angle));
        }
    }
}
