//! Haploscope rig geometry.
//!
//! Converts interpupillary distance (IOD) and focal distance into the physical
//! carriage, eye and mirror-arm settings of the rig. Everything here is pure:
//! results are recomputed per trial and never cached.

pub mod geometry;
pub mod resolve;
pub mod rig;

pub use geometry::{
    arm_rotation_degrees, display_positions, eye_positions, full_calibration, CalibrationError,
    CalibrationInput, CalibrationResult, DISPLAY_LEFT_ZERO, DISPLAY_RIGHT_ZERO, EYE_LEFT_ZERO,
    EYE_RIGHT_ZERO, MIN_FOCAL_DISTANCE, MIN_IOD,
};
pub use resolve::{CalibrationPolicy, ResolvedCalibration, ValueSource};
pub use rig::{MonitorSpec, LEFT_VIEWPORT, MONITOR_SPEC, RIGHT_VIEWPORT, TIMER_MS};
