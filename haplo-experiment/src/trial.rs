use std::time::Duration;

use haplo_calibration::{CalibrationError, ResolvedCalibration};
use haplo_core::{AbortSignal, Stimulus};
use haplo_render::{RenderError, TextOverlay};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialDurations {
    pub fixation: Duration,
    pub stimulus: Duration,
    pub prompt: Duration,
    /// Sleep between polling cycles.
    pub poll_interval: Duration,
}

/// Inputs of one trial, fixed before the first phase runs.
#[derive(Debug, Clone)]
pub struct TrialContext<'a> {
    pub trial_index: usize,
    pub stimulus: &'a Stimulus,
    pub prompt: &'a TextOverlay,
    pub calibration: ResolvedCalibration,
}

#[derive(Error, Debug)]
pub enum TrialError {
    #[error(transparent)]
    Abort(#[from] AbortSignal),

    #[error("calibration failed: {0}")]
    Calibration(#[from] CalibrationError),

    #[error("display failed: {0}")]
    Render(#[from] RenderError),

    #[error("failed to encode calibration metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}

impl TrialError {
    pub fn is_abort(&self) -> bool {
        matches!(self, TrialError::Abort(_))
    }
}
