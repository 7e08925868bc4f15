use serde::{Deserialize, Serialize};

/// One completed trial. Created when the trial ends and never mutated after.
///
/// `rt_s` is measured from stimulus onset and is NaN when no response was
/// collected; `rt_prompt_s` is measured from prompt onset and is NaN when the
/// response came before the prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub trial_index: usize,
    pub stimulus_id: String,
    pub stimulus_label: String,
    pub response_key: String,
    pub response_label: String,
    pub response_source: String,
    pub rt_s: f64,
    pub rt_prompt_s: f64,
    pub stimulus_duration_s: f64,
    pub fixation_duration_s: f64,
    pub prompt_duration_s: f64,
    pub stimulus_frames: u32,
    pub left_image: String,
    pub right_image: String,
    pub stimulus_metadata: String,
    pub calibration_metadata: String,
}

impl TrialRecord {
    pub const FIELDS: &'static [&'static str] = &[
        "trial_index",
        "stimulus_id",
        "stimulus_label",
        "response_key",
        "response_label",
        "response_source",
        "rt_s",
        "rt_prompt_s",
        "stimulus_duration_s",
        "fixation_duration_s",
        "prompt_duration_s",
        "stimulus_frames",
        "left_image",
        "right_image",
        "stimulus_metadata",
        "calibration_metadata",
    ];

    pub fn responded(&self) -> bool {
        !self.response_key.is_empty()
    }

    /// Column value by header name, formatted for delimited output.
    pub fn field(&self, name: &str) -> Option<String> {
        Some(match name {
            "trial_index" => self.trial_index.to_string(),
            "stimulus_id" => self.stimulus_id.clone(),
            "stimulus_label" => self.stimulus_label.clone(),
            "response_key" => self.response_key.clone(),
            "response_label" => self.response_label.clone(),
            "response_source" => self.response_source.clone(),
            "rt_s" => self.rt_s.to_string(),
            "rt_prompt_s" => self.rt_prompt_s.to_string(),
            "stimulus_duration_s" => self.stimulus_duration_s.to_string(),
            "fixation_duration_s" => self.fixation_duration_s.to_string(),
            "prompt_duration_s" => self.prompt_duration_s.to_string(),
            "stimulus_frames" => self.stimulus_frames.to_string(),
            "left_image" => self.left_image.clone(),
            "right_image" => self.right_image.clone(),
            "stimulus_metadata" => self.stimulus_metadata.clone(),
            "calibration_metadata" => self.calibration_metadata.clone(),
            _ => return None,
        })
    }
}
