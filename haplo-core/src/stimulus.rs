use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A stereo image pair plus its sidecar metadata. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stimulus {
    pub id: String,
    pub left_image: PathBuf,
    pub right_image: PathBuf,
    pub label: Option<String>,
    pub metadata: Map<String, Value>,
    pub disparity_px: Option<f64>,
    pub curvature_mm: Option<f64>,
    pub iod_mm: Option<f64>,
    pub focal_distance_mm: Option<f64>,
}

impl Stimulus {
    /// Builds a stimulus, pulling numeric fields and the label out of `metadata`.
    pub fn new(
        id: impl Into<String>,
        left_image: impl Into<PathBuf>,
        right_image: impl Into<PathBuf>,
        metadata: Map<String, Value>,
    ) -> Self {
        let id = id.into();
        let number = |key: &str| metadata.get(key).and_then(Value::as_f64);
        Self {
            label: infer_label(&id, &metadata),
            disparity_px: number("disparity_px"),
            curvature_mm: number("curvature_mm"),
            iod_mm: number("iod_mm"),
            focal_distance_mm: number("focal_distance_mm"),
            id,
            left_image: left_image.into(),
            right_image: right_image.into(),
            metadata,
        }
    }

    /// Compact JSON with sorted keys; `{}` when there is no metadata.
    pub fn metadata_json(&self) -> String {
        Value::Object(self.metadata.clone()).to_string()
    }
}

/// Label from explicit metadata, else from the stimulus id.
///
/// The id fallback is a case-insensitive substring heuristic ("squash",
/// "stretch"); new stimulus sets should carry an explicit `label`.
pub fn infer_label(id: &str, metadata: &Map<String, Value>) -> Option<String> {
    if let Some(label) = metadata.get("label") {
        return Some(match label {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
    }
    let lowered = id.to_lowercase();
    if lowered.contains("squash") {
        Some("squashed".to_string())
    } else if lowered.contains("stretch") {
        Some("stretched".to_string())
    } else {
        None
    }
}
