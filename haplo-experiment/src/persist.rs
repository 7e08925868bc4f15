//! Results on disk: one CSV row per trial plus a JSON session document.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use haplo_core::TrialRecord;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::config::ExperimentConfig;

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv output failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("session metadata encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{field} '{value}' cannot be used in a file name")]
    InvalidName { field: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub participant: String,
    pub session: String,
}

impl Default for ParticipantInfo {
    fn default() -> Self {
        Self {
            participant: "unknown".to_string(),
            session: "1".to_string(),
        }
    }
}

impl ParticipantInfo {
    /// Both values become part of the results file name.
    pub fn validate(&self) -> Result<(), PersistError> {
        for (field, value) in [("participant", &self.participant), ("session", &self.session)] {
            if !is_file_name_component(value) {
                return Err(PersistError::InvalidName {
                    field,
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Non-empty and free of path separators, so it cannot leave its directory.
pub(crate) fn is_file_name_component(value: &str) -> bool {
    !value.trim().is_empty() && !value.contains(['/', '\\', '\0'])
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionMetadata {
    pub experiment_name: String,
    #[serde(flatten)]
    pub participant: ParticipantInfo,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub trial_count: usize,
    pub aborted: bool,
    pub abort_key: Option<String>,
    pub instructions: String,
    pub config: ExperimentConfig,
}

/// `<results>/<experiment>_<participant>_<session>.csv`
pub fn results_path(config: &ExperimentConfig, info: &ParticipantInfo) -> PathBuf {
    config.results_directory.join(format!(
        "{}_{}_{}.csv",
        config.experiment_name, info.participant, info.session
    ))
}

/// Writes the trial rows and, next to them, the session metadata (`.json`).
/// Returns the CSV path.
pub fn save_results(
    config: &ExperimentConfig,
    records: &[TrialRecord],
    metadata: &SessionMetadata,
) -> Result<PathBuf, PersistError> {
    metadata.participant.validate()?;
    let dir = &config.results_directory;
    std::fs::create_dir_all(dir).map_err(|source| PersistError::Io {
        path: dir.clone(),
        source,
    })?;

    let csv_path = results_path(config, &metadata.participant);
    write_rows(&csv_path, &config.data_fields, &metadata.participant, records)?;

    let json_path = csv_path.with_extension("json");
    let json = serde_json::to_string_pretty(metadata)?;
    std::fs::write(&json_path, json).map_err(|source| PersistError::Io {
        path: json_path.clone(),
        source,
    })?;

    info!(
        "saved {} trials to {} (metadata {})",
        records.len(),
        csv_path.display(),
        json_path.display()
    );
    Ok(csv_path)
}

fn write_rows(
    path: &Path,
    header: &[String],
    info: &ParticipantInfo,
    records: &[TrialRecord],
) -> Result<(), PersistError> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(header)?;
    for record in records {
        wtr.write_record(header.iter().map(|field| match field.as_str() {
            "participant" => info.participant.clone(),
            name => record.field(name).unwrap_or_default(),
        }))?;
    }
    wtr.flush().map_err(|source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}
