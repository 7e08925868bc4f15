use std::path::{Path, PathBuf};

use haplo_core::Stimulus;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum StimulusError {
    #[error("stimulus directory {0} does not exist")]
    MissingDirectory(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("right-eye image missing for {left}: expected {expected}")]
    MissingRightImage { left: PathBuf, expected: PathBuf },

    #[error("stimulus sidecar {path} must contain a JSON object: {reason}")]
    MalformedSidecar { path: PathBuf, reason: String },

    #[error("no stereo pairs (*_L.png with matching *_R.png) found in {0}")]
    NoStimuli(PathBuf),
}

/// Loads every `<base>_L.png` / `<base>_R.png` pair in `dir`, sorted by file
/// name, with an optional `<base>.json` metadata sidecar.
pub fn load_stimulus_pairs(dir: &Path) -> Result<Vec<Stimulus>, StimulusError> {
    if !dir.is_dir() {
        return Err(StimulusError::MissingDirectory(dir.to_path_buf()));
    }
    let io_err = |source| StimulusError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut lefts: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(io_err)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with("_L.png"))
        })
        .collect();
    lefts.sort();

    let mut stimuli = Vec::with_capacity(lefts.len());
    for left in lefts {
        let Some(base) = left
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_suffix("_L.png"))
            .map(str::to_string)
        else {
            continue;
        };

        let right = dir.join(format!("{base}_R.png"));
        if !right.is_file() {
            return Err(StimulusError::MissingRightImage {
                left,
                expected: right,
            });
        }

        let metadata = read_sidecar(&dir.join(format!("{base}.json")))?;
        let stimulus = Stimulus::new(base, left, right, metadata);
        debug!(
            id = %stimulus.id,
            label = stimulus.label.as_deref().unwrap_or(""),
            "loaded stimulus pair"
        );
        stimuli.push(stimulus);
    }

    if stimuli.is_empty() {
        return Err(StimulusError::NoStimuli(dir.to_path_buf()));
    }
    info!("{} stimuli loaded from {}", stimuli.len(), dir.display());
    Ok(stimuli)
}

fn read_sidecar(path: &Path) -> Result<Map<String, Value>, StimulusError> {
    if !path.exists() {
        return Ok(Map::new());
    }
    let content = std::fs::read_to_string(path).map_err(|source| StimulusError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    match serde_json::from_str::<Value>(&content) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(StimulusError::MalformedSidecar {
            path: path.to_path_buf(),
            reason: format!("found {}", json_kind(&other)),
        }),
        Err(e) => Err(StimulusError::MalformedSidecar {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
