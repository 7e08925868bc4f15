use thiserror::Error;

/// Quit requested by the participant or experimenter.
///
/// Expected control flow rather than a failure: it travels up to the session
/// driver, which tears devices down and skips the aborted trial's data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("aborted by quit key '{key}'")]
pub struct AbortSignal {
    pub key: String,
}

impl AbortSignal {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}
