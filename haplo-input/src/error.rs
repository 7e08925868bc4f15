use thiserror::Error;

#[derive(Error, Debug)]
pub enum InputError {
    #[error("no response device configured: enable keyboard responses or a serial keypad")]
    NoResponseDevice,

    #[error("at least one quit key is required")]
    EmptyQuitKeys,

    #[error("response mapping is empty")]
    EmptyResponseMapping,

    #[error("key '{0}' is configured both as a quit key and a response key")]
    OverlappingKeys(String),

    #[error("failed to open serial keypad on {port}: {source}")]
    KeypadOpen {
        port: String,
        #[source]
        source: serialport::Error,
    },
}
