pub mod config;
pub mod loader;
pub mod persist;
pub mod session;
pub mod state;
pub mod trial;

pub use config::{
    CalibrationConfig, ConfigError, DisplayConfig, ExperimentConfig, KeypadConfig, PromptConfig,
    SessionConfig,
};
pub use loader::{load_stimulus_pairs, StimulusError};
pub use persist::{results_path, save_results, ParticipantInfo, PersistError, SessionMetadata};
pub use session::{SessionDriver, SessionError, SessionOutcome};
pub use state::TrialRunner;
pub use trial::{TrialContext, TrialDurations, TrialError};
