pub mod abort;
pub mod phase;
pub mod response;
pub mod stimulus;
pub mod trial;
pub mod viewport;

pub use abort::AbortSignal;
pub use phase::{PromptPolicy, TrialPhase};
pub use response::ResponseMapping;
pub use stimulus::{infer_label, Stimulus};
pub use trial::TrialRecord;
pub use viewport::{InvalidViewport, Viewport};
