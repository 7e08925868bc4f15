pub mod simulated;
pub mod timer;

pub use simulated::SimulatedTimer;
pub use timer::{FrameStats, HighPrecisionTimer, Timer};
