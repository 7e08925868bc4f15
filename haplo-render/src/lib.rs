pub mod error;
pub mod render;
pub mod surface;
pub mod text;

pub use error::RenderError;
pub use render::EyeCanvas;
pub use surface::{DisplaySurface, Scene, StereoDisplays, TextOverlay};
pub use text::{find_font, load_font, FontArc};
