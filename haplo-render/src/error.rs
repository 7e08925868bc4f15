use std::path::PathBuf;

use haplo_core::InvalidViewport;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("failed to load image {path}: {source}")]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("image {path} has unusable dimensions {width}x{height}")]
    ImageSize {
        path: PathBuf,
        width: u32,
        height: u32,
    },

    #[error("failed to load font {path}: {reason}")]
    Font { path: PathBuf, reason: String },

    #[error("no font available for text rendering")]
    MissingFont,

    #[error("cannot allocate a {width}x{height} canvas")]
    Canvas { width: u32, height: u32 },

    #[error(transparent)]
    Viewport(#[from] InvalidViewport),

    #[error("presentation failed: {0}")]
    Present(String),
}
