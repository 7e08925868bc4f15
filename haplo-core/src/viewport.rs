use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("viewport must have positive dimensions (got {width}x{height})")]
pub struct InvalidViewport {
    pub width: u32,
    pub height: u32,
}

/// Pixel sub-rectangle of a window that one eye's image is drawn into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub const fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    /// Builds a viewport from `[start, end)` corner coordinates.
    pub const fn from_bounds(start_x: u32, start_y: u32, end_x: u32, end_y: u32) -> Self {
        Self {
            x: start_x,
            y: start_y,
            width: end_x.saturating_sub(start_x),
            height: end_y.saturating_sub(start_y),
        }
    }

    pub fn validate(&self) -> Result<(), InvalidViewport> {
        if self.width == 0 || self.height == 0 {
            return Err(InvalidViewport {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }

    /// Left and right halves, for two eyes sharing one window.
    pub fn split_horizontal(&self) -> (Viewport, Viewport) {
        let left_width = self.width / 2;
        let left = Viewport {
            width: left_width,
            ..*self
        };
        let right = Viewport {
            x: self.x + left_width,
            width: self.width - left_width,
            ..*self
        };
        (left, right)
    }

    /// Clamps the viewport to a `width` x `height` surface.
    pub fn clamp_to(&self, width: u32, height: u32) -> Viewport {
        let x = self.x.min(width);
        let y = self.y.min(height);
        Viewport {
            x,
            y,
            width: self.width.min(width - x),
            height: self.height.min(height - y),
        }
    }
}
