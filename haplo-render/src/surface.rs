use std::path::Path;

use crate::error::RenderError;

/// One eye's display: a back buffer that is drawn into and then flipped.
///
/// `flip` presents the back buffer and leaves a cleared one behind, so every
/// cycle redraws its whole scene.
pub trait DisplaySurface {
    fn draw_image(&mut self, path: &Path) -> Result<(), RenderError>;

    /// `position` is in pixels from the surface centre, y up.
    fn draw_text(
        &mut self,
        text: &str,
        position: (f32, f32),
        height: f32,
    ) -> Result<(), RenderError>;

    fn draw_fixation(&mut self) -> Result<(), RenderError>;

    fn flip(&mut self) -> Result<(), RenderError>;

    fn close(&mut self);
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextOverlay {
    pub text: String,
    pub position: (f32, f32),
    pub height: f32,
}

impl TextOverlay {
    pub fn new(text: impl Into<String>, position: (f32, f32), height: f32) -> Self {
        Self {
            text: text.into(),
            position,
            height,
        }
    }

    pub fn centered(text: impl Into<String>, height: f32) -> Self {
        Self::new(text, (0.0, 0.0), height)
    }
}

/// What both eyes see during one cycle.
#[derive(Debug, Clone, Copy)]
pub enum Scene<'a> {
    Fixation,
    Stereo {
        left: &'a Path,
        right: &'a Path,
        prompt: Option<&'a TextOverlay>,
    },
    Message(&'a TextOverlay),
}

/// The two eye displays, driven in lock-step.
///
/// Both back buffers are drawn before either flip, and the left display is
/// always flipped first.
pub struct StereoDisplays<D> {
    left: D,
    right: D,
}

impl<D: DisplaySurface> StereoDisplays<D> {
    pub fn new(left: D, right: D) -> Self {
        Self { left, right }
    }

    pub fn draw(&mut self, scene: &Scene<'_>) -> Result<(), RenderError> {
        match *scene {
            Scene::Fixation => {
                self.left.draw_fixation()?;
                self.right.draw_fixation()
            }
            Scene::Stereo { left, right, prompt } => {
                self.left.draw_image(left)?;
                self.right.draw_image(right)?;
                if let Some(p) = prompt {
                    self.left.draw_text(&p.text, p.position, p.height)?;
                    self.right.draw_text(&p.text, p.position, p.height)?;
                }
                Ok(())
            }
            Scene::Message(m) => {
                self.left.draw_text(&m.text, m.position, m.height)?;
                self.right.draw_text(&m.text, m.position, m.height)
            }
        }
    }

    pub fn flip(&mut self) -> Result<(), RenderError> {
        self.left.flip()?;
        self.right.flip()
    }

    /// Draws `scene` into both back buffers, then flips both.
    pub fn present(&mut self, scene: &Scene<'_>) -> Result<(), RenderError> {
        self.draw(scene)?;
        self.flip()
    }

    pub fn close(&mut self) {
        self.left.close();
        self.right.close();
    }
}
