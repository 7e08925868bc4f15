use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use haplo_core::Viewport;
use tiny_skia::{Color, FilterQuality, IntSize, Paint, Pixmap, PixmapPaint, Rect, Transform};
use tracing::debug;

use crate::error::RenderError;
use crate::text::{FontArc, TextCache};

/// Off-screen RGBA canvas for one eye.
///
/// Coordinates passed to [`EyeCanvas::draw_text`] are pixels relative to the
/// canvas centre with y pointing up. Images are centred and scaled down to fit.
pub struct EyeCanvas {
    width: u32,
    height: u32,
    center: (f32, f32),
    background: Color,
    canvas: Pixmap,
    images: HashMap<PathBuf, Arc<Pixmap>>,
    text: Option<TextCache>,
    fixation: Pixmap,
}

impl EyeCanvas {
    pub fn new(
        width: u32,
        height: u32,
        background: [u8; 4],
        font: Option<FontArc>,
        fixation_size: u32,
    ) -> Result<Self, RenderError> {
        Viewport::full(width, height).validate()?;
        let [r, g, b, a] = background;
        let background = Color::from_rgba8(r, g, b, a);

        let mut canvas = Pixmap::new(width, height).ok_or(RenderError::Canvas { width, height })?;
        canvas.fill(background);

        let fixation = fixation_cross(fixation_size.max(2))?;
        let text = font.map(|f| TextCache::new(f, Color::WHITE));

        Ok(Self {
            width,
            height,
            center: (width as f32 / 2.0, height as f32 / 2.0),
            background,
            canvas,
            images: HashMap::new(),
            text,
            fixation,
        })
    }

    pub fn clear(&mut self) {
        self.canvas.fill(self.background);
    }

    /// Decodes `path` into the image cache without drawing it.
    pub fn preload(&mut self, path: &Path) -> Result<(), RenderError> {
        self.image(path).map(|_| ())
    }

    pub fn draw_image(&mut self, path: &Path) -> Result<(), RenderError> {
        let pm = self.image(path)?;
        let (iw, ih) = (pm.width() as f32, pm.height() as f32);
        let scale = (self.width as f32 / iw).min(self.height as f32 / ih).min(1.0);
        let tx = self.center.0 - iw * scale * 0.5;
        let ty = self.center.1 - ih * scale * 0.5;

        let paint = PixmapPaint {
            quality: if scale < 1.0 {
                FilterQuality::Bilinear
            } else {
                FilterQuality::Nearest
            },
            ..PixmapPaint::default()
        };
        self.canvas.draw_pixmap(
            0,
            0,
            (*pm).as_ref(),
            &paint,
            Transform::from_row(scale, 0.0, 0.0, scale, tx, ty),
            None,
        );
        Ok(())
    }

    pub fn draw_text(
        &mut self,
        text: &str,
        position: (f32, f32),
        height: f32,
    ) -> Result<(), RenderError> {
        let cache = self.text.as_mut().ok_or(RenderError::MissingFont)?;
        let mut pos_y = self.center.1 - position.1;
        for (i, line) in text.lines().enumerate() {
            if i > 0 {
                pos_y += height * 1.3;
            }
            let Some(pm) = cache.get_or_render(line, height) else {
                continue;
            };
            let x = (self.center.0 + position.0 - pm.width() as f32 * 0.5).round() as i32;
            let y = (pos_y - pm.height() as f32 * 0.5).round() as i32;
            self.canvas.draw_pixmap(
                x,
                y,
                (*pm).as_ref(),
                &PixmapPaint::default(),
                Transform::identity(),
                None,
            );
        }
        Ok(())
    }

    pub fn draw_fixation(&mut self) {
        let x = (self.center.0 - self.fixation.width() as f32 * 0.5).round() as i32;
        let y = (self.center.1 - self.fixation.height() as f32 * 0.5).round() as i32;
        self.canvas.draw_pixmap(
            x,
            y,
            self.fixation.as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
    }

    /// Premultiplied RGBA bytes, row-major.
    pub fn data(&self) -> &[u8] {
        self.canvas.data()
    }

    /// Copies the canvas into `frame` (RGBA, `frame_width` pixels per row) at
    /// the viewport's offset, clipped to both the viewport and the frame.
    pub fn blit_into(&self, frame: &mut [u8], frame_width: u32, viewport: Viewport) {
        if frame_width == 0 {
            return;
        }
        let frame_height = (frame.len() / (frame_width as usize * 4)) as u32;
        let vp = viewport.clamp_to(frame_width, frame_height);
        let w = vp.width.min(self.width) as usize;
        let h = vp.height.min(self.height) as usize;
        if w == 0 || h == 0 {
            return;
        }

        let src = self.canvas.data();
        let src_row = self.width as usize * 4;
        let dst_row = frame_width as usize * 4;
        for row in 0..h {
            let s = row * src_row;
            let d = (vp.y as usize + row) * dst_row + vp.x as usize * 4;
            frame[d..d + w * 4].copy_from_slice(&src[s..s + w * 4]);
        }
    }

    fn image(&mut self, path: &Path) -> Result<Arc<Pixmap>, RenderError> {
        if let Some(pm) = self.images.get(path) {
            return Ok(Arc::clone(pm));
        }
        let pm = Arc::new(load_image_pixmap(path)?);
        debug!(path = %path.display(), width = pm.width(), height = pm.height(), "decoded image");
        self.images.insert(path.to_path_buf(), Arc::clone(&pm));
        Ok(pm)
    }
}

fn load_image_pixmap(path: &Path) -> Result<Pixmap, RenderError> {
    let rgba = image::open(path)
        .map_err(|source| RenderError::ImageLoad {
            path: path.to_path_buf(),
            source,
        })?
        .to_rgba8();
    let (width, height) = rgba.dimensions();
    let size = IntSize::from_wh(width, height).ok_or_else(|| RenderError::ImageSize {
        path: path.to_path_buf(),
        width,
        height,
    })?;

    let mut data = rgba.into_raw();
    for px in data.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a < 255 {
            px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
            px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
            px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
        }
    }
    Pixmap::from_vec(data, size).ok_or_else(|| RenderError::ImageSize {
        path: path.to_path_buf(),
        width,
        height,
    })
}

fn fixation_cross(size: u32) -> Result<Pixmap, RenderError> {
    let mut pm = Pixmap::new(size, size).ok_or(RenderError::Canvas {
        width: size,
        height: size,
    })?;

    let mut paint = Paint::default();
    paint.anti_alias = false;
    paint.set_color(Color::from_rgba8(255, 255, 255, 255));

    let s = size as f32;
    let bar = (s / 20.0).max(2.0);
    let bars = [
        Rect::from_xywh(0.0, (s - bar) * 0.5, s, bar),
        Rect::from_xywh((s - bar) * 0.5, 0.0, bar, s),
    ];
    for r in bars.into_iter().flatten() {
        pm.fill_rect(r, &paint, Transform::identity(), None);
    }
    Ok(pm)
}
