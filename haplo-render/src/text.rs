use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use ab_glyph::FontArc;
use ab_glyph::{point, Font, Glyph, PxScale, ScaleFont};
use tiny_skia::{Color, Pixmap, PremultipliedColorU8};

use crate::error::RenderError;

/// Common system locations tried when no font path is configured.
const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/Library/Fonts/Arial.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

pub fn load_font(path: &Path) -> Result<FontArc, RenderError> {
    let bytes = std::fs::read(path).map_err(|e| RenderError::Font {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    FontArc::try_from_vec(bytes).map_err(|e| RenderError::Font {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Loads `configured` if given, else the first readable system font.
pub fn find_font(configured: Option<&Path>) -> Result<FontArc, RenderError> {
    if let Some(path) = configured {
        return load_font(path);
    }
    FONT_CANDIDATES
        .iter()
        .map(PathBuf::from)
        .filter(|p| p.exists())
        .find_map(|p| load_font(&p).ok())
        .ok_or(RenderError::MissingFont)
}

/// Rasterises `text` into a tight, transparent, premultiplied pixmap.
///
/// Returns `None` when nothing in `text` has an outline (e.g. only spaces).
pub fn render_text_pixmap(
    text: &str,
    font_size: f32,
    font: &FontArc,
    color: Color,
) -> Option<Pixmap> {
    let scale = PxScale::from(font_size);
    let sf = font.as_scaled(scale);

    // Layout with the baseline at ascent.
    let mut pen_x = 0.0f32;
    let mut glyphs = Vec::<Glyph>::new();
    for ch in text.chars() {
        let id = font.glyph_id(ch);
        if let Some(prev) = glyphs.last() {
            pen_x += sf.kern(prev.id, id);
        }
        glyphs.push(Glyph {
            id,
            scale,
            position: point(pen_x, sf.ascent()),
        });
        pen_x += sf.h_advance(id);
    }

    let outlines: Vec<_> = glyphs
        .into_iter()
        .filter_map(|g| font.outline_glyph(g))
        .collect();
    if outlines.is_empty() {
        return None;
    }

    let mut min_x = f32::INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut max_y = f32::NEG_INFINITY;
    for out in &outlines {
        let b = out.px_bounds();
        min_x = min_x.min(b.min.x);
        min_y = min_y.min(b.min.y);
        max_x = max_x.max(b.max.x);
        max_y = max_y.max(b.max.y);
    }

    let w = (max_x.ceil() - min_x.floor()).max(1.0) as u32;
    let h = (max_y.ceil() - min_y.floor()).max(1.0) as u32;
    let mut pm = Pixmap::new(w, h)?;

    let stride = pm.width() as usize;
    let dst = pm.pixels_mut();
    let cu = color.to_color_u8();

    for out in &outlines {
        let b = out.px_bounds();
        out.draw(|x, y, cov| {
            if cov <= f32::EPSILON {
                return;
            }
            let ix = (x as f32 + b.min.x - min_x).floor() as i32;
            let iy = (y as f32 + b.min.y - min_y).floor() as i32;
            if ix < 0 || iy < 0 || ix >= w as i32 || iy >= h as i32 {
                return;
            }
            let i = iy as usize * stride + ix as usize;

            // Premultiply by coverage, then composite "over" what is there.
            let a = (cov * cu.alpha() as f32 / 255.0).clamp(0.0, 1.0);
            let sa = (a * 255.0) as u8;
            let bg = dst[i];
            let inv = 1.0 - a;
            let mix = |s: u8, d: u8| ((s as f32 * a) as u8).saturating_add((d as f32 * inv) as u8);
            let r = mix(cu.red(), bg.red());
            let g = mix(cu.green(), bg.green());
            let bl = mix(cu.blue(), bg.blue());
            let al = sa.saturating_add((bg.alpha() as f32 * inv) as u8);
            let px = PremultipliedColorU8::from_rgba(r.min(al), g.min(al), bl.min(al), al);
            if let Some(px) = px {
                dst[i] = px;
            }
        });
    }

    Some(pm)
}

/// Rasterised text keyed by content and pixel height.
pub(crate) struct TextCache {
    font: FontArc,
    color: Color,
    map: HashMap<(String, u32), Option<Arc<Pixmap>>>,
}

impl TextCache {
    pub(crate) fn new(font: FontArc, color: Color) -> Self {
        Self {
            font,
            color,
            map: HashMap::new(),
        }
    }

    pub(crate) fn get_or_render(&mut self, text: &str, height: f32) -> Option<Arc<Pixmap>> {
        let key = (text.to_string(), height.round().max(1.0) as u32);
        if let Some(hit) = self.map.get(&key) {
            return hit.clone();
        }
        let pm = render_text_pixmap(text, key.1 as f32, &self.font, self.color).map(Arc::new);
        self.map.insert(key, pm.clone());
        pm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_font_file_is_reported() {
        let err = load_font(Path::new("/definitely/not/here.ttf")).unwrap_err();
        assert!(matches!(err, RenderError::Font { .. }));
    }

    #[test]
    fn invalid_font_bytes_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bogus.ttf");
        std::fs::write(&path, b"not a font").unwrap();
        assert!(matches!(load_font(&path), Err(RenderError::Font { .. })));
    }

    #[test]
    fn configured_font_path_is_not_second_guessed() {
        let err = find_font(Some(Path::new("/nope.ttf"))).unwrap_err();
        assert!(matches!(err, RenderError::Font { .. }));
    }
}
