//! TrueType text rasterised with fontdue

use anyhow::{Context, Result};
use fontdue::{Font, FontSettings};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::canvas::Canvas;
use super::font_discovery::find_font_path;

const FALLBACK_FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/noto/NotoSans-Regular.ttf",
];

pub struct FontRenderer {
    font: Font,
    size: f32,
    ascent: f32,
    line_height: usize,
}

impl FontRenderer {
    pub fn from_path(path: &Path, size: f32) -> Result<Self> {
        let font_data = fs::read(path).with_context(|| format!("Failed to read font file: {}", path.display()))?;
        let font = Font::from_bytes(font_data, FontSettings::default())
            .map_err(|e| anyhow::anyhow!("Failed to parse font {}: {}", path.display(), e))?;

        let (ascent, line_height) = match font.horizontal_line_metrics(size) {
            Some(metrics) => (metrics.ascent, metrics.new_line_size.ceil() as usize),
            None => (size, (size * 1.25).ceil() as usize),
        };
        info!(path = %path.display(), size, line_height, "Loaded font");
        Ok(Self {
            font,
            size,
            ascent,
            line_height,
        })
    }

    /// Resolve a family or full font name through fontconfig
    pub fn from_font_name(font_name: &str, size: f32) -> Result<Self> {
        let path = find_font_path(font_name).with_context(|| format!("Failed to resolve font '{font_name}'"))?;
        Self::from_path(&path, size)
    }

    /// Try fontconfig's default sans face, then well-known install paths
    pub fn from_system_font(size: f32) -> Result<Self> {
        for name in ["Sans", "Monospace"] {
            match Self::from_font_name(name, size) {
                Ok(renderer) => return Ok(renderer),
                Err(e) => warn!(font = name, error = %e, "System font lookup failed"),
            }
        }
        for path in FALLBACK_FONT_PATHS {
            if let Ok(renderer) = Self::from_path(&PathBuf::from(path), size) {
                return Ok(renderer);
            }
        }
        anyhow::bail!(
            "Could not find any system font via fontconfig or the fallback paths {:?}",
            FALLBACK_FONT_PATHS
        )
    }

    /// Configured family when set, falling back to the system font
    pub fn load(family: &str, size: f32) -> Result<Self> {
        let family = family.trim();
        if !family.is_empty() {
            match Self::from_font_name(family, size) {
                Ok(renderer) => return Ok(renderer),
                Err(e) => warn!(font = family, error = %e, "Configured font unavailable, using system font"),
            }
        }
        Self::from_system_font(size)
    }

    pub fn line_height(&self) -> usize {
        self.line_height
    }

    /// Advance width of `text` in pixels
    pub fn measure(&self, text: &str) -> usize {
        text.chars()
            .map(|ch| self.font.metrics(ch, self.size).advance_width)
            .sum::<f32>()
            .ceil() as usize
    }

    /// Draw one line with its top edge at `y`; returns the pen x after the text
    pub fn draw(&self, canvas: &mut Canvas, x: i32, y: i32, text: &str, color: u32) -> i32 {
        let baseline = y as f32 + self.ascent;
        let mut pen = x as f32;
        for ch in text.chars() {
            let (metrics, bitmap) = self.font.rasterize(ch, self.size);
            let left = pen.round() as i32 + metrics.xmin;
            let top = (baseline - (metrics.height as i32 + metrics.ymin) as f32).round() as i32;
            for gy in 0..metrics.height {
                for gx in 0..metrics.width {
                    let coverage = bitmap[gy * metrics.width + gx];
                    canvas.blend(left + gx as i32, top + gy as i32, color, coverage);
                }
            }
            pen += metrics.advance_width;
        }
        pen.ceil() as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_font_draws_visible_pixels() {
        // Font availability depends on the host
        let Ok(font) = FontRenderer::from_system_font(14.0) else {
            return;
        };
        assert!(font.line_height() >= 14);
        assert!(font.measure("WW") > font.measure("W"));
        assert_eq!(font.measure(""), 0);

        let mut canvas = Canvas::new(60, 30, 0x000000);
        let end = font.draw(&mut canvas, 2, 2, "Hi", 0xFFFFFF);
        assert!(end > 2);
        let lit = (0..30).flat_map(|y| (0..60).map(move |x| (x, y))).any(|(x, y)| canvas.pixel(x, y) != Some(0));
        assert!(lit);
    }

    #[test]
    fn test_missing_font_file_is_error() {
        assert!(FontRenderer::from_path(Path::new("/nonexistent/font.ttf"), 12.0).is_err());
    }
}
