//! Software framebuffer painted before upload to the X server

/// `fg` over `bg` at `coverage` (0..=255), per channel
pub fn mix(fg: u32, bg: u32, coverage: u8) -> u32 {
    let a = u32::from(coverage);
    let channel = |shift: u32| {
        let s = (fg >> shift) & 0xFF;
        let d = (bg >> shift) & 0xFF;
        ((s * a + d * (255 - a) + 127) / 255) << shift
    };
    channel(16) | channel(8) | channel(0)
}

/// 0x00RRGGBB pixels, row-major
#[derive(Debug, Clone)]
pub struct Canvas {
    pub width: usize,
    pub height: usize,
    pixels: Vec<u32>,
}

impl Canvas {
    pub fn new(width: usize, height: usize, background: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![background & 0xFF_FFFF; width * height],
        }
    }

    pub fn fill_rect(&mut self, x: i32, y: i32, width: usize, height: usize, color: u32) {
        for row in 0..height as i32 {
            for col in 0..width as i32 {
                self.blend(x + col, y + row, color, 255);
            }
        }
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<u32> {
        (x < self.width && y < self.height).then(|| self.pixels[y * self.width + x])
    }

    /// Mix `color` over the pixel at (x, y) with `coverage` (0..=255); out of bounds is ignored
    pub fn blend(&mut self, x: i32, y: i32, color: u32, coverage: u8) {
        if coverage == 0 || x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return;
        }
        let idx = y as usize * self.width + x as usize;
        if coverage == 255 {
            self.pixels[idx] = color & 0xFF_FFFF;
            return;
        }
        self.pixels[idx] = mix(color, self.pixels[idx], coverage);
    }

    /// Rows `start..end` as Z_PIXMAP bytes in LSB-first order (B, G, R, pad)
    pub fn rows_bgrx(&self, start: usize, end: usize) -> Vec<u8> {
        let end = end.min(self.height);
        let mut bytes = Vec::with_capacity((end.saturating_sub(start)) * self.width * 4);
        for px in &self.pixels[start * self.width..end * self.width] {
            bytes.extend_from_slice(&px.to_le_bytes());
        }
        bytes
    }

    /// Split the canvas into row bands of at most `max_bytes` each (at least one row per band)
    pub fn bands(&self, max_bytes: usize) -> Vec<(usize, usize)> {
        let row_bytes = (self.width * 4).max(1);
        let rows_per_band = (max_bytes / row_bytes).max(1);
        (0..self.height)
            .step_by(rows_per_band)
            .map(|start| (start, (start + rows_per_band).min(self.height)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blend_full_and_partial_coverage() {
        let mut canvas = Canvas::new(2, 1, 0x000000);
        canvas.blend(0, 0, 0xFFFFFF, 255);
        assert_eq!(canvas.pixel(0, 0), Some(0xFFFFFF));

        canvas.blend(1, 0, 0xFF0000, 128);
        assert_eq!(canvas.pixel(1, 0), Some(0x800000));
    }

    #[test]
    fn test_mix_endpoints() {
        assert_eq!(mix(0xFFFFFF, 0x000000, 255), 0xFFFFFF);
        assert_eq!(mix(0xFFFFFF, 0x123456, 0), 0x123456);
    }

    #[test]
    fn test_blend_out_of_bounds_ignored() {
        let mut canvas = Canvas::new(2, 2, 0x111111);
        canvas.blend(-1, 0, 0xFFFFFF, 255);
        canvas.blend(0, 5, 0xFFFFFF, 255);
        assert!((0..2).all(|y| (0..2).all(|x| canvas.pixel(x, y) == Some(0x111111))));
    }

    #[test]
    fn test_rows_bgrx_layout() {
        let canvas = Canvas::new(1, 2, 0x112233);
        assert_eq!(canvas.rows_bgrx(0, 1), vec![0x33, 0x22, 0x11, 0x00]);
        assert_eq!(canvas.rows_bgrx(0, 2).len(), 8);
    }

    #[test]
    fn test_bands_respect_byte_limit() {
        let canvas = Canvas::new(100, 25, 0);
        let bands = canvas.bands(100 * 4 * 10);
        assert_eq!(bands, vec![(0, 10), (10, 20), (20, 25)]);

        // A single row larger than the limit still goes out alone
        let bands = canvas.bands(8);
        assert_eq!(bands.len(), 25);
    }

    #[test]
    fn test_fill_rect_clips() {
        let mut canvas = Canvas::new(3, 3, 0);
        canvas.fill_rect(2, 2, 5, 5, 0xABCDEF);
        assert_eq!(canvas.pixel(2, 2), Some(0xABCDEF));
        assert_eq!(canvas.pixel(1, 1), Some(0));
    }
}
