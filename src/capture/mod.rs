//! Screen capture
//!
//! A [`CaptureSource`] is a blocking producer of PNG screenshots. The executor
//! runs it on the blocking pool; nothing here touches session state.

pub mod x11;

use chrono::{DateTime, Local};
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, RgbImage};
use std::fmt;
use std::io::Cursor;

use crate::error::CaptureError;

pub use x11::X11Capture;

pub trait CaptureSource: Send + Sync {
    fn capture(&self) -> Result<Screenshot, CaptureError>;
}

/// Stand-in used when no display could be opened at startup
pub struct UnavailableCapture {
    reason: String,
}

impl UnavailableCapture {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

impl CaptureSource for UnavailableCapture {
    fn capture(&self) -> Result<Screenshot, CaptureError> {
        Err(CaptureError::Unavailable(self.reason.clone()))
    }
}

/// PNG-encoded RGB snapshot of the screen
#[derive(Clone, PartialEq)]
pub struct Screenshot {
    pub captured_at: DateTime<Local>,
    pub width: u32,
    pub height: u32,
    pub png: Vec<u8>,
}

impl fmt::Debug for Screenshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Screenshot")
            .field("captured_at", &self.captured_at)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("png_bytes", &self.png.len())
            .finish()
    }
}

/// Wrap packed 8-bit RGB pixels; a buffer that doesn't match the size is rejected
pub fn rgb_from_raw(width: u32, height: u32, pixels: Vec<u8>) -> Result<RgbImage, CaptureError> {
    let len = pixels.len();
    let expected = width as usize * height as usize * 3;
    let image = (len == expected)
        .then(|| RgbImage::from_raw(width, height, pixels))
        .flatten();
    image.ok_or_else(|| CaptureError::Encoding(format!("image data has {len} bytes, expected {expected}")))
}

/// Downscale so that `width <= max_width`, keeping aspect ratio
pub fn fit_width(image: RgbImage, max_width: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    if width <= max_width || max_width == 0 {
        return image;
    }
    let new_height = ((u64::from(height) * u64::from(max_width)) / u64::from(width)).max(1) as u32;
    imageops::resize(&image, max_width, new_height, FilterType::Triangle)
}

pub fn encode_png(image: RgbImage) -> Result<Vec<u8>, CaptureError> {
    let mut png = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| CaptureError::Encoding(e.to_string()))?;
    Ok(png)
}

pub fn into_screenshot(image: RgbImage, max_width: u32) -> Result<Screenshot, CaptureError> {
    let image = fit_width(image, max_width);
    let (width, height) = image.dimensions();
    Ok(Screenshot {
        captured_at: Local::now(),
        width,
        height,
        png: encode_png(image)?,
    })
}
