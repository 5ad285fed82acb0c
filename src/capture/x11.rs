//! Root window capture through the core `GetImage` request

use tracing::{debug, info};
use x11rb::connection::Connection;
use x11rb::errors::ReplyError;
use x11rb::protocol::xproto::{ConnectionExt, ImageFormat, ImageOrder, Window};
use x11rb::rust_connection::RustConnection;

use super::{CaptureSource, Screenshot, into_screenshot, rgb_from_raw};
use crate::constants::x11;
use crate::error::CaptureError;

/// Captures the primary screen's root window
pub struct X11Capture {
    conn: RustConnection,
    root: Window,
    width: u16,
    height: u16,
    max_width: u32,
}

impl X11Capture {
    pub fn connect(max_width: u32) -> Result<Self, CaptureError> {
        let (conn, screen_num) =
            x11rb::connect(None).map_err(|e| CaptureError::Unavailable(format!("X11 connection failed: {e}")))?;
        let screen = conn
            .setup()
            .roots
            .get(screen_num)
            .ok_or_else(|| CaptureError::Unavailable(format!("screen {screen_num} not found")))?;
        let (root, width, height) = (screen.root, screen.width_in_pixels, screen.height_in_pixels);
        info!(screen = screen_num, width, height, "Screen capture ready");
        Ok(Self {
            conn,
            root,
            width,
            height,
            max_width,
        })
    }

    fn bits_per_pixel(&self, depth: u8) -> Option<u8> {
        self.conn
            .setup()
            .pixmap_formats
            .iter()
            .find(|f| f.depth == depth)
            .map(|f| f.bits_per_pixel)
    }
}

impl CaptureSource for X11Capture {
    fn capture(&self) -> Result<Screenshot, CaptureError> {
        let reply = self
            .conn
            .get_image(ImageFormat::Z_PIXMAP, self.root, 0, 0, self.width, self.height, !0)
            .map_err(|e| CaptureError::Unavailable(e.to_string()))?
            .reply()
            .map_err(|e| match e {
                ReplyError::X11Error(err) => CaptureError::Denied(format!("{:?}", err.error_kind)),
                other => CaptureError::Unavailable(other.to_string()),
            })?;

        let bpp = self.bits_per_pixel(reply.depth).unwrap_or(0);
        if usize::from(bpp) != x11::BITS_PER_PIXEL || !(reply.depth == 24 || reply.depth == 32) {
            return Err(CaptureError::Unavailable(format!(
                "unsupported visual: depth {} at {} bpp",
                reply.depth, bpp
            )));
        }

        let msb_first = self.conn.setup().image_byte_order == ImageOrder::MSB_FIRST;
        let pixels = xpixels_to_rgb(&reply.data, msb_first);
        let image = rgb_from_raw(u32::from(self.width), u32::from(self.height), pixels)?;
        debug!(width = self.width, height = self.height, depth = reply.depth, "Captured root window");

        into_screenshot(image, self.max_width)
    }
}

/// Convert 32bpp 0x00RRGGBB pixels in server byte order to packed RGB
fn xpixels_to_rgb(data: &[u8], msb_first: bool) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(data.len() / 4 * 3);
    for px in data.chunks_exact(4) {
        if msb_first {
            rgb.extend_from_slice(&[px[1], px[2], px[3]]);
        } else {
            rgb.extend_from_slice(&[px[2], px[1], px[0]]);
        }
    }
    rgb
}
