//! Single-line prompt entry shown next to the overlay

use anyhow::{Context, Result};
use tracing::{debug, error, info};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;

use super::DialogInput;
use super::canvas::{Canvas, mix};
use super::font::FontRenderer;
use super::keymap::Key;
use crate::constants::render::{DIALOG_HINT, DIALOG_LABEL, TEXT_PADDING};
use crate::constants::x11;
use crate::session::OverlayStyle;
use crate::types::{Dimensions, Point};
use crate::x11_utils;

/// Longest prompt accepted by the dialog, in characters
const MAX_INPUT_CHARS: usize = 500;
const CURSOR: &str = "_";

/// Text being typed; independent of any window
#[derive(Debug, Default)]
pub struct EditBuffer {
    text: String,
}

impl EditBuffer {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    /// Apply a key press. Returns the dialog outcome once the user submits or cancels.
    pub fn press(&mut self, key: Key) -> Option<DialogInput> {
        match key {
            Key::Char(c) if self.text.chars().count() < MAX_INPUT_CHARS => {
                self.text.push(c);
                None
            }
            Key::BackSpace => {
                self.text.pop();
                None
            }
            Key::Return => Some(DialogInput::Submit(self.text.clone())),
            Key::Escape => Some(DialogInput::Cancel),
            Key::Char(_) | Key::Other => None,
        }
    }
}

/// Tail of `text` that fits in `width` pixels
fn visible_tail<'t>(text: &'t str, width: usize, measure: impl Fn(&str) -> usize) -> &'t str {
    text.char_indices()
        .map(|(idx, _)| &text[idx..])
        .find(|tail| measure(tail) <= width)
        .unwrap_or(&text[text.len()..])
}

pub struct InputDialog<'a> {
    pub window: Window,
    gc: Gcontext,
    depth: u8,
    geometry: Option<(Point, Dimensions)>,
    open: bool,
    previous_focus: Option<Window>,
    buffer: EditBuffer,
    conn: &'a RustConnection,
}

impl<'a> InputDialog<'a> {
    pub fn new(conn: &'a RustConnection, screen: &Screen) -> Result<Self> {
        let window = conn.generate_id().context("Failed to generate X11 window ID")?;
        conn.create_window(
            screen.root_depth,
            window,
            screen.root,
            0,
            0,
            1,
            1,
            0,
            WindowClass::INPUT_OUTPUT,
            screen.root_visual,
            &CreateWindowAux::new()
                .override_redirect(x11::OVERRIDE_REDIRECT)
                .event_mask(EventMask::EXPOSURE | EventMask::KEY_PRESS | EventMask::STRUCTURE_NOTIFY),
        )
        .context("Failed to create input dialog window")?;
        x11_utils::set_wm_class(conn, window)?;

        let gc = conn.generate_id().context("Failed to generate ID for graphics context")?;
        conn.create_gc(gc, window, &CreateGCAux::new())
            .context("Failed to create dialog graphics context")?;

        Ok(Self {
            window,
            gc,
            depth: screen.root_depth,
            geometry: None,
            open: false,
            previous_focus: None,
            buffer: EditBuffer::default(),
            conn,
        })
    }

    /// Show the dialog at `origin`; an already open dialog only follows the overlay
    pub fn open(&mut self, origin: Point, dimensions: Dimensions) -> Result<()> {
        if self.geometry != Some((origin, dimensions)) {
            self.conn
                .configure_window(
                    self.window,
                    &ConfigureWindowAux::new()
                        .x(origin.x)
                        .y(origin.y)
                        .width(u32::from(dimensions.width))
                        .height(u32::from(dimensions.height)),
                )
                .context("Failed to place input dialog")?;
            self.geometry = Some((origin, dimensions));
        }
        if !self.open {
            self.buffer.clear();
            self.previous_focus = self
                .conn
                .get_input_focus()
                .context("Failed to query input focus")?
                .reply()
                .map(|reply| reply.focus)
                .ok();
            self.conn.map_window(self.window).context("Failed to map input dialog")?;
            x11_utils::raise(self.conn, self.window)?;
            self.open = true;
            info!("Input dialog opened");
        }
        self.conn.flush().context("Failed to flush X11 connection")?;
        Ok(())
    }

    /// Focus can only be given to a viewable window, so this runs on MapNotify
    pub fn take_focus(&self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.conn
            .set_input_focus(InputFocus::PARENT, self.window, x11rb::CURRENT_TIME)
            .context("Failed to focus input dialog")?;
        self.conn.flush().context("Failed to flush X11 connection")?;
        debug!(window = self.window, "Input dialog focused");
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        self.buffer.clear();
        self.conn.unmap_window(self.window).context("Failed to unmap input dialog")?;
        if let Some(previous) = self.previous_focus.take().filter(|w| *w != x11rb::NONE) {
            self.conn
                .set_input_focus(InputFocus::POINTER_ROOT, previous, x11rb::CURRENT_TIME)
                .context("Failed to restore input focus")?;
        }
        self.conn.flush().context("Failed to flush X11 connection")?;
        info!("Input dialog closed");
        Ok(())
    }

    pub fn press(&mut self, key: Key) -> Option<DialogInput> {
        if !self.open {
            return None;
        }
        self.buffer.press(key)
    }

    pub fn paint(&self, font: &FontRenderer, style: &OverlayStyle) -> Result<()> {
        let Some((_, dims)) = self.geometry.filter(|_| self.open) else {
            return Ok(());
        };
        let width = usize::from(dims.width);
        let height = usize::from(dims.height);
        let mut canvas = Canvas::new(width, height, style.background_color);
        let dim = mix(style.text_color, style.background_color, 140);
        // Border
        canvas.fill_rect(0, 0, width, 1, dim);
        canvas.fill_rect(0, height as i32 - 1, width, 1, dim);
        let y = (height.saturating_sub(font.line_height()) / 2) as i32;

        let hint_width = font.measure(DIALOG_HINT);
        let hint_x = width.saturating_sub(TEXT_PADDING + hint_width) as i32;
        font.draw(&mut canvas, hint_x, y, DIALOG_HINT, dim);

        let pen = font.draw(&mut canvas, TEXT_PADDING as i32, y, DIALOG_LABEL, dim);
        let room = (hint_x - pen - TEXT_PADDING as i32).max(0) as usize;
        let typed = format!("{}{CURSOR}", self.buffer.text());
        let shown = visible_tail(&typed, room, |s| font.measure(s));
        font.draw(&mut canvas, pen, y, shown, style.text_color);

        x11_utils::upload_canvas(self.conn, self.window, self.gc, self.depth, &canvas)
            .context("Failed to paint input dialog")
    }
}

impl Drop for InputDialog<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!(error = %e, "Failed to close input dialog");
        }
        if let Err(e) = self.conn.free_gc(self.gc) {
            error!(gc = self.gc, error = %e, "Failed to free GC");
        }
        if let Err(e) = self.conn.destroy_window(self.window) {
            error!(window = self.window, error = %e, "Failed to destroy input dialog");
        }
        let _ = self.conn.flush();
    }
}
