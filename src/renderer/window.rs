use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use tracing::{debug, error, info};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;

use super::canvas::{Canvas, mix};
use super::font::FontRenderer;
use super::layout::overlay_origin;
use super::text::{LineKind, content_lines, fit};
use crate::constants::render::{LINE_SPACING, TEXT_PADDING};
use crate::constants::x11;
use crate::session::{OverlayState, OverlayStyle, SessionSnapshot};
use crate::types::{Dimensions, Point};
use crate::x11_utils::{self, CachedAtoms};

const ERROR_COLOR: u32 = 0xFF6B6B;
const NOTICE_COLOR: u32 = 0xFFD166;

fn line_color(kind: LineKind, style: &OverlayStyle) -> u32 {
    match kind {
        LineKind::Reply => style.text_color,
        LineKind::User => mix(style.text_color, style.background_color, 200),
        LineKind::Pending => mix(style.text_color, style.background_color, 150),
        LineKind::Error => ERROR_COLOR,
        LineKind::Notice => NOTICE_COLOR,
    }
}

/// Paint the overlay body for `snapshot` as of `now`
pub fn compose(snapshot: &SessionSnapshot, font: &FontRenderer, now: DateTime<Local>) -> Canvas {
    let style = &snapshot.overlay.style;
    let width = usize::from(style.dimensions.width);
    let height = usize::from(style.dimensions.height);
    let mut canvas = Canvas::new(width, height, style.background_color);

    let inner_width = width.saturating_sub(2 * TEXT_PADDING);
    let row_height = font.line_height() + LINE_SPACING;
    let max_rows = height.saturating_sub(2 * TEXT_PADDING) / row_height.max(1);

    let lines = content_lines(snapshot, now);
    let rows = fit(&lines, inner_width, max_rows, |s| font.measure(s));
    for (i, (kind, row)) in rows.iter().enumerate() {
        let y = TEXT_PADDING + i * row_height;
        font.draw(&mut canvas, TEXT_PADDING as i32, y as i32, row, line_color(*kind, style));
    }
    canvas
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum WindowOp {
    Unmap,
    Move(Point),
    ClickThrough(bool),
    Opacity(f32),
    Above(bool),
    Map { raise: bool },
}

/// Requests needed to go from `prev` to `state`, in send order.
///
/// Unmapping comes first and mapping last, so property changes only ever
/// land on an unmapped window or one that is already click-through.
fn window_ops(prev: Option<&OverlayState>, state: &OverlayState, origin: Point) -> Vec<WindowOp> {
    let changed = |f: fn(&OverlayState) -> bool| prev.is_none_or(|p| f(p) != f(state));
    let mut ops = Vec::new();

    let visibility_changed = changed(|s| s.visible);
    if visibility_changed && !state.visible {
        ops.push(WindowOp::Unmap);
    }
    if prev.is_none_or(|p| p.position != state.position) {
        ops.push(WindowOp::Move(origin));
    }
    if changed(|s| s.click_through) {
        ops.push(WindowOp::ClickThrough(state.click_through));
    }
    if prev.is_none_or(|p| p.opacity != state.opacity) {
        ops.push(WindowOp::Opacity(state.opacity));
    }
    if changed(|s| s.always_on_top) {
        ops.push(WindowOp::Above(state.always_on_top));
    }
    if visibility_changed && state.visible {
        ops.push(WindowOp::Map { raise: state.always_on_top });
    }
    ops
}

/// Override-redirect window holding the overlay text.
///
/// Window state is applied incrementally: only properties that differ from
/// what was last sent to the server are touched.
pub struct OverlayWindow<'a> {
    pub window: Window,
    gc: Gcontext,
    depth: u8,
    screen: Dimensions,
    dimensions: Dimensions,
    applied: Option<OverlayState>,
    conn: &'a RustConnection,
    atoms: &'a CachedAtoms,
}

impl<'a> OverlayWindow<'a> {
    /// Create the (unmapped) overlay window
    pub fn new(
        conn: &'a RustConnection,
        screen: &Screen,
        atoms: &'a CachedAtoms,
        dimensions: Dimensions,
    ) -> Result<Self> {
        if dimensions.width == 0 || dimensions.height == 0 {
            anyhow::bail!(
                "Invalid overlay dimensions {}x{} (must be non-zero)",
                dimensions.width,
                dimensions.height
            );
        }

        let window = conn.generate_id().context("Failed to generate X11 window ID")?;
        conn.create_window(
            screen.root_depth,
            window,
            screen.root,
            0,
            0,
            dimensions.width,
            dimensions.height,
            0,
            WindowClass::INPUT_OUTPUT,
            screen.root_visual,
            &CreateWindowAux::new()
                .override_redirect(x11::OVERRIDE_REDIRECT)
                .event_mask(EventMask::EXPOSURE),
        )
        .context("Failed to create overlay window")?;

        let gc = match Self::setup(conn, atoms, window) {
            Ok(gc) => gc,
            Err(e) => {
                // Don't leak the window if setup fails
                if let Err(err) = conn.destroy_window(window) {
                    error!(window, error = %err, "Failed to clean up overlay window");
                }
                let _ = conn.flush();
                return Err(e);
            }
        };

        info!(window, width = dimensions.width, height = dimensions.height, "Created overlay window");
        Ok(Self {
            window,
            gc,
            depth: screen.root_depth,
            screen: Dimensions::new(screen.width_in_pixels, screen.height_in_pixels),
            dimensions,
            applied: None,
            conn,
            atoms,
        })
    }

    fn setup(conn: &RustConnection, atoms: &CachedAtoms, window: Window) -> Result<Gcontext> {
        x11_utils::set_wm_class(conn, window)?;
        x11_utils::set_window_type(conn, atoms, window)?;
        let gc = conn.generate_id().context("Failed to generate ID for graphics context")?;
        conn.create_gc(gc, window, &CreateGCAux::new())
            .context("Failed to create overlay graphics context")?;
        Ok(gc)
    }

    pub fn screen(&self) -> Dimensions {
        self.screen
    }

    pub fn is_mapped(&self) -> bool {
        self.applied.as_ref().is_some_and(|s| s.visible)
    }

    pub fn origin(&self, state: &OverlayState) -> Point {
        overlay_origin(state.position, self.screen, self.dimensions)
    }

    /// Sync window properties with `state`
    pub fn apply(&mut self, state: &OverlayState) -> Result<()> {
        let origin = self.origin(state);
        for op in window_ops(self.applied.as_ref(), state, origin) {
            match op {
                WindowOp::Unmap => {
                    self.conn.unmap_window(self.window).context("Failed to unmap overlay window")?;
                    info!(visible = false, "Overlay visibility changed");
                }
                WindowOp::Move(Point { x, y }) => {
                    self.conn
                        .configure_window(self.window, &ConfigureWindowAux::new().x(x).y(y))
                        .context("Failed to move overlay window")?;
                    debug!(position = %state.position, x, y, "Moved overlay");
                }
                WindowOp::ClickThrough(enabled) => x11_utils::set_click_through(self.conn, self.window, enabled)?,
                WindowOp::Opacity(opacity) => x11_utils::set_opacity(self.conn, self.atoms, self.window, opacity)?,
                WindowOp::Above(above) => x11_utils::set_above(self.conn, self.atoms, self.window, above)?,
                WindowOp::Map { raise } => {
                    self.conn.map_window(self.window).context("Failed to map overlay window")?;
                    if raise {
                        x11_utils::raise(self.conn, self.window)?;
                    }
                    info!(visible = true, "Overlay visibility changed");
                }
            }
        }
        self.conn.flush().context("Failed to flush X11 connection")?;
        self.applied = Some(state.clone());
        Ok(())
    }

    pub fn paint(&self, canvas: &Canvas) -> Result<()> {
        if !self.is_mapped() {
            return Ok(());
        }
        x11_utils::upload_canvas(self.conn, self.window, self.gc, self.depth, canvas)
            .context("Failed to paint overlay")
    }
}

impl Drop for OverlayWindow<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.conn.free_gc(self.gc) {
            error!(gc = self.gc, error = %e, "Failed to free GC");
        }
        if let Err(e) = self.conn.destroy_window(self.window) {
            error!(window = self.window, error = %e, "Failed to destroy overlay window");
        }
        let _ = self.conn.flush();
    }
}
