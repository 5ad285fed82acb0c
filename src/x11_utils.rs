use anyhow::{Context, Result};
use tracing::debug;
use x11rb::connection::Connection;
use x11rb::protocol::shape::SK;
use x11rb::protocol::xfixes::{ConnectionExt as XFixesExt, Region};
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;

use crate::constants::x11;
use crate::renderer::canvas::Canvas;

/// Pre-cached X11 atoms to avoid repeated roundtrips
pub struct CachedAtoms {
    pub net_wm_state: Atom,
    pub net_wm_state_above: Atom,
    pub net_wm_window_opacity: Atom,
    pub net_wm_window_type: Atom,
    pub net_wm_window_type_notification: Atom,
}

fn intern(conn: &RustConnection, name: &str) -> Result<Atom> {
    Ok(conn
        .intern_atom(false, name.as_bytes())
        .with_context(|| format!("Failed to intern {name} atom"))?
        .reply()
        .with_context(|| format!("Failed to get reply for {name} atom"))?
        .atom)
}

impl CachedAtoms {
    pub fn new(conn: &RustConnection) -> Result<Self> {
        // Do all intern_atom roundtrips once at startup
        Ok(Self {
            net_wm_state: intern(conn, "_NET_WM_STATE")?,
            net_wm_state_above: intern(conn, "_NET_WM_STATE_ABOVE")?,
            net_wm_window_opacity: intern(conn, "_NET_WM_WINDOW_OPACITY")?,
            net_wm_window_type: intern(conn, "_NET_WM_WINDOW_TYPE")?,
            net_wm_window_type_notification: intern(conn, "_NET_WM_WINDOW_TYPE_NOTIFICATION")?,
        })
    }
}

/// Negotiate XFixes so input shape regions can be set
pub fn init_xfixes(conn: &RustConnection) -> Result<()> {
    let version = conn
        .xfixes_query_version(5, 0)
        .context("Failed to query XFixes version")?
        .reply()
        .context("XFixes extension not available")?;
    debug!(
        major = version.major_version,
        minor = version.minor_version,
        "XFixes negotiated"
    );
    Ok(())
}

/// Compositor opacity hint, 0.0..=1.0 scaled onto the full u32 range
pub fn opacity_value(opacity: f32) -> u32 {
    (f64::from(opacity.clamp(0.0, 1.0)) * f64::from(u32::MAX)).round() as u32
}

pub fn set_opacity(conn: &RustConnection, atoms: &CachedAtoms, window: Window, opacity: f32) -> Result<()> {
    conn.change_property32(
        PropMode::REPLACE,
        window,
        atoms.net_wm_window_opacity,
        AtomEnum::CARDINAL,
        &[opacity_value(opacity)],
    )
    .with_context(|| format!("Failed to set opacity on window {window}"))?;
    Ok(())
}

pub fn set_wm_class(conn: &RustConnection, window: Window) -> Result<()> {
    conn.change_property8(
        PropMode::REPLACE,
        window,
        AtomEnum::WM_CLASS,
        AtomEnum::STRING,
        x11::WM_CLASS,
    )
    .with_context(|| format!("Failed to set WM_CLASS on window {window}"))?;
    Ok(())
}

pub fn set_window_type(conn: &RustConnection, atoms: &CachedAtoms, window: Window) -> Result<()> {
    conn.change_property32(
        PropMode::REPLACE,
        window,
        atoms.net_wm_window_type,
        AtomEnum::ATOM,
        &[atoms.net_wm_window_type_notification],
    )
    .with_context(|| format!("Failed to set window type on window {window}"))?;
    Ok(())
}

/// Always-on-top: state hint for compositors plus an explicit raise, since
/// override-redirect windows are not restacked by the window manager
pub fn set_above(conn: &RustConnection, atoms: &CachedAtoms, window: Window, above: bool) -> Result<()> {
    if above {
        conn.change_property32(
            PropMode::REPLACE,
            window,
            atoms.net_wm_state,
            AtomEnum::ATOM,
            &[atoms.net_wm_state_above],
        )
        .with_context(|| format!("Failed to set _NET_WM_STATE_ABOVE on window {window}"))?;
        raise(conn, window)?;
    } else {
        conn.delete_property(window, atoms.net_wm_state)
            .with_context(|| format!("Failed to clear _NET_WM_STATE on window {window}"))?;
    }
    Ok(())
}

pub fn raise(conn: &RustConnection, window: Window) -> Result<()> {
    conn.configure_window(window, &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE))
        .with_context(|| format!("Failed to raise window {window} to top of stack"))?;
    Ok(())
}

/// Empty input region passes pointer events through; region 0 restores the default shape
pub fn set_click_through(conn: &RustConnection, window: Window, enabled: bool) -> Result<()> {
    if enabled {
        let region: Region = conn.generate_id().context("Failed to allocate XFixes region id")?;
        conn.xfixes_create_region(region, &[])
            .context("Failed to create empty XFixes region")?;
        conn.xfixes_set_window_shape_region(window, SK::INPUT, 0, 0, region)
            .with_context(|| format!("Failed to clear input shape of window {window}"))?;
        conn.xfixes_destroy_region(region)
            .context("Failed to destroy XFixes region")?;
    } else {
        conn.xfixes_set_window_shape_region(window, SK::INPUT, 0, 0, x11rb::NONE)
            .with_context(|| format!("Failed to reset input shape of window {window}"))?;
    }
    Ok(())
}

/// Send the canvas to `window` in row bands small enough for one PutImage each
pub fn upload_canvas(
    conn: &RustConnection,
    window: Window,
    gc: Gcontext,
    depth: u8,
    canvas: &Canvas,
) -> Result<()> {
    for (start, end) in canvas.bands(x11::MAX_PUT_IMAGE_BYTES) {
        let data = canvas.rows_bgrx(start, end);
        conn.put_image(
            ImageFormat::Z_PIXMAP,
            window,
            gc,
            canvas.width as u16,
            (end - start) as u16,
            0,
            start as i16,
            0,
            depth,
            &data,
        )
        .with_context(|| format!("Failed to upload rows {start}..{end} to window {window}"))?;
    }
    conn.flush().context("Failed to flush X11 connection after upload")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opacity_value_scale() {
        assert_eq!(opacity_value(0.0), 0);
        assert_eq!(opacity_value(1.0), u32::MAX);
        assert_eq!(opacity_value(2.0), u32::MAX);
        let half = opacity_value(0.5);
        assert!(half.abs_diff(u32::MAX / 2) <= 1);
    }
}
