//! X11 overlay: one override-redirect window for the text plus the input dialog

use anyhow::{Context, Result};
use chrono::Local;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use x11rb::connection::Connection;
use x11rb::protocol::Event;
use x11rb::protocol::xproto::Screen;
use x11rb::rust_connection::RustConnection;

use super::dialog::InputDialog;
use super::font::FontRenderer;
use super::keymap::KeyMap;
use super::layout::dialog_geometry;
use super::window::{OverlayWindow, compose};
use super::{DialogInput, Renderer, run_loop};
use crate::hotkeys::DialogSender;
use crate::session::SessionSnapshot;
use crate::x11_utils::{self, CachedAtoms};

pub struct X11Renderer<'a> {
    conn: &'a RustConnection,
    font: &'a FontRenderer,
    keymap: KeyMap,
    overlay: OverlayWindow<'a>,
    dialog: InputDialog<'a>,
    current: Option<SessionSnapshot>,
}

impl<'a> X11Renderer<'a> {
    pub fn new(
        conn: &'a RustConnection,
        screen: &'a Screen,
        atoms: &'a CachedAtoms,
        font: &'a FontRenderer,
        initial: &SessionSnapshot,
    ) -> Result<Self> {
        let keymap = KeyMap::fetch(conn)?;
        let overlay = OverlayWindow::new(conn, screen, atoms, initial.overlay.style.dimensions)?;
        let dialog = InputDialog::new(conn, screen)?;
        Ok(Self {
            conn,
            font,
            keymap,
            overlay,
            dialog,
            current: None,
        })
    }

    fn repaint(&self) -> Result<()> {
        let Some(snapshot) = &self.current else {
            return Ok(());
        };
        if self.overlay.is_mapped() {
            self.overlay.paint(&compose(snapshot, self.font, Local::now()))?;
        }
        self.dialog.paint(self.font, &snapshot.overlay.style)
    }
}

impl Renderer for X11Renderer<'_> {
    fn present(&mut self, snapshot: &SessionSnapshot) -> Result<()> {
        let state = &snapshot.overlay;
        self.overlay.apply(state)?;

        if state.visible && state.input_open {
            let (origin, dims) = dialog_geometry(state.position, self.overlay.screen(), state.style.dimensions);
            self.dialog.open(origin, dims)?;
        } else {
            self.dialog.close()?;
        }

        self.current = Some(snapshot.clone());
        self.repaint()
    }

    fn poll(&mut self) -> Result<Vec<DialogInput>> {
        let mut inputs = Vec::new();
        let mut dirty = false;
        while let Some(event) = self.conn.poll_for_event().context("Failed to poll X11 events")? {
            match event {
                Event::Expose(e) if e.count == 0 => dirty = true,
                Event::MapNotify(e) if e.window == self.dialog.window => self.dialog.take_focus()?,
                Event::KeyPress(e) if e.event == self.dialog.window => {
                    let key = self.keymap.lookup(e.detail, u16::from(e.state));
                    match self.dialog.press(key) {
                        Some(input) => inputs.push(input),
                        None => dirty = true,
                    }
                }
                Event::MappingNotify(_) => {
                    self.keymap = KeyMap::fetch(self.conn)?;
                    debug!("Keyboard mapping reloaded");
                }
                Event::Error(e) => debug!(error = ?e, "X11 error event"),
                _ => {}
            }
        }
        if dirty {
            self.repaint()?;
        }
        Ok(inputs)
    }
}

/// Connect to the display and drive the overlay until the session ends.
/// Blocks; run it on a dedicated thread.
pub fn run_x11(snapshots: watch::Receiver<SessionSnapshot>, dialog: DialogSender) -> Result<()> {
    let (conn, screen_num) = x11rb::connect(None).context("Failed to connect to X11 server")?;
    let screen = conn
        .setup()
        .roots
        .get(screen_num)
        .with_context(|| format!("Invalid screen number {screen_num}"))?;
    info!(screen = screen_num, width = screen.width_in_pixels, height = screen.height_in_pixels, "Renderer connected to X11");

    x11_utils::init_xfixes(&conn)?;
    let atoms = CachedAtoms::new(&conn)?;

    let initial = snapshots.borrow().clone();
    let style = &initial.overlay.style;
    let font = FontRenderer::load(&style.font_family, style.font_size)
        .context("Failed to load overlay font")?;

    let mut renderer = X11Renderer::new(&conn, screen, &atoms, &font, &initial)?;
    run_loop(&mut renderer, snapshots, dialog);

    // Windows are torn down by Drop; make sure it reaches the server before the connection closes
    drop(renderer);
    if let Err(e) = conn.flush() {
        warn!(error = %e, "Failed to flush X11 connection on exit");
    }
    Ok(())
}
