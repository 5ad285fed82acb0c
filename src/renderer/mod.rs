//! Overlay renderer
//!
//! Runs on its own OS thread. It watches the session's published snapshots,
//! draws whatever the latest one says and feeds dialog input back through the
//! hotkey bus. It never touches the session directly.

pub mod canvas;
pub mod dialog;
pub mod font;
pub mod font_discovery;
pub mod headless;
pub mod keymap;
pub mod layout;
pub mod text;
pub mod window;
pub mod x11;

use anyhow::Result;
use chrono::{DateTime, Local};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::constants::render::{FRAME_INTERVAL, NOTICE_DURATION};
use crate::hotkeys::DialogSender;
use crate::session::SessionSnapshot;

pub use headless::HeadlessRenderer;
pub use x11::run_x11;

/// Input produced by the dialog surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogInput {
    Submit(String),
    Cancel,
}

pub trait Renderer {
    /// Bring the surfaces in line with `snapshot`
    fn present(&mut self, snapshot: &SessionSnapshot) -> Result<()>;

    /// Drain pending window system events, returning dialog input in order
    fn poll(&mut self) -> Result<Vec<DialogInput>>;
}

/// When the newest busy notice stops being shown
fn notice_expiry(snapshot: &SessionSnapshot) -> Option<DateTime<Local>> {
    let notice = snapshot.notices.last()?;
    let expiry = notice.at + chrono::Duration::from_std(NOTICE_DURATION).ok()?;
    (expiry > Local::now()).then_some(expiry)
}

fn present(renderer: &mut dyn Renderer, snapshot: &SessionSnapshot) {
    if let Err(e) = renderer.present(snapshot) {
        warn!(error = %e, "Failed to present overlay");
    }
}

/// Drive `renderer` until the session reaches its terminal snapshot or the
/// executor goes away
pub fn run_loop(
    renderer: &mut dyn Renderer,
    mut snapshots: watch::Receiver<SessionSnapshot>,
    dialog: DialogSender,
) {
    let mut current = snapshots.borrow_and_update().clone();
    present(renderer, &current);
    let mut expiry = notice_expiry(&current);

    while !current.terminal {
        match snapshots.has_changed() {
            Ok(true) => {
                current = snapshots.borrow_and_update().clone();
                present(renderer, &current);
                expiry = notice_expiry(&current);
                continue;
            }
            Ok(false) => {}
            Err(_) => {
                // Executor gone; draw whatever it published last
                let last = snapshots.borrow().clone();
                if last != current {
                    present(renderer, &last);
                }
                debug!("Snapshot channel closed");
                break;
            }
        }

        match renderer.poll() {
            Ok(inputs) => {
                for input in inputs {
                    let delivered = match input {
                        DialogInput::Submit(text) => dialog.submit(text),
                        DialogInput::Cancel => dialog.cancel(),
                    };
                    if !delivered {
                        debug!("Dialog input dropped, session no longer listening");
                    }
                }
            }
            Err(e) => warn!(error = %e, "Failed to poll window events"),
        }

        if expiry.is_some_and(|at| Local::now() >= at) {
            expiry = None;
            present(renderer, &current);
        }

        std::thread::sleep(FRAME_INTERVAL);
    }
    info!("Renderer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkeys::{BusEvent, HotkeyBus};
    use crate::session::{Notice, OverlaySession, RequestId, SessionConfig, Trigger};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder {
        presented: Arc<Mutex<Vec<SessionSnapshot>>>,
        inputs: Vec<DialogInput>,
    }

    impl Renderer for Recorder {
        fn present(&mut self, snapshot: &SessionSnapshot) -> Result<()> {
            self.presented.lock().unwrap().push(snapshot.clone());
            Ok(())
        }

        fn poll(&mut self) -> Result<Vec<DialogInput>> {
            Ok(std::mem::take(&mut self.inputs))
        }
    }

    fn initial() -> SessionSnapshot {
        OverlaySession::new(SessionConfig::default()).snapshot()
    }

    #[tokio::test]
    async fn test_forwards_dialog_input_and_stops_on_terminal() {
        let bus = HotkeyBus::new();
        let dialog = bus.dialog_sender();
        let mut events = bus.subscribe();
        let (tx, rx) = watch::channel(initial());

        let presented = Arc::new(Mutex::new(Vec::new()));
        let mut recorder = Recorder {
            presented: presented.clone(),
            inputs: vec![DialogInput::Submit("hello".into()), DialogInput::Cancel],
        };
        let thread = std::thread::spawn(move || run_loop(&mut recorder, rx, dialog));

        assert_eq!(events.next().await, Some(BusEvent::Submit("hello".into())));
        assert_eq!(events.next().await, Some(BusEvent::CancelInput));

        let mut last = initial();
        last.terminal = true;
        tx.send_replace(last);
        thread.join().unwrap();

        let presented = presented.lock().unwrap();
        assert!(presented.len() >= 2);
        assert!(presented.last().unwrap().terminal);
    }

    #[test]
    fn test_stops_when_sender_dropped() {
        let bus = HotkeyBus::new();
        let (tx, rx) = watch::channel(initial());
        let mut update = initial();
        update.overlay.visible = true;
        tx.send_replace(update);
        let presented = Arc::new(Mutex::new(Vec::new()));
        let mut recorder = Recorder {
            presented: presented.clone(),
            inputs: Vec::new(),
        };
        let dialog = bus.dialog_sender();
        let thread = std::thread::spawn(move || run_loop(&mut recorder, rx, dialog));
        std::thread::sleep(FRAME_INTERVAL * 3);
        drop(tx);
        thread.join().unwrap();
        assert!(presented.lock().unwrap()[0].overlay.visible);
    }

    #[test]
    fn test_notice_expiry() {
        let mut snap = initial();
        assert_eq!(notice_expiry(&snap), None);

        snap.notices.push(Notice {
            trigger: Trigger::Submit,
            blocked_by: RequestId::new(1),
            at: Local::now(),
        });
        assert!(notice_expiry(&snap).is_some());

        snap.notices[0].at = Local::now() - chrono::Duration::seconds(10);
        assert_eq!(notice_expiry(&snap), None);
    }
}
