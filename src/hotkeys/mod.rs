//! Hotkey bus
//!
//! Keyboard listener threads and the input dialog push named events into one
//! unbounded channel; the session executor is the single consumer. The bus is
//! consumed by [`HotkeyBus::subscribe`], so it can only be subscribed once.

pub mod binding;
pub mod listener;

use tokio::sync::mpsc;
use tracing::debug;

use crate::session::SessionEvent;

pub use binding::HotkeyBinding;
pub use listener::{HotkeyAction, spawn_listeners};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    ToggleVisibility,
    CyclePosition,
    OpenInput,
    Submit(String),
    CancelInput,
}

impl From<BusEvent> for SessionEvent {
    fn from(event: BusEvent) -> Self {
        match event {
            BusEvent::ToggleVisibility => SessionEvent::ToggleVisibility,
            BusEvent::CyclePosition => SessionEvent::CyclePosition,
            BusEvent::OpenInput => SessionEvent::OpenInput,
            BusEvent::Submit(text) => SessionEvent::Submit(text),
            BusEvent::CancelInput => SessionEvent::CancelInput,
        }
    }
}

impl From<HotkeyAction> for BusEvent {
    fn from(action: HotkeyAction) -> Self {
        match action {
            HotkeyAction::ToggleVisibility => BusEvent::ToggleVisibility,
            HotkeyAction::CyclePosition => BusEvent::CyclePosition,
            HotkeyAction::OpenInput => BusEvent::OpenInput,
        }
    }
}

pub struct HotkeyBus {
    rx: mpsc::UnboundedReceiver<BusEvent>,
    tx: mpsc::UnboundedSender<BusEvent>,
}

impl HotkeyBus {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { rx, tx }
    }

    /// Producer handle for hotkey listener threads
    pub fn hotkey_sender(&self) -> HotkeySender {
        HotkeySender { tx: self.tx.clone() }
    }

    /// Producer handle for the renderer's input dialog
    pub fn dialog_sender(&self) -> DialogSender {
        DialogSender { tx: self.tx.clone() }
    }

    /// Start consuming. The stream ends once every sender is dropped.
    pub fn subscribe(self) -> HotkeyEvents {
        HotkeyEvents { rx: self.rx }
    }
}

impl Default for HotkeyBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Sends the three hotkey actions; safe to use from plain OS threads
#[derive(Clone)]
pub struct HotkeySender {
    tx: mpsc::UnboundedSender<BusEvent>,
}

impl HotkeySender {
    /// Returns false once the consumer has gone away
    pub fn send(&self, action: HotkeyAction) -> bool {
        debug!(action = ?action, "Hotkey event");
        self.tx.send(action.into()).is_ok()
    }
}

/// The only path from the renderer back into the session
#[derive(Clone)]
pub struct DialogSender {
    tx: mpsc::UnboundedSender<BusEvent>,
}

impl DialogSender {
    pub fn submit(&self, text: String) -> bool {
        self.tx.send(BusEvent::Submit(text)).is_ok()
    }

    pub fn cancel(&self) -> bool {
        self.tx.send(BusEvent::CancelInput).is_ok()
    }
}

pub struct HotkeyEvents {
    rx: mpsc::UnboundedReceiver<BusEvent>,
}

impl HotkeyEvents {
    /// Next event in delivery order; `None` once all producers are gone
    pub async fn next(&mut self) -> Option<BusEvent> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_delivered_in_send_order() {
        let bus = HotkeyBus::new();
        let hotkeys = bus.hotkey_sender();
        let dialog = bus.dialog_sender();
        let mut events = bus.subscribe();

        assert!(hotkeys.send(HotkeyAction::OpenInput));
        assert!(dialog.submit("hi".into()));
        assert!(hotkeys.send(HotkeyAction::CyclePosition));
        assert!(dialog.cancel());

        assert_eq!(events.next().await, Some(BusEvent::OpenInput));
        assert_eq!(events.next().await, Some(BusEvent::Submit("hi".into())));
        assert_eq!(events.next().await, Some(BusEvent::CyclePosition));
        assert_eq!(events.next().await, Some(BusEvent::CancelInput));
    }

    #[tokio::test]
    async fn test_stream_ends_when_senders_dropped() {
        let bus = HotkeyBus::new();
        let sender = bus.hotkey_sender();
        let mut events = bus.subscribe();
        drop(sender);
        assert_eq!(events.next().await, None);
    }

    #[test]
    fn test_send_from_os_thread() {
        let bus = HotkeyBus::new();
        let sender = bus.hotkey_sender();
        let mut events = bus.subscribe();
        std::thread::spawn(move || {
            sender.send(HotkeyAction::ToggleVisibility);
        })
        .join()
        .unwrap();
        assert_eq!(events.rx.try_recv(), Ok(BusEvent::ToggleVisibility));
    }

    #[test]
    fn test_send_fails_after_consumer_dropped() {
        let bus = HotkeyBus::new();
        let dialog = bus.dialog_sender();
        drop(bus.subscribe());
        assert!(!dialog.cancel());
    }
}
