//! Overlay session state machine
//!
//! [`OverlaySession`] owns every piece of mutable overlay state. It is driven
//! one [`SessionEvent`] at a time and answers each event with the side effects
//! the executor must carry out; it never performs I/O itself.
//!
//! Phase is derived from the owned fields rather than stored:
//! - `Hidden`: overlay not visible
//! - `Pending`: visible with a request in flight
//! - `AwaitingInput`: visible with the input dialog open
//! - `Idle`: visible, nothing else going on

pub mod executor;
pub mod history;

use chrono::{DateTime, Local};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capture::Screenshot;
use crate::config::{Settings, parse_hex_rgb};
use crate::error::{AiError, CaptureError, RequestError};
use crate::types::{Dimensions, Position};

pub use executor::{Executor, ExecutorConfig};
pub use history::BoundedFifo;

/// Busy notices kept for display
const MAX_NOTICES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Hidden,
    Idle,
    AwaitingInput,
    Pending,
}

/// What started (or tried to start) a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    OpenInput,
    Submit,
    AutoInterval,
}

impl Trigger {
    pub fn describe(self) -> &'static str {
        match self {
            Trigger::OpenInput => "open input",
            Trigger::Submit => "submit",
            Trigger::AutoInterval => "auto capture",
        }
    }
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    ToggleVisibility,
    CyclePosition,
    OpenInput,
    Submit(String),
    CancelInput,
    AutoIntervalFired,
    CaptureCompleted {
        request_id: RequestId,
        result: Result<Screenshot, CaptureError>,
    },
    AiCompleted {
        request_id: RequestId,
        result: Result<String, AiError>,
    },
    DeadlineElapsed {
        request_id: RequestId,
    },
    Shutdown,
}

/// Work the executor performs on behalf of the session
#[derive(Debug, Clone)]
pub enum Effect {
    Capture {
        request_id: RequestId,
    },
    Ask {
        request_id: RequestId,
        screenshot: Arc<Screenshot>,
        prompt: Option<String>,
        cancel: CancellationToken,
    },
    ArmDeadline {
        request_id: RequestId,
        after: Duration,
    },
    /// Request was cancelled; drop its worker if it has not stopped after the grace period
    Abandon {
        request_id: RequestId,
    },
}

/// Presentation settings the session carries but never interprets
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayStyle {
    pub dimensions: Dimensions,
    pub font_family: String,
    pub font_size: f32,
    /// 0xRRGGBB
    pub text_color: u32,
    pub background_color: u32,
    pub visible_messages: usize,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            dimensions: Dimensions::new(400, 300),
            font_family: String::new(),
            font_size: 14.0,
            text_color: 0xFFFFFF,
            background_color: 0x1A1A1A,
            visible_messages: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayState {
    pub visible: bool,
    pub position: Position,
    pub click_through: bool,
    pub always_on_top: bool,
    /// 0.0..=1.0
    pub opacity: f32,
    /// Input dialog surface shown
    pub input_open: bool,
    pub style: OverlayStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStage {
    Capturing,
    Asking,
}

#[derive(Debug)]
pub struct InFlightRequest {
    pub request_id: RequestId,
    pub issued_at: DateTime<Local>,
    pub prompt: Option<String>,
    pub stage: RequestStage,
    pub deadline: Duration,
    cancel: CancellationToken,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseRecord {
    pub request_id: RequestId,
    /// User text bound to the request (None for automatic captures)
    pub prompt: Option<String>,
    pub outcome: Result<String, RequestError>,
    pub received_at: DateTime<Local>,
}

impl ResponseRecord {
    pub fn text(&self) -> Option<&str> {
        self.outcome.as_deref().ok()
    }

    pub fn error(&self) -> Option<&RequestError> {
        self.outcome.as_ref().err()
    }
}

/// A trigger rejected because a request was already in flight
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub trigger: Trigger,
    pub blocked_by: RequestId,
    pub at: DateTime<Local>,
}

/// In-flight request as seen by the renderer
#[derive(Debug, Clone, PartialEq)]
pub struct PendingView {
    pub request_id: RequestId,
    pub prompt: Option<String>,
    pub stage: RequestStage,
    pub issued_at: DateTime<Local>,
}

/// Read-only copy of the session published after each applied event
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub overlay: OverlayState,
    pub history: Vec<ResponseRecord>,
    pub notices: Vec<Notice>,
    pub pending: Option<PendingView>,
    pub screenshots: usize,
    pub terminal: bool,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub start_visible: bool,
    pub position: Position,
    pub opacity: f32,
    pub style: OverlayStyle,
    pub max_history: usize,
    pub max_screenshots: usize,
    pub request_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            start_visible: true,
            position: Position::default(),
            opacity: 0.85,
            style: OverlayStyle::default(),
            max_history: 50,
            max_screenshots: 5,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl SessionConfig {
    /// Settings are expected to be validated already
    pub fn from_settings(settings: &Settings) -> Self {
        let overlay = &settings.overlay;
        let style = OverlayStyle {
            dimensions: overlay.dimensions(),
            font_family: overlay.font_family.clone(),
            font_size: overlay.font_size,
            text_color: parse_hex_rgb(&overlay.text_color).unwrap_or(0xFFFFFF),
            background_color: parse_hex_rgb(&overlay.background_color).unwrap_or(0x1A1A1A),
            visible_messages: overlay.visible_messages,
        };
        Self {
            start_visible: settings.session.start_visible,
            position: overlay.position,
            opacity: f32::from(overlay.opacity_percent) / 100.0,
            style,
            max_history: settings.session.max_history,
            max_screenshots: settings.capture.max_screenshots,
            request_timeout: settings.session.request_timeout(),
        }
    }
}

pub struct OverlaySession {
    overlay: OverlayState,
    in_flight: Option<InFlightRequest>,
    history: BoundedFifo<ResponseRecord>,
    screenshots: BoundedFifo<Arc<Screenshot>>,
    notices: BoundedFifo<Notice>,
    request_timeout: Duration,
    next_request_id: u64,
    terminal: bool,
}

impl OverlaySession {
    pub fn new(config: SessionConfig) -> Self {
        let visible = config.start_visible;
        Self {
            overlay: OverlayState {
                visible,
                position: config.position,
                click_through: true,
                always_on_top: visible,
                opacity: config.opacity.clamp(0.0, 1.0),
                input_open: false,
                style: config.style,
            },
            in_flight: None,
            history: BoundedFifo::new(config.max_history),
            screenshots: BoundedFifo::new(config.max_screenshots),
            notices: BoundedFifo::new(MAX_NOTICES),
            request_timeout: config.request_timeout,
            next_request_id: 1,
            terminal: false,
        }
    }

    pub fn phase(&self) -> Phase {
        if !self.overlay.visible {
            Phase::Hidden
        } else if self.in_flight.is_some() {
            Phase::Pending
        } else if self.overlay.input_open {
            Phase::AwaitingInput
        } else {
            Phase::Idle
        }
    }

    pub fn overlay(&self) -> &OverlayState {
        &self.overlay
    }

    pub fn in_flight(&self) -> Option<&InFlightRequest> {
        self.in_flight.as_ref()
    }

    pub fn history(&self) -> &BoundedFifo<ResponseRecord> {
        &self.history
    }

    pub fn screenshots(&self) -> &BoundedFifo<Arc<Screenshot>> {
        &self.screenshots
    }

    pub fn notices(&self) -> &BoundedFifo<Notice> {
        &self.notices
    }

    /// Set once shutdown has been applied; every later event is ignored
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase(),
            overlay: self.overlay.clone(),
            history: self.history.to_vec(),
            notices: self.notices.to_vec(),
            pending: self.in_flight.as_ref().map(|req| PendingView {
                request_id: req.request_id,
                prompt: req.prompt.clone(),
                stage: req.stage,
                issued_at: req.issued_at,
            }),
            screenshots: self.screenshots.len(),
            terminal: self.terminal,
        }
    }

    /// Apply one event and return the effects it requires
    pub fn handle(&mut self, event: SessionEvent) -> Vec<Effect> {
        if self.terminal {
            debug!(event = ?EventName(&event), "Session terminated, ignoring event");
            return Vec::new();
        }

        let phase = self.phase();
        let mut effects = Vec::new();

        match (phase, event) {
            (Phase::Hidden, SessionEvent::ToggleVisibility) => {
                self.show();
            }
            (_, SessionEvent::ToggleVisibility) => {
                self.hide(&mut effects);
            }

            (Phase::Hidden, SessionEvent::CyclePosition) => {}
            (_, SessionEvent::CyclePosition) => {
                let from = self.overlay.position;
                self.overlay.position = from.next();
                info!(from = %from, to = %self.overlay.position, "Cycled overlay position");
            }

            (Phase::Idle, SessionEvent::OpenInput) => {
                self.overlay.input_open = true;
                debug!("Input dialog opened");
            }
            (Phase::Pending, SessionEvent::OpenInput) => self.reject(Trigger::OpenInput),

            (Phase::AwaitingInput, SessionEvent::Submit(text)) => {
                self.overlay.input_open = false;
                let text = text.trim();
                if text.is_empty() {
                    debug!("Empty submission, closing input dialog");
                } else {
                    self.issue(Some(text.to_string()), &mut effects);
                }
            }
            (Phase::Pending, SessionEvent::Submit(_)) => self.reject(Trigger::Submit),

            (Phase::AwaitingInput, SessionEvent::CancelInput) => {
                self.overlay.input_open = false;
                debug!("Input dialog cancelled");
            }

            (Phase::Idle, SessionEvent::AutoIntervalFired) => self.issue(None, &mut effects),
            (Phase::Pending, SessionEvent::AutoIntervalFired) => self.reject(Trigger::AutoInterval),

            (_, SessionEvent::CaptureCompleted { request_id, result }) => {
                self.on_capture(request_id, result, &mut effects);
            }
            (_, SessionEvent::AiCompleted { request_id, result }) => {
                if self.is_current(request_id, "AI result") {
                    self.resolve(result.map_err(RequestError::from));
                }
            }
            (_, SessionEvent::DeadlineElapsed { request_id }) => {
                if self.is_current(request_id, "deadline") {
                    warn!(request_id = %request_id, "Request deadline elapsed");
                    self.cancel_in_flight(&mut effects);
                    self.resolve(Err(RequestError::Ai(AiError::Timeout)));
                }
            }

            (_, SessionEvent::Shutdown) => {
                info!("Shutting down overlay session");
                self.hide(&mut effects);
                self.terminal = true;
            }

            (phase, event) => {
                debug!(phase = ?phase, event = ?EventName(&event), "Event ignored in current phase");
            }
        }

        effects
    }

    fn show(&mut self) {
        self.overlay.visible = true;
        self.overlay.always_on_top = true;
        self.overlay.click_through = true;
        self.overlay.input_open = false;
        info!(position = %self.overlay.position, "Overlay shown");
    }

    fn hide(&mut self, effects: &mut Vec<Effect>) {
        self.cancel_in_flight(effects);
        self.in_flight = None;
        self.overlay.visible = false;
        self.overlay.always_on_top = false;
        // click_through stays set; the input region is never reset on a mapped window
        self.overlay.input_open = false;
        info!("Overlay hidden");
    }

    fn cancel_in_flight(&mut self, effects: &mut Vec<Effect>) {
        if let Some(req) = &self.in_flight {
            info!(request_id = %req.request_id, "Cancelling in-flight request");
            req.cancel.cancel();
            effects.push(Effect::Abandon {
                request_id: req.request_id,
            });
        }
    }

    fn issue(&mut self, prompt: Option<String>, effects: &mut Vec<Effect>) {
        let request_id = RequestId::new(self.next_request_id);
        self.next_request_id += 1;

        info!(request_id = %request_id, with_prompt = prompt.is_some(), "Issuing capture request");
        let req = InFlightRequest {
            request_id,
            issued_at: Local::now(),
            prompt,
            stage: RequestStage::Capturing,
            deadline: self.request_timeout,
            cancel: CancellationToken::new(),
        };
        effects.push(Effect::Capture { request_id });
        effects.push(Effect::ArmDeadline {
            request_id,
            after: req.deadline,
        });
        self.in_flight = Some(req);
    }

    fn reject(&mut self, trigger: Trigger) {
        let Some(req) = &self.in_flight else {
            return;
        };
        warn!(trigger = trigger.describe(), blocked_by = %req.request_id, "Request already in flight, trigger rejected");
        self.notices.push(Notice {
            trigger,
            blocked_by: req.request_id,
            at: Local::now(),
        });
    }

    fn is_current(&self, request_id: RequestId, what: &str) -> bool {
        let current = self.in_flight.as_ref().map(|req| req.request_id);
        if current == Some(request_id) {
            true
        } else {
            debug!(request_id = %request_id, current = ?current, what, "Discarding stale completion");
            false
        }
    }

    fn on_capture(
        &mut self,
        request_id: RequestId,
        result: Result<Screenshot, CaptureError>,
        effects: &mut Vec<Effect>,
    ) {
        if !self.is_current(request_id, "capture") {
            return;
        }
        match result {
            Ok(screenshot) => {
                let Some(req) = self.in_flight.as_mut() else {
                    return;
                };
                if req.stage != RequestStage::Capturing {
                    debug!(request_id = %request_id, "Duplicate capture completion ignored");
                    return;
                }
                req.stage = RequestStage::Asking;
                let screenshot = Arc::new(screenshot);
                self.screenshots.push(Arc::clone(&screenshot));
                debug!(
                    request_id = %request_id,
                    width = screenshot.width,
                    height = screenshot.height,
                    "Screenshot captured, asking AI"
                );
                effects.push(Effect::Ask {
                    request_id,
                    screenshot,
                    prompt: req.prompt.clone(),
                    cancel: req.cancel.clone(),
                });
            }
            Err(e) => {
                warn!(request_id = %request_id, error = %e, "Screen capture failed");
                self.resolve(Err(e.into()));
            }
        }
    }

    fn resolve(&mut self, outcome: Result<String, RequestError>) {
        let Some(req) = self.in_flight.take() else {
            return;
        };
        match &outcome {
            Ok(text) => info!(request_id = %req.request_id, chars = text.chars().count(), "Response received"),
            Err(e) => warn!(request_id = %req.request_id, error = %e, "Request failed"),
        }
        self.history.push(ResponseRecord {
            request_id: req.request_id,
            prompt: req.prompt,
            outcome,
            received_at: Local::now(),
        });
    }
}

/// Event name without payloads (screenshots are large)
struct EventName<'a>(&'a SessionEvent);

impl fmt::Debug for EventName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.0 {
            SessionEvent::ToggleVisibility => "ToggleVisibility",
            SessionEvent::CyclePosition => "CyclePosition",
            SessionEvent::OpenInput => "OpenInput",
            SessionEvent::Submit(_) => "Submit",
            SessionEvent::CancelInput => "CancelInput",
            SessionEvent::AutoIntervalFired => "AutoIntervalFired",
            SessionEvent::CaptureCompleted { .. } => "CaptureCompleted",
            SessionEvent::AiCompleted { .. } => "AiCompleted",
            SessionEvent::DeadlineElapsed { .. } => "DeadlineElapsed",
            SessionEvent::Shutdown => "Shutdown",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(start_visible: bool) -> SessionConfig {
        SessionConfig {
            start_visible,
            max_history: 3,
            max_screenshots: 2,
            ..SessionConfig::default()
        }
    }

    fn screenshot() -> Screenshot {
        Screenshot {
            captured_at: Local::now(),
            width: 4,
            height: 2,
            png: vec![0x89, b'P', b'N', b'G'],
        }
    }

    fn capture_effect(effects: &[Effect]) -> RequestId {
        effects
            .iter()
            .find_map(|e| match e {
                Effect::Capture { request_id } => Some(*request_id),
                _ => None,
            })
            .expect("capture effect")
    }

    /// Drive a visible idle session into Pending/Asking; returns the request id
    fn start_request(session: &mut OverlaySession, prompt: &str) -> RequestId {
        session.handle(SessionEvent::OpenInput);
        let effects = session.handle(SessionEvent::Submit(prompt.to_string()));
        let id = capture_effect(&effects);
        let effects = session.handle(SessionEvent::CaptureCompleted {
            request_id: id,
            result: Ok(screenshot()),
        });
        assert!(matches!(effects.as_slice(), [Effect::Ask { .. }]));
        id
    }

    fn session_in(phase: Phase) -> OverlaySession {
        let mut session = OverlaySession::new(config(phase != Phase::Hidden));
        match phase {
            Phase::Hidden | Phase::Idle => {}
            Phase::AwaitingInput => {
                session.handle(SessionEvent::OpenInput);
            }
            Phase::Pending => {
                session.handle(SessionEvent::AutoIntervalFired);
            }
        }
        assert_eq!(session.phase(), phase);
        session
    }

    fn user_events() -> Vec<SessionEvent> {
        vec![
            SessionEvent::ToggleVisibility,
            SessionEvent::CyclePosition,
            SessionEvent::OpenInput,
            SessionEvent::Submit("hello".into()),
            SessionEvent::CancelInput,
            SessionEvent::AutoIntervalFired,
        ]
    }

    #[test]
    fn test_transition_table() {
        use Phase::*;
        let expected = [
            // (from, event index, to)
            (Hidden, 0, Idle),
            (Hidden, 1, Hidden),
            (Hidden, 2, Hidden),
            (Hidden, 3, Hidden),
            (Hidden, 4, Hidden),
            (Hidden, 5, Hidden),
            (Idle, 0, Hidden),
            (Idle, 1, Idle),
            (Idle, 2, AwaitingInput),
            (Idle, 3, Idle),
            (Idle, 4, Idle),
            (Idle, 5, Pending),
            (AwaitingInput, 0, Hidden),
            (AwaitingInput, 1, AwaitingInput),
            (AwaitingInput, 2, AwaitingInput),
            (AwaitingInput, 3, Pending),
            (AwaitingInput, 4, Idle),
            (AwaitingInput, 5, AwaitingInput),
            (Pending, 0, Hidden),
            (Pending, 1, Pending),
            (Pending, 2, Pending),
            (Pending, 3, Pending),
            (Pending, 4, Pending),
            (Pending, 5, Pending),
        ];
        for (from, index, to) in expected {
            let mut session = session_in(from);
            let event = user_events().remove(index);
            let label = format!("{from:?} + {:?}", EventName(&event));
            session.handle(event);
            assert_eq!(session.phase(), to, "{label}");
        }
    }

    #[test]
    fn test_show_sets_click_through_and_on_top_together() {
        let mut session = session_in(Phase::Hidden);
        assert!(session.overlay().click_through);
        session.handle(SessionEvent::ToggleVisibility);
        let overlay = session.overlay();
        assert!(overlay.visible && overlay.click_through && overlay.always_on_top);
    }

    #[test]
    fn test_click_through_survives_hide() {
        let mut session = session_in(Phase::Pending);
        session.handle(SessionEvent::ToggleVisibility);
        let overlay = session.overlay();
        assert!(!overlay.visible && !overlay.always_on_top);
        assert!(overlay.click_through);
    }

    #[test]
    fn test_cycle_position_eight_times_returns_to_start() {
        let mut session = session_in(Phase::Idle);
        let start = session.overlay().position;
        for step in 1..=8 {
            session.handle(SessionEvent::CyclePosition);
            assert_eq!(session.overlay().position.index(), (start.index() + step) % 8);
        }
        assert_eq!(session.overlay().position, start);
    }

    #[test]
    fn test_at_most_one_in_flight_for_any_trigger_interleaving() {
        let triggers = [
            SessionEvent::AutoIntervalFired,
            SessionEvent::OpenInput,
            SessionEvent::Submit("a".into()),
            SessionEvent::AutoIntervalFired,
            SessionEvent::CyclePosition,
            SessionEvent::OpenInput,
            SessionEvent::Submit("b".into()),
        ];
        let mut session = session_in(Phase::Idle);
        let mut captures = 0;
        for event in triggers {
            let effects = session.handle(event);
            captures += effects.iter().filter(|e| matches!(e, Effect::Capture { .. })).count();
            assert!(captures <= 1);
        }
        assert_eq!(captures, 1);
        assert_eq!(session.phase(), Phase::Pending);
    }

    #[test]
    fn test_trigger_while_pending_records_busy_notice() {
        let mut session = session_in(Phase::Pending);
        let current = session.in_flight().map(|r| r.request_id).unwrap();

        for (event, trigger) in [
            (SessionEvent::AutoIntervalFired, Trigger::AutoInterval),
            (SessionEvent::OpenInput, Trigger::OpenInput),
            (SessionEvent::Submit("again".into()), Trigger::Submit),
        ] {
            let effects = session.handle(event);
            assert!(effects.is_empty());
            let notice = session.notices().latest().unwrap();
            assert_eq!(notice.trigger, trigger);
            assert_eq!(notice.blocked_by, current);
        }
        assert_eq!(session.notices().len(), 3);
        assert!(session.history().is_empty());
    }

    #[test]
    fn test_completion_failure_and_timeout_return_to_idle() {
        let outcomes: Vec<Box<dyn Fn(RequestId) -> SessionEvent>> = vec![
            Box::new(|id| SessionEvent::AiCompleted {
                request_id: id,
                result: Ok("fine".into()),
            }),
            Box::new(|id| SessionEvent::AiCompleted {
                request_id: id,
                result: Err(AiError::Network("reset".into())),
            }),
            Box::new(|id| SessionEvent::DeadlineElapsed { request_id: id }),
        ];
        for outcome in outcomes {
            let mut session = session_in(Phase::Idle);
            let id = start_request(&mut session, "hi");
            session.handle(outcome(id));
            assert_eq!(session.phase(), Phase::Idle);
            assert!(session.in_flight().is_none());
            assert_eq!(session.history().len(), 1);
        }
    }

    #[test]
    fn test_capture_failure_records_error_and_returns_to_idle() {
        let mut session = session_in(Phase::Idle);
        let id = capture_effect(&session.handle(SessionEvent::AutoIntervalFired));
        let effects = session.handle(SessionEvent::CaptureCompleted {
            request_id: id,
            result: Err(CaptureError::Denied("BadMatch".into())),
        });
        assert!(effects.is_empty());
        assert_eq!(session.phase(), Phase::Idle);
        let record = session.history().latest().unwrap();
        assert_eq!(
            record.error(),
            Some(&RequestError::Capture(CaptureError::Denied("BadMatch".into())))
        );
        assert!(session.screenshots().is_empty());
    }

    #[test]
    fn test_hide_while_pending_clears_request_and_cancels() {
        let mut session = session_in(Phase::Idle);
        let id = start_request(&mut session, "hi");
        let token = session.in_flight().unwrap().cancel.clone();

        let effects = session.handle(SessionEvent::ToggleVisibility);
        assert_eq!(session.phase(), Phase::Hidden);
        assert!(session.in_flight().is_none());
        assert!(token.is_cancelled());
        assert!(matches!(effects.as_slice(), [Effect::Abandon { request_id }] if *request_id == id));

        // Late result after hide is dropped
        session.handle(SessionEvent::AiCompleted {
            request_id: id,
            result: Ok("late".into()),
        });
        assert!(session.history().is_empty());
    }

    #[test]
    fn test_history_and_screenshots_bounded_fifo() {
        let mut session = session_in(Phase::Idle);
        let mut ids = Vec::new();
        for i in 0..5 {
            let id = start_request(&mut session, &format!("q{i}"));
            session.handle(SessionEvent::AiCompleted {
                request_id: id,
                result: Ok(format!("a{i}")),
            });
            ids.push(id);
            assert!(session.history().len() <= 3);
            assert!(session.screenshots().len() <= 2);
        }
        let kept: Vec<RequestId> = session.history().iter().map(|r| r.request_id).collect();
        assert_eq!(kept, ids[2..].to_vec());
        assert_eq!(session.screenshots().len(), 2);
    }

    #[test]
    fn test_scenario_hidden_to_answer() {
        let mut session = session_in(Phase::Hidden);
        session.handle(SessionEvent::ToggleVisibility);
        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(session.overlay().position, Position::default());

        session.handle(SessionEvent::OpenInput);
        assert_eq!(session.phase(), Phase::AwaitingInput);
        assert!(session.overlay().input_open);

        let effects = session.handle(SessionEvent::Submit("status?".into()));
        assert_eq!(session.phase(), Phase::Pending);
        assert!(!session.overlay().input_open);
        let id = capture_effect(&effects);
        assert!(effects.iter().any(|e| matches!(e, Effect::ArmDeadline { .. })));

        let effects = session.handle(SessionEvent::CaptureCompleted {
            request_id: id,
            result: Ok(screenshot()),
        });
        match effects.as_slice() {
            [Effect::Ask { prompt, .. }] => assert_eq!(prompt.as_deref(), Some("status?")),
            other => panic!("unexpected effects {other:?}"),
        }
        assert_eq!(session.phase(), Phase::Pending);

        session.handle(SessionEvent::AiCompleted {
            request_id: id,
            result: Ok("ok".into()),
        });
        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(session.history().len(), 1);
        let record = session.history().latest().unwrap();
        assert_eq!(record.text(), Some("ok"));
        assert_eq!(record.prompt.as_deref(), Some("status?"));
    }

    #[test]
    fn test_scenario_cycle_twice_while_pending() {
        let mut session = session_in(Phase::Idle);
        let id = start_request(&mut session, "hi");
        let start = session.overlay().position;

        for _ in 0..2 {
            let effects = session.handle(SessionEvent::CyclePosition);
            assert!(effects.is_empty());
        }
        assert_eq!(session.phase(), Phase::Pending);
        assert_eq!(session.overlay().position, start.next().next());
        let req = session.in_flight().unwrap();
        assert_eq!(req.request_id, id);
        assert_eq!(req.stage, RequestStage::Asking);
        assert!(!req.cancel.is_cancelled());
    }

    #[test]
    fn test_scenario_deadline_then_late_result_discarded() {
        let mut session = session_in(Phase::Idle);
        let id = start_request(&mut session, "hi");
        let token = session.in_flight().unwrap().cancel.clone();

        let effects = session.handle(SessionEvent::DeadlineElapsed { request_id: id });
        assert!(matches!(effects.as_slice(), [Effect::Abandon { .. }]));
        assert!(token.is_cancelled());
        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(
            session.history().latest().unwrap().error(),
            Some(&RequestError::Ai(AiError::Timeout))
        );

        session.handle(SessionEvent::AiCompleted {
            request_id: id,
            result: Ok("too late".into()),
        });
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.phase(), Phase::Idle);
    }

    #[test]
    fn test_stale_deadline_from_previous_request_ignored() {
        let mut session = session_in(Phase::Idle);
        let first = start_request(&mut session, "one");
        session.handle(SessionEvent::AiCompleted {
            request_id: first,
            result: Ok("done".into()),
        });
        let second = start_request(&mut session, "two");

        session.handle(SessionEvent::DeadlineElapsed { request_id: first });
        assert_eq!(session.phase(), Phase::Pending);
        assert_eq!(session.in_flight().unwrap().request_id, second);
    }

    #[test]
    fn test_blank_submit_closes_dialog_without_request() {
        let mut session = session_in(Phase::AwaitingInput);
        let effects = session.handle(SessionEvent::Submit("   ".into()));
        assert!(effects.is_empty());
        assert_eq!(session.phase(), Phase::Idle);
    }

    #[test]
    fn test_auto_capture_has_no_prompt() {
        let mut session = session_in(Phase::Idle);
        session.handle(SessionEvent::AutoIntervalFired);
        assert_eq!(session.in_flight().unwrap().prompt, None);
    }

    #[test]
    fn test_shutdown_is_terminal() {
        let mut session = session_in(Phase::Pending);
        let effects = session.handle(SessionEvent::Shutdown);
        assert!(matches!(effects.as_slice(), [Effect::Abandon { .. }]));
        assert_eq!(session.phase(), Phase::Hidden);
        assert!(session.is_terminal());

        session.handle(SessionEvent::ToggleVisibility);
        assert_eq!(session.phase(), Phase::Hidden);
        assert!(session.snapshot().terminal);
    }

    #[test]
    fn test_request_ids_increase() {
        let mut session = session_in(Phase::Idle);
        let first = start_request(&mut session, "a");
        session.handle(SessionEvent::AiCompleted {
            request_id: first,
            result: Ok("x".into()),
        });
        let second = start_request(&mut session, "b");
        assert!(second > first);
    }

    #[test]
    fn test_snapshot_reflects_pending_request() {
        let mut session = session_in(Phase::Idle);
        start_request(&mut session, "what now");
        let snapshot = session.snapshot();
        assert_eq!(snapshot.phase, Phase::Pending);
        let pending = snapshot.pending.unwrap();
        assert_eq!(pending.prompt.as_deref(), Some("what now"));
        assert_eq!(pending.stage, RequestStage::Asking);
        assert_eq!(snapshot.screenshots, 1);
    }
}
