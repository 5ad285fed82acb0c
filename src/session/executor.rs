//! Serialized executor
//!
//! The only place [`OverlaySession`] is mutated. One task takes events from the
//! hotkey bus, worker completions, the auto-capture ticker and the shutdown
//! token, applies each fully, runs the resulting effects and publishes a
//! snapshot before taking the next event.

use std::collections::HashMap;
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::{AbortHandle, JoinError, JoinHandle};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{Effect, OverlaySession, RequestId, SessionEvent, SessionSnapshot};
use crate::ai::{AiClient, AskRequest};
use crate::capture::CaptureSource;
use crate::config::Settings;
use crate::error::{AiError, CaptureError};
use crate::hotkeys::HotkeyEvents;

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Time a cancelled worker gets before it is aborted
    pub cancel_grace: Duration,
    /// Auto capture period (None disables)
    pub auto_interval: Option<Duration>,
}

impl ExecutorConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            cancel_grace: settings.session.cancel_grace(),
            auto_interval: settings.capture.auto_interval(),
        }
    }
}

pub struct Executor {
    session: OverlaySession,
    capture: Arc<dyn CaptureSource>,
    ai: Arc<dyn AiClient>,
    config: ExecutorConfig,
    snapshots: watch::Sender<SessionSnapshot>,
    completions_tx: mpsc::UnboundedSender<SessionEvent>,
    completions_rx: mpsc::UnboundedReceiver<SessionEvent>,
    workers: HashMap<RequestId, AbortHandle>,
    deadlines: HashMap<RequestId, AbortHandle>,
}

impl Executor {
    pub fn new(
        session: OverlaySession,
        capture: Arc<dyn CaptureSource>,
        ai: Arc<dyn AiClient>,
        config: ExecutorConfig,
    ) -> Self {
        let (snapshots, _) = watch::channel(session.snapshot());
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            session,
            capture,
            ai,
            config,
            snapshots,
            completions_tx,
            completions_rx,
            workers: HashMap::new(),
            deadlines: HashMap::new(),
        }
    }

    /// Receiver for the renderer; holds the current snapshot immediately
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.subscribe()
    }

    /// Run until `shutdown` fires. Returns the terminated session.
    pub async fn run(mut self, mut events: HotkeyEvents, shutdown: CancellationToken) -> OverlaySession {
        let mut ticker = self.config.auto_interval.map(|period| {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker
        });
        let mut bus_open = true;

        info!(
            auto_interval = ?self.config.auto_interval,
            phase = ?self.session.phase(),
            "Session executor started"
        );

        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.cancelled() => SessionEvent::Shutdown,
                Some(event) = self.completions_rx.recv() => event,
                event = events.next(), if bus_open => match event {
                    Some(event) => event.into(),
                    None => {
                        warn!("Hotkey bus closed; only timers remain");
                        bus_open = false;
                        continue;
                    }
                },
                _ = tick(&mut ticker) => SessionEvent::AutoIntervalFired,
            };

            self.apply(event);
            if self.session.is_terminal() {
                break;
            }
        }

        for (request_id, handle) in self.deadlines.drain() {
            debug!(request_id = %request_id, "Dropping deadline timer");
            handle.abort();
        }
        info!("Session executor stopped");
        self.session
    }

    fn apply(&mut self, event: SessionEvent) {
        if let SessionEvent::CaptureCompleted { request_id, .. }
        | SessionEvent::AiCompleted { request_id, .. } = &event
        {
            self.workers.remove(request_id);
        }

        let effects = self.session.handle(event);
        for effect in effects {
            self.dispatch(effect);
        }
        self.prune();
        self.snapshots.send_replace(self.session.snapshot());
    }

    fn dispatch(&mut self, effect: Effect) {
        match effect {
            Effect::Capture { request_id } => {
                let capture = Arc::clone(&self.capture);
                let work = tokio::task::spawn_blocking(move || capture.capture());
                self.track(request_id, work, move |joined| SessionEvent::CaptureCompleted {
                    request_id,
                    result: joined.unwrap_or_else(|e| Err(CaptureError::Unavailable(join_failure(&e)))),
                });
            }
            Effect::Ask {
                request_id,
                screenshot,
                prompt,
                cancel,
            } => {
                let ai = Arc::clone(&self.ai);
                let request = AskRequest {
                    request_id,
                    screenshot,
                    prompt,
                };
                let work = tokio::spawn(async move { ai.ask(request, cancel).await });
                self.track(request_id, work, move |joined| SessionEvent::AiCompleted {
                    request_id,
                    result: joined.unwrap_or_else(|e| {
                        if e.is_cancelled() {
                            Err(AiError::Cancelled)
                        } else {
                            Err(AiError::ProviderError(join_failure(&e)))
                        }
                    }),
                });
            }
            Effect::ArmDeadline { request_id, after } => {
                let tx = self.completions_tx.clone();
                let timer = tokio::spawn(async move {
                    tokio::time::sleep(after).await;
                    let _ = tx.send(SessionEvent::DeadlineElapsed { request_id });
                });
                self.deadlines.insert(request_id, timer.abort_handle());
            }
            Effect::Abandon { request_id } => {
                if let Some(handle) = self.deadlines.remove(&request_id) {
                    handle.abort();
                }
                let Some(worker) = self.workers.remove(&request_id) else {
                    return;
                };
                let grace = self.config.cancel_grace;
                tokio::spawn(async move {
                    tokio::time::sleep(grace).await;
                    if !worker.is_finished() {
                        warn!(request_id = %request_id, "Worker ignored cancellation, aborting");
                        worker.abort();
                    }
                });
            }
        }
    }

    /// Relay a worker's result back into the executor as an event
    fn track<T: Send + 'static>(
        &mut self,
        request_id: RequestId,
        work: JoinHandle<T>,
        complete: impl FnOnce(Result<T, JoinError>) -> SessionEvent + Send + 'static,
    ) {
        self.workers.insert(request_id, work.abort_handle());
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let joined = work.await;
            if let Err(e) = &joined {
                if e.is_panic() {
                    error!(request_id = %request_id, "Worker panicked");
                }
            }
            let _ = tx.send(complete(joined));
        });
    }

    /// Forget timers and workers of requests that are no longer in flight
    fn prune(&mut self) {
        let current = self.session.in_flight().map(|req| req.request_id);
        self.deadlines.retain(|id, handle| {
            let keep = Some(*id) == current;
            if !keep {
                handle.abort();
            }
            keep
        });
        self.workers.retain(|id, _| Some(*id) == current);
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => pending::<()>().await,
    }
}

fn join_failure(e: &JoinError) -> String {
    if e.is_panic() {
        "worker panicked".to_string()
    } else {
        format!("worker stopped: {e}")
    }
}
