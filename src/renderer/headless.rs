//! Renderer without a display: overlay changes and responses go to the log

use anyhow::Result;
use tracing::info;

use super::text::{LineKind, content_lines};
use super::{DialogInput, Renderer};
use crate::session::{OverlayState, RequestId, SessionSnapshot};

#[derive(Default)]
pub struct HeadlessRenderer {
    overlay: Option<OverlayState>,
    last_record: Option<RequestId>,
    notices: usize,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Renderer for HeadlessRenderer {
    fn present(&mut self, snapshot: &SessionSnapshot) -> Result<()> {
        if self.overlay.as_ref() != Some(&snapshot.overlay) {
            let o = &snapshot.overlay;
            info!(
                visible = o.visible,
                position = %o.position,
                input_open = o.input_open,
                phase = ?snapshot.phase,
                "Overlay state"
            );
            self.overlay = Some(o.clone());
        }

        let fresh = snapshot
            .history
            .iter()
            .skip_while(|r| self.last_record.is_some_and(|last| r.request_id <= last));
        for record in fresh {
            if let Some(text) = record.text() {
                info!(request = %record.request_id, prompt = ?record.prompt, "{text}");
            } else if let Some(e) = record.error() {
                info!(request = %record.request_id, prompt = ?record.prompt, error = %e, "Request failed");
            }
        }
        if let Some(last) = snapshot.history.last() {
            self.last_record = Some(last.request_id);
        }

        if snapshot.notices.len() != self.notices {
            let notice = content_lines(snapshot, chrono::Local::now())
                .into_iter()
                .find(|line| line.kind == LineKind::Notice);
            if let Some(line) = notice {
                info!("{}", line.text);
            }
            self.notices = snapshot.notices.len();
        }
        Ok(())
    }

    fn poll(&mut self) -> Result<Vec<DialogInput>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{OverlaySession, SessionConfig, SessionEvent};

    #[test]
    fn test_tracks_latest_record() {
        let mut session = OverlaySession::new(SessionConfig::default());
        let mut renderer = HeadlessRenderer::new();
        renderer.present(&session.snapshot()).unwrap();
        assert_eq!(renderer.last_record, None);

        session.handle(SessionEvent::OpenInput);
        session.handle(SessionEvent::Submit("q".into()));
        let id = session.in_flight().map(|r| r.request_id).unwrap();
        session.handle(SessionEvent::CaptureCompleted {
            request_id: id,
            result: Err(crate::error::CaptureError::Unavailable("no display".into())),
        });
        renderer.present(&session.snapshot()).unwrap();
        assert_eq!(renderer.last_record, Some(id));
        assert!(renderer.poll().unwrap().is_empty());
    }
}
