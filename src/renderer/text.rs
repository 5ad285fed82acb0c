//! Overlay text content: which lines to show and how they wrap

use chrono::{DateTime, Local};

use crate::constants::render::{NOTICE_DURATION, PENDING_LINE};
use crate::session::{Notice, ResponseRecord, SessionSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    User,
    Reply,
    Error,
    Pending,
    Notice,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentLine {
    pub kind: LineKind,
    pub text: String,
}

impl ContentLine {
    fn new(kind: LineKind, text: String) -> Self {
        Self { kind, text }
    }
}

fn stamp(at: DateTime<Local>) -> String {
    at.format("[%H:%M:%S]").to_string()
}

fn record_lines(record: &ResponseRecord, out: &mut Vec<ContentLine>) {
    let ts = stamp(record.received_at);
    if let Some(prompt) = &record.prompt {
        out.push(ContentLine::new(LineKind::User, format!("{ts} You: {prompt}")));
    }
    match &record.outcome {
        Ok(text) => out.push(ContentLine::new(LineKind::Reply, format!("{ts} {text}"))),
        Err(e) => out.push(ContentLine::new(LineKind::Error, format!("{ts} ! {e}"))),
    }
}

/// Latest busy notice, if it is still fresh at `now`
pub fn active_notice(snapshot: &SessionSnapshot, now: DateTime<Local>) -> Option<&Notice> {
    let notice = snapshot.notices.last()?;
    let age = now.signed_duration_since(notice.at).to_std().unwrap_or_default();
    (age < NOTICE_DURATION).then_some(notice)
}

/// Lines to paint, oldest first: the newest `visible_messages` records, then
/// the pending request, then a fresh busy notice
pub fn content_lines(snapshot: &SessionSnapshot, now: DateTime<Local>) -> Vec<ContentLine> {
    let mut lines = Vec::new();
    let keep = snapshot.overlay.style.visible_messages;
    let skip = snapshot.history.len().saturating_sub(keep);
    for record in snapshot.history.iter().skip(skip) {
        record_lines(record, &mut lines);
    }

    if let Some(pending) = &snapshot.pending {
        let ts = stamp(pending.issued_at);
        if let Some(prompt) = &pending.prompt {
            lines.push(ContentLine::new(LineKind::User, format!("{ts} You: {prompt}")));
        }
        lines.push(ContentLine::new(LineKind::Pending, format!("{ts} {PENDING_LINE}")));
    }

    if let Some(notice) = active_notice(snapshot, now) {
        lines.push(ContentLine::new(
            LineKind::Notice,
            format!(
                "{} Busy: {} ignored, request {} still running",
                stamp(notice.at),
                notice.trigger.describe(),
                notice.blocked_by
            ),
        ));
    }
    lines
}

/// Greedy word wrap to `max_width` as reported by `measure`; words wider than
/// a line are split by character
pub fn wrap(text: &str, max_width: usize, measure: impl Fn(&str) -> usize) -> Vec<String> {
    let mut rows = Vec::new();
    for paragraph in text.split('\n') {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{current} {word}")
            };
            if measure(&candidate) <= max_width {
                current = candidate;
                continue;
            }
            if !current.is_empty() {
                rows.push(std::mem::take(&mut current));
            }
            if measure(word) <= max_width {
                current = word.to_string();
                continue;
            }
            for ch in word.chars() {
                current.push(ch);
                if measure(&current) > max_width && current.chars().count() > 1 {
                    current.pop();
                    rows.push(std::mem::take(&mut current));
                    current.push(ch);
                }
            }
        }
        rows.push(current);
    }
    rows
}

/// Wrap every line and keep the newest rows that fit in `max_rows`
pub fn fit(
    lines: &[ContentLine],
    max_width: usize,
    max_rows: usize,
    measure: impl Fn(&str) -> usize,
) -> Vec<(LineKind, String)> {
    let rows: Vec<(LineKind, String)> = lines
        .iter()
        .flat_map(|line| {
            wrap(&line.text, max_width, &measure)
                .into_iter()
                .map(move |row| (line.kind, row))
        })
        .collect();
    let skip = rows.len().saturating_sub(max_rows);
    rows.into_iter().skip(skip).collect()
}
