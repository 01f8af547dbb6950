//! Transient success/error notifications.
//!
//! Toasts stack without coalescing and expire after [`TOAST_TTL`]. Message
//! text is escaped on the way in so nothing downstream renders raw input.

use std::fmt::Write as _;
use std::time::{Duration, Instant};

pub const TOAST_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub id: u64,
    pub kind: NoticeKind,
    pub message: String,
    pub raised_at: Instant,
}

impl Toast {
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.raised_at) >= TOAST_TTL
    }
}

#[derive(Debug, Default)]
pub struct Notifications {
    toasts: Vec<Toast>,
    next_id: u64,
}

impl Notifications {
    pub fn notify(&mut self, message: &str, kind: NoticeKind) -> u64 {
        self.notify_at(message, kind, Instant::now())
    }

    pub fn notify_at(&mut self, message: &str, kind: NoticeKind, now: Instant) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        // Surfaces print toasts themselves; the log copy is for debugging only.
        tracing::debug!(id, ?kind, "notify: {message}");
        self.toasts.push(Toast {
            id,
            kind,
            message: escape_for_display(message),
            raised_at: now,
        });
        id
    }

    pub fn success(&mut self, message: &str) -> u64 {
        self.notify(message, NoticeKind::Success)
    }

    pub fn error(&mut self, message: &str) -> u64 {
        self.notify(message, NoticeKind::Error)
    }

    /// Explicit user dismissal. Returns false if the toast already expired.
    pub fn dismiss(&mut self, id: u64) -> bool {
        let before = self.toasts.len();
        self.toasts.retain(|t| t.id != id);
        self.toasts.len() != before
    }

    pub fn dismiss_latest(&mut self) -> bool {
        self.toasts.pop().is_some()
    }

    /// Drop every toast whose display window has elapsed.
    pub fn prune(&mut self, now: Instant) -> usize {
        let before = self.toasts.len();
        self.toasts.retain(|t| !t.is_expired(now));
        before - self.toasts.len()
    }

    pub fn active(&self) -> &[Toast] {
        &self.toasts
    }

    /// Hand over all pending toasts, for surfaces that print rather than overlay.
    pub fn take_all(&mut self) -> Vec<Toast> {
        std::mem::take(&mut self.toasts)
    }
}

/// Neutralise control characters so untrusted text cannot drive the terminal.
///
/// Newlines and tabs survive; everything else in C0/C1 (ESC, CR, BEL, ...) and
/// DEL is rendered as a visible `\u{..}` escape.
pub fn escape_for_display(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '\n' || c == '\t' || !c.is_control() {
            out.push(c);
        } else {
            let _ = write!(out, "\\u{{{:x}}}", c as u32);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn toasts_stack_and_expire_independently() {
        let mut n = Notifications::default();
        let t0 = Instant::now();
        n.notify_at("first", NoticeKind::Success, t0);
        n.notify_at("first", NoticeKind::Success, t0 + Duration::from_secs(3));
        assert_eq!(n.active().len(), 2);

        assert_eq!(n.prune(t0 + Duration::from_millis(4999)), 0);
        assert_eq!(n.prune(t0 + Duration::from_secs(5)), 1);
        assert_eq!(n.active().len(), 1);
        assert_eq!(n.prune(t0 + Duration::from_secs(8)), 1);
        assert!(n.active().is_empty());
    }

    #[test]
    fn early_dismissal() {
        let mut n = Notifications::default();
        let a = n.error("a");
        let b = n.success("b");
        assert!(n.dismiss(a));
        assert!(!n.dismiss(a));
        assert_eq!(n.active()[0].id, b);
        assert!(n.dismiss_latest());
        assert!(!n.dismiss_latest());
    }

    #[test]
    fn messages_are_escaped() {
        let mut n = Notifications::default();
        n.error("\u{1b}[31mred\u{7}\r\nok\tdone");
        assert_eq!(n.active()[0].message, "\\u{1b}[31mred\\u{7}\\u{d}\nok\tdone");
        assert_eq!(escape_for_display("<b>plain</b>"), "<b>plain</b>");
    }

    #[test]
    fn take_all_empties_the_stack() {
        let mut n = Notifications::default();
        n.success("x");
        n.error("y");
        let taken = n.take_all();
        assert_eq!(taken.len(), 2);
        assert_eq!(taken[1].kind, NoticeKind::Error);
        assert!(n.active().is_empty());
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn toasts_stay_out_of_default_log() {
        let sink = Captured::default();
        let writer = sink.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new(crate::logging::DEFAULT_FILTER))
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            let mut n = Notifications::default();
            n.error("bad image");
            n.success("Session cleared");
        });
        assert!(sink.0.lock().unwrap().is_empty());
    }
}
