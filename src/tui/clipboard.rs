use crate::notify::Notifications;
use anyhow::Result;
use std::sync::mpsc as std_mpsc;
use std::sync::OnceLock;
use std::time::Duration;

type Reply = std_mpsc::Sender<Result<(), String>>;

static CLIPBOARD_SENDER: OnceLock<std_mpsc::Sender<(String, Reply)>> = OnceLock::new();

/// Long enough for Linux clipboard managers to take ownership of the contents.
const HOLD: Duration = Duration::from_secs(2);

/// Lazily start the thread that owns clipboard handles.
fn clipboard_worker() -> &'static std_mpsc::Sender<(String, Reply)> {
    CLIPBOARD_SENDER.get_or_init(|| {
        let (tx, rx) = std_mpsc::channel::<(String, Reply)>();
        std::thread::spawn(move || {
            for (text, reply) in rx {
                let written = arboard::Clipboard::new().and_then(|mut clipboard| {
                    clipboard.set_text(text)?;
                    Ok(clipboard)
                });
                match written {
                    Ok(clipboard) => {
                        let _ = reply.send(Ok(()));
                        std::thread::sleep(HOLD);
                        drop(clipboard);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "clipboard write failed");
                        let _ = reply.send(Err(e.to_string()));
                    }
                }
            }
        });
        tx
    })
}

/// A queued copy whose outcome the worker has not reported yet.
pub struct PendingCopy(std_mpsc::Receiver<Result<(), String>>);

impl PendingCopy {
    /// `None` while the worker is still writing.
    pub fn poll(&self) -> Option<Result<(), String>> {
        match self.0.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(std_mpsc::TryRecvError::Empty) => None,
            Err(std_mpsc::TryRecvError::Disconnected) => {
                Some(Err("clipboard worker stopped".into()))
            }
        }
    }
}

/// Queue `text` for the clipboard without blocking the UI thread.
pub fn copy_to_clipboard(text: &str) -> Result<PendingCopy> {
    let (reply, outcome) = std_mpsc::channel();
    clipboard_worker()
        .send((text.to_string(), reply))
        .map_err(|_| anyhow::anyhow!("Clipboard manager channel closed"))?;
    Ok(PendingCopy(outcome))
}

pub fn report(notes: &mut Notifications, outcome: Result<(), String>) {
    match outcome {
        Ok(()) => {
            notes.success("Text copied to clipboard");
        }
        Err(e) => {
            notes.error(&format!("Copy failed: {e}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NoticeKind;

    #[test]
    fn success_is_only_reported_once_written() {
        let (reply, rx) = std_mpsc::channel();
        let pending = PendingCopy(rx);
        assert_eq!(pending.poll(), None);

        reply.send(Err("no display".into())).unwrap();
        let mut notes = Notifications::default();
        report(&mut notes, pending.poll().unwrap());
        let toast = notes.active().last().unwrap();
        assert_eq!(toast.kind, NoticeKind::Error);
        assert_eq!(toast.message, "Copy failed: no display");
    }

    #[test]
    fn vanished_worker_is_a_failure() {
        let (reply, rx) = std_mpsc::channel::<Result<(), String>>();
        drop(reply);
        assert!(matches!(PendingCopy(rx).poll(), Some(Err(_))));
    }
}
