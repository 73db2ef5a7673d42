//! services/api/src/notifications.rs
//!
//! The outbound notification pipeline: a channel-backed sink the engine hands
//! messages to, and a worker task that renders and delivers them. Delivery
//! failures are logged and go no further; by the time a message reaches this
//! module, the operation that produced it has already committed and responded.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use library_core::domain::Notification;
use library_core::ports::{NotificationSender, NotificationSink};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

//=========================================================================================
// The Engine-Facing Sink
//=========================================================================================

/// A `NotificationSink` backed by an unbounded channel. Submitting never
/// blocks; if the worker is gone the message is dropped with a warning, which
/// is the same degrade-to-logging policy a failed delivery gets.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelSink {
    /// Creates the sink and the receiving end the worker will drain.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn submit(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            warn!("notification worker is gone; dropping outbound email");
        }
    }
}

//=========================================================================================
// Rendering
//=========================================================================================

fn long_date(date: DateTime<Utc>) -> String {
    // "July 15, 2024", matching what readers see on the due-date banner.
    date.format("%B %-d, %Y").to_string()
}

fn author_line(author: &Option<String>) -> &str {
    author.as_deref().unwrap_or("Unknown Author")
}

/// Renders a notification to `(recipient, subject, html_body)`.
pub fn render(notification: &Notification) -> (String, String, String) {
    match notification {
        Notification::CheckedOut {
            to,
            title,
            author,
            due_date,
        } => (
            to.clone(),
            format!("Book Checked Out: {title}"),
            format!(
                "<p>Hi there,</p>\
                 <p>You have successfully checked out the book: <strong>{title}</strong> by <strong>{}</strong>.</p>\
                 <p>Your return date is <strong>{}</strong>.</p>\
                 <p>Enjoy your reading!</p>\
                 <p>Best regards,<br>The Virtual Library Team</p>",
                author_line(author),
                long_date(*due_date),
            ),
        ),
        Notification::CheckedIn { to, title, author } => (
            to.clone(),
            format!("Book Checked In: {title}"),
            format!(
                "<p>Hi there,</p>\
                 <p>You have successfully checked in the book: <strong>{title}</strong> by {}.</p>\
                 <p>Thank you for using our library!</p>\
                 <p>Best regards,<br>The Virtual Library Team</p>",
                author_line(author),
            ),
        ),
        Notification::Purchased { to, title, author } => (
            to.clone(),
            format!("Book Purchased: {title}"),
            format!(
                "<p>Hi there,</p>\
                 <p>Thank you for your purchase! You have successfully bought: <strong>{title}</strong> by {}.</p>\
                 <p>Enjoy your new book!</p>\
                 <p>Best regards,<br>The Virtual Library Team</p>",
                author_line(author),
            ),
        ),
        Notification::DueSoon {
            to,
            title,
            author,
            return_date,
        } => (
            to.clone(),
            format!("Reminder: Book Due Soon - {title}"),
            format!(
                "<p>Hi there,</p>\
                 <p>This is a friendly reminder that the book <strong>{title}</strong> by {} is due on <strong>{}</strong>.</p>\
                 <p>Please return it on time to avoid any late fees.</p>\
                 <p>Best regards,<br>The Virtual Library Team</p>",
                author_line(author),
                long_date(*return_date),
            ),
        ),
    }
}

//=========================================================================================
// The Worker
//=========================================================================================

/// Spawns the task that drains the channel and delivers email best-effort.
pub fn spawn_notification_worker(
    mut rx: mpsc::UnboundedReceiver<Notification>,
    sender: Arc<dyn NotificationSender>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(notification) = rx.recv().await {
            let (to, subject, html) = render(&notification);
            if let Err(e) = sender.send(&to, &subject, &html).await {
                warn!("failed to send \"{subject}\" to {to}: {e}");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use library_core::ports::{PortError, PortResult};
    use std::sync::Mutex;

    #[test]
    fn checked_out_rendering_names_the_due_date() {
        let due = Utc.with_ymd_and_hms(2024, 7, 15, 2, 0, 0).unwrap();
        let (to, subject, html) = render(&Notification::CheckedOut {
            to: "paul@example.com".into(),
            title: "Dune".into(),
            author: Some("F. Herbert".into()),
            due_date: due,
        });
        assert_eq!(to, "paul@example.com");
        assert_eq!(subject, "Book Checked Out: Dune");
        assert!(html.contains("<strong>Dune</strong>"));
        assert!(html.contains("F. Herbert"));
        assert!(html.contains("July 15, 2024"));
    }

    #[test]
    fn missing_authors_fall_back_rather_than_render_blank() {
        let (_, _, html) = render(&Notification::CheckedIn {
            to: "a@b.c".into(),
            title: "Anonymous Classic".into(),
            author: None,
        });
        assert!(html.contains("Unknown Author"));
    }

    #[test]
    fn due_soon_rendering_carries_the_reminder_subject() {
        let due = Utc.with_ymd_and_hms(2024, 3, 2, 2, 0, 0).unwrap();
        let (_, subject, html) = render(&Notification::DueSoon {
            to: "a@b.c".into(),
            title: "Hyperion".into(),
            author: Some("D. Simmons".into()),
            return_date: due,
        });
        assert_eq!(subject, "Reminder: Book Due Soon - Hyperion");
        assert!(html.contains("March 2, 2024"));
    }

    struct FlakySender {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NotificationSender for FlakySender {
        async fn send(&self, to: &str, _subject: &str, _html_body: &str) -> PortResult<()> {
            self.calls.lock().unwrap().push(to.to_string());
            Err(PortError::Unexpected("smtp down".into()))
        }
    }

    #[tokio::test]
    async fn worker_swallows_delivery_failures() {
        let (sink, rx) = ChannelSink::new();
        let sender = Arc::new(FlakySender {
            calls: Mutex::new(Vec::new()),
        });
        let handle = spawn_notification_worker(rx, sender.clone());

        sink.submit(Notification::CheckedIn {
            to: "paul@example.com".into(),
            title: "Dune".into(),
            author: None,
        });
        drop(sink);

        // The worker exits once the channel closes, having attempted (and
        // logged) the failing delivery without panicking.
        handle.await.unwrap();
        assert_eq!(sender.calls.lock().unwrap().as_slice(), ["paul@example.com"]);
    }

    #[test]
    fn submitting_after_the_worker_died_is_harmless() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.submit(Notification::CheckedIn {
            to: "a@b.c".into(),
            title: "T".into(),
            author: None,
        });
    }
}
