//! services/api/src/adapters/mailer.rs
//!
//! This module contains the SMTP adapter, the concrete implementation of the
//! `NotificationSender` port. Only the notification worker calls it; the
//! availability engine never waits on email.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use library_core::ports::{NotificationSender, PortError, PortResult};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `NotificationSender` over SMTP.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Creates a new `SmtpMailer` speaking TLS to the given relay.
    pub fn new(
        host: &str,
        username: String,
        password: String,
        from: Mailbox,
    ) -> Result<Self, lettre::transport::smtp::Error> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(host)?
            .credentials(Credentials::new(username, password))
            .build();
        Ok(Self { transport, from })
    }
}

#[async_trait]
impl NotificationSender for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> PortResult<()> {
        let recipient: Mailbox = to
            .parse()
            .map_err(|e| PortError::Unexpected(format!("invalid recipient address {to}: {e}")))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(recipient)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body.to_string())
            .map_err(|e| PortError::Unexpected(format!("failed to build email: {e}")))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| PortError::Unexpected(format!("smtp delivery failed: {e}")))?;
        Ok(())
    }
}

//=========================================================================================
// Disabled Delivery
//=========================================================================================

/// Stands in when SMTP is not configured. Every send fails, which the worker
/// turns into a logged warning; nothing upstream ever notices.
pub struct DisabledMailer;

#[async_trait]
impl NotificationSender for DisabledMailer {
    async fn send(&self, to: &str, _subject: &str, _html_body: &str) -> PortResult<()> {
        Err(PortError::Unexpected(format!(
            "email delivery is not configured; dropping message to {to}"
        )))
    }
}
