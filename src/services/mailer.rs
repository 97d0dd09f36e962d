//! Outgoing email over SMTP.
//!
//! [`Mailer`] wraps the `lettre` async SMTP transport. Without a configured
//! server, or with `MAIL_SUPPRESS_SEND` set, messages are logged and
//! skipped so callers can report `email_sent = false`.

use anyhow::{Context, Result};
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::MailSettings;

#[derive(Clone)]
pub struct Mailer {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    sender: String,
}

impl Mailer {
    pub fn new(settings: &MailSettings) -> Result<Self> {
        let transport = match (&settings.server, settings.suppress_send) {
            (Some(server), false) => {
                let mut builder = if settings.use_tls {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(server)
                        .context("Invalid MAIL_SERVER")?
                } else {
                    AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(server)
                }
                .port(settings.port);

                if let (Some(user), Some(pass)) = (&settings.username, &settings.password) {
                    builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
                }

                tracing::info!(server = %server, port = settings.port, "SMTP mailer configured");
                Some(builder.build())
            }
            _ => {
                tracing::info!("Mail delivery disabled, messages will be logged only");
                None
            }
        };

        Ok(Self {
            transport,
            sender: settings.default_sender.clone(),
        })
    }

    /// Mailer that never talks to a server.
    #[cfg(test)]
    pub fn disabled(sender: &str) -> Self {
        Self {
            transport: None,
            sender: sender.to_string(),
        }
    }

    #[cfg(test)]
    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    /// Sends a plain-text message. `Ok(false)` means delivery is disabled.
    pub async fn send(&self, to: &str, subject: &str, body: String) -> Result<bool> {
        let Some(transport) = &self.transport else {
            tracing::info!(to = to, subject = subject, "Mail suppressed");
            return Ok(false);
        };

        let email = Message::builder()
            .from(self.sender.parse().context("Invalid sender address")?)
            .to(to.parse().context("Invalid recipient address")?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .context("Failed to build email")?;

        transport.send(email).await.context("SMTP send failed")?;

        tracing::info!(to = to, subject = subject, "Email sent");
        Ok(true)
    }

    /// Like [`Mailer::send`], but a failure is logged and reported as `false`.
    pub async fn send_best_effort(&self, to: &str, subject: &str, body: String) -> bool {
        match self.send(to, subject, body).await {
            Ok(sent) => sent,
            Err(e) => {
                tracing::error!(to = to, error = %e, "Failed to send email");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(server: Option<&str>, suppress: bool) -> MailSettings {
        MailSettings {
            server: server.map(str::to_string),
            port: 587,
            use_tls: true,
            username: None,
            password: None,
            default_sender: "noreply@example.com".to_string(),
            suppress_send: suppress,
        }
    }

    #[test]
    fn disabled_without_server_or_when_suppressed() {
        assert!(!Mailer::new(&settings(None, false)).unwrap().is_enabled());
        assert!(!Mailer::new(&settings(Some("smtp.example.com"), true))
            .unwrap()
            .is_enabled());
    }

    #[tokio::test]
    async fn suppressed_send_reports_not_sent() {
        let mailer = Mailer::disabled("noreply@example.com");
        let sent = mailer
            .send("someone@example.com", "Hello", "Body".to_string())
            .await
            .unwrap();
        assert!(!sent);
    }
}
