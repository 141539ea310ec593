use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::{Notification, Notifier, NotifyError};
use crate::config::EmailConfig;

/// Sends notifications as plain-text email over SMTP.
pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailNotifier {
    pub fn new(cfg: &EmailConfig) -> Result<Self, NotifyError> {
        let creds = Credentials::new(cfg.smtp_user.clone(), cfg.smtp_pass.clone());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.smtp_host)
            .map_err(|e| NotifyError::Build(format!("invalid smtp host: {e}")))?
            .credentials(creds)
            .build();

        let from = cfg
            .from
            .parse()
            .map_err(|e| NotifyError::Build(format!("invalid from address: {e}")))?;
        let to = cfg
            .to
            .parse()
            .map_err(|e| NotifyError::Build(format!("invalid to address: {e}")))?;

        Ok(Self { mailer, from, to })
    }
}

pub(crate) fn build_message(from: Mailbox, to: Mailbox, notification: &Notification) -> Result<Message, NotifyError> {
    Message::builder()
        .from(from)
        .to(to)
        .subject(notification.subject.clone())
        .header(header::ContentType::TEXT_PLAIN)
        .body(notification.body.clone())
        .map_err(|e| NotifyError::Build(e.to_string()))
}

#[async_trait::async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let msg = build_message(self.from.clone(), self.to.clone(), notification)?;

        self.mailer
            .send(msg)
            .await
            .map_err(|e| NotifyError::Send(e.to_string()))?;

        tracing::info!(subject = %notification.subject, "notification email sent");
        metrics::counter!("notifications_sent_total").increment(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotificationKind;

    #[test]
    fn message_carries_subject_and_plain_text_body() {
        let n = Notification {
            kind: NotificationKind::CheaperTariffExists,
            subject: "Octopus Tariff Switcher: Cheaper Tariff Found".into(),
            body: "Tariff  Cost\n".into(),
        };

        let msg = build_message(
            "switcher@example.com".parse().unwrap(),
            "me@example.com".parse().unwrap(),
            &n,
        )
        .unwrap();

        let raw = String::from_utf8(msg.formatted()).unwrap();
        assert!(raw.contains("Subject: Octopus Tariff Switcher: Cheaper Tariff Found"));
        assert!(raw.contains("Content-Type: text/plain"));
        assert!(raw.contains("To: me@example.com"));
    }
}
