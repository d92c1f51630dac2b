//! Mail-style delivery: subject, body, and the snapshot attached directly.

use anyhow::{Context, Result};
use std::path::Path;

use super::multipart::MultipartForm;
use super::{email_subject, AlertChannel, AlertPayload, DeliveryReport};
use crate::config::ChannelSettings;

/// Transport for one mail message with an optional file attachment.
pub trait MailTransport: Send + Sync {
    fn send(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
        attachment: Option<&Path>,
    ) -> Result<()>;
}

/// Reference transport: POSTs a multipart form to a mail relay webhook.
/// The relay owns SMTP; this side only hands over the pieces.
pub struct WebhookMailer {
    agent: ureq::Agent,
    url: String,
    token: Option<String>,
}

impl WebhookMailer {
    pub fn new(agent: ureq::Agent, url: String, token: Option<String>) -> Self {
        Self { agent, url, token }
    }
}

impl MailTransport for WebhookMailer {
    fn send(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
        attachment: Option<&Path>,
    ) -> Result<()> {
        let mut form = MultipartForm::new();
        form.text("to", recipient);
        form.text("subject", subject);
        form.text("body", body);
        if let Some(path) = attachment {
            let bytes = std::fs::read(path)
                .with_context(|| format!("read attachment {}", path.display()))?;
            let file_name = path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("snapshot.jpg");
            form.file("attachment", file_name, "image/jpeg", &bytes);
        }
        let (content_type, payload) = form.finish();

        let mut request = self.agent.post(&self.url).set("Content-Type", &content_type);
        if let Some(token) = &self.token {
            request = request.set("Authorization", &format!("Bearer {}", token));
        }
        request
            .send_bytes(&payload)
            .with_context(|| format!("mail webhook delivery to {}", recipient))?;
        Ok(())
    }
}

/// Fan-out of one alert to every mail recipient, with the same
/// per-recipient isolation as the chat channel.
pub struct EmailChannel {
    transport: Box<dyn MailTransport>,
    recipients: Vec<String>,
}

impl EmailChannel {
    pub fn new(transport: Box<dyn MailTransport>, recipients: Vec<String>) -> Self {
        Self {
            transport,
            recipients,
        }
    }

    pub fn from_config(settings: &ChannelSettings, agent: ureq::Agent) -> Option<Self> {
        if !settings.is_active() {
            return None;
        }
        let url = settings.webhook_url.clone()?;
        Some(Self::new(
            Box::new(WebhookMailer::new(agent, url, settings.token.clone())),
            settings.recipients.clone(),
        ))
    }
}

impl AlertChannel for EmailChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    fn deliver(&self, payload: &AlertPayload, _image_url: Option<&str>) -> DeliveryReport {
        let subject = email_subject(payload.created_at);
        let attachment = payload.snapshot.as_deref();

        let mut report = DeliveryReport::default();
        for recipient in &self.recipients {
            match self
                .transport
                .send(recipient, &subject, &payload.message, attachment)
            {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    log::warn!("email delivery to {} failed: {:#}", recipient, e);
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    type MailLog = Arc<Mutex<Vec<(String, String, Option<PathBuf>)>>>;

    struct RecordingMailer {
        sent: MailLog,
        fail_for: Option<&'static str>,
    }

    impl MailTransport for RecordingMailer {
        fn send(
            &self,
            recipient: &str,
            subject: &str,
            _body: &str,
            attachment: Option<&Path>,
        ) -> Result<()> {
            if self.fail_for == Some(recipient) {
                return Err(anyhow!("relay refused message"));
            }
            self.sent.lock().unwrap().push((
                recipient.to_string(),
                subject.to_string(),
                attachment.map(|path| path.to_path_buf()),
            ));
            Ok(())
        }
    }

    fn channel_with(fail_for: Option<&'static str>, names: &[&str]) -> (EmailChannel, MailLog) {
        let sent: MailLog = Arc::default();
        let channel = EmailChannel::new(
            Box::new(RecordingMailer {
                sent: Arc::clone(&sent),
                fail_for,
            }),
            names.iter().map(|name| name.to_string()).collect(),
        );
        (channel, sent)
    }

    #[test]
    fn attaches_snapshot_path() {
        let (channel, sent) = channel_with(None, &["a@example.com"]);
        let payload = AlertPayload::new(
            "intruder".to_string(),
            Some(PathBuf::from("detections/shot.jpg")),
        );

        channel.deliver(&payload, None);
        let sent = sent.lock().unwrap();
        assert_eq!(
            sent[0].2.as_deref(),
            Some(Path::new("detections/shot.jpg"))
        );
        assert!(sent[0].1.starts_with("Security Alert - Human Detection - "));
    }

    #[test]
    fn failed_recipient_is_isolated() {
        let (channel, sent) = channel_with(Some("b@example.com"), &[
            "a@example.com",
            "b@example.com",
            "c@example.com",
        ]);
        let payload = AlertPayload::new("intruder".to_string(), None);

        let report = channel.deliver(&payload, None);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(sent.lock().unwrap().len(), 2);
    }

    #[test]
    fn hosted_url_is_ignored() {
        let (channel, sent) = channel_with(None, &["a@example.com"]);
        let payload = AlertPayload::new("intruder".to_string(), None);

        channel.deliver(&payload, Some("https://img.example/a.jpg"));
        assert_eq!(sent.lock().unwrap()[0].2, None);
    }
}
