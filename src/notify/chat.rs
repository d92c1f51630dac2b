//! Chat-style delivery: short text messages with an optional hosted image.

use anyhow::{Context, Result};

use super::{AlertChannel, AlertPayload, DeliveryReport};
use crate::config::ChannelSettings;

/// Transport for one chat message. Implementations decide how the image URL
/// is embedded (media attachment, trailing link, and so on).
pub trait MessageTransport: Send + Sync {
    fn send(&self, recipient: &str, text: &str, image_url: Option<&str>) -> Result<()>;
}

/// Reference transport: POSTs a JSON body to a relay webhook.
pub struct WebhookMessenger {
    agent: ureq::Agent,
    url: String,
    token: Option<String>,
}

impl WebhookMessenger {
    pub fn new(agent: ureq::Agent, url: String, token: Option<String>) -> Self {
        Self { agent, url, token }
    }
}

impl MessageTransport for WebhookMessenger {
    fn send(&self, recipient: &str, text: &str, image_url: Option<&str>) -> Result<()> {
        let mut body = serde_json::json!({
            "to": recipient,
            "body": text,
        });
        if let Some(url) = image_url {
            body["media_url"] = serde_json::Value::String(url.to_string());
        }

        let mut request = self.agent.post(&self.url);
        if let Some(token) = &self.token {
            request = request.set("Authorization", &format!("Bearer {}", token));
        }
        request
            .send_json(body)
            .with_context(|| format!("chat webhook delivery to {}", recipient))?;
        Ok(())
    }
}

/// Fan-out of one alert to every chat recipient. A failed recipient is
/// logged and skipped; the rest still get the message.
pub struct ChatChannel {
    transport: Box<dyn MessageTransport>,
    recipients: Vec<String>,
}

impl ChatChannel {
    pub fn new(transport: Box<dyn MessageTransport>, recipients: Vec<String>) -> Self {
        Self {
            transport,
            recipients,
        }
    }

    /// Builds the webhook-backed channel, or `None` when the channel has no
    /// endpoint or no recipients.
    pub fn from_config(settings: &ChannelSettings, agent: ureq::Agent) -> Option<Self> {
        if !settings.is_active() {
            return None;
        }
        let url = settings.webhook_url.clone()?;
        Some(Self::new(
            Box::new(WebhookMessenger::new(agent, url, settings.token.clone())),
            settings.recipients.clone(),
        ))
    }
}

impl AlertChannel for ChatChannel {
    fn name(&self) -> &'static str {
        "chat"
    }

    fn deliver(&self, payload: &AlertPayload, image_url: Option<&str>) -> DeliveryReport {
        // A snapshot that exists but could not be hosted still gets
        // mentioned, so the recipient knows an image was taken.
        let text = if payload.snapshot.is_some() && image_url.is_none() {
            format!("{}\n\n(image could not be attached)", payload.message)
        } else {
            payload.message.clone()
        };

        let mut report = DeliveryReport::default();
        for recipient in &self.recipients {
            match self.transport.send(recipient, &text, image_url) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    log::warn!("chat delivery to {} failed: {:#}", recipient, e);
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

    type SentLog = Arc<Mutex<Vec<(String, String, Option<String>)>>>;

    struct RecordingTransport {
        sent: SentLog,
        fail_for: Option<&'static str>,
    }

    impl MessageTransport for RecordingTransport {
        fn send(&self, recipient: &str, text: &str, image_url: Option<&str>) -> Result<()> {
            if self.fail_for == Some(recipient) {
                return Err(anyhow!("unreachable recipient"));
            }
            self.sent.lock().unwrap().push((
                recipient.to_string(),
                text.to_string(),
                image_url.map(|url| url.to_string()),
            ));
            Ok(())
        }
    }

    fn channel_with(fail_for: Option<&'static str>, names: &[&str]) -> (ChatChannel, SentLog) {
        let sent: SentLog = Arc::default();
        let channel = ChatChannel::new(
            Box::new(RecordingTransport {
                sent: Arc::clone(&sent),
                fail_for,
            }),
            names.iter().map(|name| name.to_string()).collect(),
        );
        (channel, sent)
    }

    #[test]
    fn one_bad_recipient_does_not_stop_the_rest() {
        let (channel, sent) = channel_with(Some("+200"), &["+100", "+200", "+300"]);
        let payload = AlertPayload::new("intruder".to_string(), None);

        let report = channel.deliver(&payload, None);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 1);
        let sent = sent.lock().unwrap();
        assert_eq!(sent[0].0, "+100");
        assert_eq!(sent[1].0, "+300");
    }

    #[test]
    fn hosted_url_passes_through_unchanged() {
        let (channel, sent) = channel_with(None, &["+100"]);
        let payload = AlertPayload::new(
            "intruder".to_string(),
            Some(PathBuf::from("detections/a.jpg")),
        );

        channel.deliver(&payload, Some("https://img.example/a.jpg"));
        let sent = sent.lock().unwrap();
        assert_eq!(sent[0].1, "intruder");
        assert_eq!(sent[0].2.as_deref(), Some("https://img.example/a.jpg"));
    }

    #[test]
    fn failed_upload_appends_note() {
        let (channel, sent) = channel_with(None, &["+100"]);
        let payload = AlertPayload::new(
            "intruder".to_string(),
            Some(PathBuf::from("detections/a.jpg")),
        );

        channel.deliver(&payload, None);
        let sent = sent.lock().unwrap();
        assert_eq!(sent[0].1, "intruder\n\n(image could not be attached)");
        assert_eq!(sent[0].2, None);
    }

    #[test]
    fn no_snapshot_means_plain_message() {
        let (channel, sent) = channel_with(None, &["+100"]);
        let payload = AlertPayload::new("intruder".to_string(), None);

        let report = channel.deliver(&payload, None);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(sent.lock().unwrap()[0].1, "intruder");
    }
}
