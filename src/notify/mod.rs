//! Alert fan-out.
//!
//! One granted alert becomes one `AlertPayload`, queued on the [`Dispatcher`]
//! and delivered by a small worker pool to every configured channel. Channel
//! and recipient failures are logged and absorbed here; nothing in this
//! module propagates delivery errors back into the detection loop.

mod chat;
mod cleanup;
mod dispatcher;
mod email;
mod multipart;
mod upload;

pub use chat::{ChatChannel, MessageTransport, WebhookMessenger};
pub use cleanup::{ArtifactCleaner, CleanerHandle};
pub use dispatcher::{DispatchStats, Dispatcher};
pub use email::{EmailChannel, MailTransport, WebhookMailer};
pub use upload::{CloudinaryHost, ImageHost, ImgbbHost, UploadChain};

use crate::detect::DetectionEvent;
use chrono::{DateTime, Local};
use std::path::PathBuf;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Everything a worker needs to deliver one alert.
#[derive(Debug, Clone)]
pub struct AlertPayload {
    /// Pre-rendered alert text, shared by every channel.
    pub message: String,
    /// Snapshot written for this alert, if the pipeline managed to save one.
    pub snapshot: Option<PathBuf>,
    pub created_at: DateTime<Local>,
}

impl AlertPayload {
    pub fn new(message: String, snapshot: Option<PathBuf>) -> Self {
        Self {
            message,
            snapshot,
            created_at: Local::now(),
        }
    }
}

/// Per-channel delivery tally. Failures are already logged by the channel;
/// the dispatcher only aggregates counts.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

/// A delivery channel. `deliver` must not panic and must not return an
/// error; recipient failures are recorded in the report instead.
pub trait AlertChannel: Send + Sync {
    fn name(&self) -> &'static str;

    /// `image_url` is the hosted snapshot URL when an upload provider
    /// accepted the image; channels that attach files directly ignore it.
    fn deliver(&self, payload: &AlertPayload, image_url: Option<&str>) -> DeliveryReport;
}

/// Render the alert text for a detection event.
pub fn alert_message(event: &DetectionEvent, location: &str, at: DateTime<Local>) -> String {
    let timestamp = at.format(TIMESTAMP_FORMAT);
    let count = event.person_count();
    if count <= 1 {
        format!(
            "SECURITY ALERT\n\n\
             Human detected at {}\n\
             Confidence: {:.2}\n\
             Location: {}\n\n\
             Please check the premises immediately.",
            timestamp,
            event.max_confidence(),
            location
        )
    } else {
        let scores = event
            .confidences()
            .iter()
            .map(|confidence| format!("{:.2}", confidence))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "SECURITY ALERT\n\n\
             {} humans detected at {}\n\
             Confidence scores: {}\n\
             Location: {}\n\n\
             Multiple people detected. Please check the premises immediately.",
            count, timestamp, scores, location
        )
    }
}

/// Subject line for mail-style channels.
pub fn email_subject(at: DateTime<Local>) -> String {
    format!(
        "Security Alert - Human Detection - {}",
        at.format(TIMESTAMP_FORMAT)
    )
}
