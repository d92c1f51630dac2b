//! Sentinel Core
//!
//! This crate implements a human-detection alarm pipeline for a single camera.
//!
//! # Architecture
//!
//! Detection runs as one loop over a handful of cooperating parts:
//!
//! 1. **Single-slot capture**: the camera thread overwrites one shared slot,
//!    so the loop always sees the freshest frame and never works a backlog.
//! 2. **Person gating**: raw model output is reduced to "is a person
//!    present", filtered by class and confidence threshold.
//! 3. **Cooldown**: at most one alert per cooldown window, checked when a
//!    person is seen.
//! 4. **Idempotent alarm**: playback runs on its own thread; re-triggering
//!    while audible is a no-op, and playback failures degrade to console
//!    ticks.
//! 5. **Absorbed delivery**: snapshot uploads and webhook calls run on a
//!    bounded worker pool; their failures are logged and never reach the
//!    detection loop.
//!
//! # Module Structure
//!
//! - `config`: file and environment configuration
//! - `frame`: frames and the single-slot capture buffer
//! - `camera`: capture backends (V4L2, synthetic) and the capture thread
//! - `detect`: model backends and the person detector
//! - `gate`: the alert cooldown window
//! - `alarm`: alarm playback control
//! - `notify`: alert payloads, delivery channels, the upload chain, and
//!   artifact cleanup
//! - `snapshot`: JPEG artifacts for alerts
//! - `stats`: session counters and the periodic health line
//! - `pipeline`: the orchestrating detect / gate / dispatch loop

pub mod alarm;
pub mod camera;
pub mod config;
pub mod detect;
pub mod frame;
pub mod gate;
pub mod notify;
pub mod pipeline;
pub mod snapshot;
pub mod stats;

pub use alarm::{AlarmController, AudioBackend, ConsoleAudio};
pub use camera::{
    list_cameras, CameraConfig, CameraError, CameraInfo, CameraSource, CaptureStats,
};
pub use config::SentinelConfig;
#[cfg(feature = "backend-tract")]
pub use detect::TractBackend;
pub use detect::{
    annotate, backend_for, BoundingBox, Detection, DetectionEvent, ModelBackend, ModelOutput,
    PersonDetector, ScriptedBackend, PERSON_CLASS_ID,
};
pub use frame::{Frame, FrameSlot};
pub use gate::AlertGate;
pub use notify::{
    alert_message, email_subject, AlertChannel, AlertPayload, ArtifactCleaner, CleanerHandle,
    DeliveryReport, DispatchStats, Dispatcher, ImageHost, UploadChain,
};
pub use pipeline::{CycleOutcome, DetectionPipeline};
pub use snapshot::save_snapshot;
pub use stats::{SessionStats, ThroughputMeter};
