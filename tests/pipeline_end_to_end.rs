use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;

use sentinel_core::alarm::AlarmController;
use sentinel_core::camera::{CameraConfig, CameraSource};
use sentinel_core::config::{
    AlarmSettings, ArtifactSettings, CameraSettings, ChannelSettings, DetectionConfig,
    SentinelConfig, UploadSettings,
};
use sentinel_core::detect::{PersonDetector, ScriptedBackend};
use sentinel_core::notify::{ArtifactCleaner, ChatChannel, Dispatcher, MessageTransport, UploadChain};
use sentinel_core::pipeline::{CycleOutcome, DetectionPipeline};

type SentLog = Arc<Mutex<Vec<(String, String, Option<String>)>>>;

struct RecordingTransport {
    sent: SentLog,
}

impl MessageTransport for RecordingTransport {
    fn send(&self, recipient: &str, text: &str, image_url: Option<&str>) -> Result<()> {
        self.sent.lock().unwrap().push((
            recipient.to_string(),
            text.to_string(),
            image_url.map(|url| url.to_string()),
        ));
        Ok(())
    }
}

fn recording_channel(recipients: &[&str]) -> (ChatChannel, SentLog) {
    let sent: SentLog = Arc::default();
    let channel = ChatChannel::new(
        Box::new(RecordingTransport {
            sent: Arc::clone(&sent),
        }),
        recipients.iter().map(|name| name.to_string()).collect(),
    );
    (channel, sent)
}

fn test_config(artifact_dir: PathBuf, cooldown: Duration) -> SentinelConfig {
    SentinelConfig {
        detection: DetectionConfig {
            confidence_threshold: 0.5,
            cooldown,
            backend: "scripted".to_string(),
            model_path: None,
        },
        camera: CameraSettings {
            device: "stub://camera".to_string(),
            width: 64,
            height: 48,
            target_fps: 30,
            location: "Test Bench".to_string(),
        },
        alarm: AlarmSettings {
            sound_file: PathBuf::from("alarm.wav"),
            duration: Duration::from_millis(50),
        },
        chat: ChannelSettings::default(),
        email: ChannelSettings::default(),
        upload: UploadSettings {
            providers: Vec::new(),
            timeout: Duration::from_secs(5),
        },
        artifacts: ArtifactSettings {
            dir: artifact_dir,
            cleanup_delay: Duration::ZERO,
        },
    }
}

fn pipeline_with(
    backend: ScriptedBackend,
    config: SentinelConfig,
    channel: ChatChannel,
) -> DetectionPipeline {
    let camera = CameraSource::new(CameraConfig {
        device: config.camera.device.clone(),
        width: config.camera.width,
        height: config.camera.height,
        target_fps: config.camera.target_fps,
    });
    let detector = PersonDetector::new(Box::new(backend), config.detection.confidence_threshold);
    let alarm =
        AlarmController::with_console(config.alarm.sound_file.clone(), config.alarm.duration);
    let cleaner = ArtifactCleaner::start(config.artifacts.cleanup_delay);
    let dispatcher = Dispatcher::new(
        vec![Box::new(channel)],
        UploadChain::new(Vec::new()),
        cleaner.handle(),
        1,
    );
    DetectionPipeline::new(config, camera, detector, alarm, dispatcher, cleaner)
}

#[test]
fn cooldown_window_limits_alert_rate() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(dir.path().to_path_buf(), Duration::from_millis(300));
    let (channel, sent) = recording_channel(&["+15550001111"]);
    let mut pipeline = pipeline_with(ScriptedBackend::person(0.9), config, channel);
    pipeline.start().expect("start pipeline");

    assert_eq!(pipeline.tick(), CycleOutcome::AlertSent);
    assert_eq!(pipeline.tick(), CycleOutcome::CooldownSuppressed);
    std::thread::sleep(Duration::from_millis(350));
    assert_eq!(pipeline.tick(), CycleOutcome::AlertSent);
    assert_eq!(pipeline.stats().alerts_sent(), 2);
    pipeline.stop();

    let sent = sent.lock().unwrap();
    assert_eq!(sent.len(), 2);
    assert!(sent[0].1.starts_with("SECURITY ALERT"));
    assert!(sent[0].1.contains("Human detected at"));
    assert!(sent[0].1.contains("Confidence: 0.90"));
    assert!(sent[0].1.contains("Location: Test Bench"));
    // No upload providers, so the snapshot cannot be hosted.
    assert!(sent[0].1.ends_with("(image could not be attached)"));
    assert_eq!(sent[0].2, None);
}

#[test]
fn run_loop_sends_one_alert_per_window() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(dir.path().to_path_buf(), Duration::from_secs(60));
    let (channel, sent) = recording_channel(&["+15550001111"]);
    let pipeline = pipeline_with(ScriptedBackend::person(0.9), config, channel);

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    let handle = std::thread::spawn(move || {
        let mut pipeline = pipeline;
        pipeline.run(&flag).expect("run pipeline");
        pipeline
    });

    std::thread::sleep(Duration::from_millis(400));
    shutdown.store(true, Ordering::SeqCst);
    let pipeline = handle.join().expect("join run thread");

    assert!(!pipeline.is_running());
    assert!(pipeline.stats().frames_processed() >= 1);
    assert_eq!(pipeline.stats().alerts_sent(), 1);
    assert_eq!(sent.lock().unwrap().len(), 1);
}

#[test]
fn clear_scene_delivers_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(dir.path().to_path_buf(), Duration::from_secs(60));
    let (channel, sent) = recording_channel(&["+15550001111"]);
    let mut pipeline = pipeline_with(ScriptedBackend::quiet(), config, channel);
    pipeline.start().expect("start pipeline");

    for _ in 0..5 {
        assert_eq!(pipeline.tick(), CycleOutcome::Clear);
    }
    pipeline.stop();

    assert_eq!(pipeline.stats().alerts_sent(), 0);
    assert!(sent.lock().unwrap().is_empty());
}
