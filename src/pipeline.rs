//! The detect / gate / dispatch loop.
//!
//! One `DetectionPipeline` owns the camera, the detector, the cooldown
//! gate, the alarm, and the alert fan-out, and drives them from a single
//! thread: read the freshest frame, run the detector, and when a person is
//! present and the cooldown window has passed, fire the alarm and queue the
//! alert. Everything slow or unreliable (playback, uploads, webhooks)
//! happens on other threads; a cycle here never blocks on delivery.

use anyhow::{Context, Result};
use chrono::Local;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::alarm::AlarmController;
use crate::camera::{CameraConfig, CameraSource};
use crate::config::SentinelConfig;
use crate::detect::{backend_for, PersonDetector};
use crate::gate::AlertGate;
use crate::notify::{alert_message, AlertPayload, ArtifactCleaner, Dispatcher};
use crate::snapshot::save_snapshot;
use crate::stats::{SessionStats, ThroughputMeter};

/// Pause before retrying when the capture slot is still empty.
const NO_FRAME_DELAY: Duration = Duration::from_millis(100);
/// How long shutdown waits for queued alerts to finish delivering.
const DISPATCH_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// What a single loop cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The capture slot had no frame yet.
    NoFrame,
    /// A frame was processed and no person was found.
    Clear,
    /// A person was found and the full alert path fired.
    AlertSent,
    /// A person was found but the cooldown window is still open.
    CooldownSuppressed,
    /// The model backend returned an error; the cycle was skipped.
    DetectorFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineState {
    Idle,
    Running,
    Stopped,
}

pub struct DetectionPipeline {
    config: SentinelConfig,
    camera: CameraSource,
    detector: PersonDetector,
    gate: AlertGate,
    alarm: AlarmController,
    dispatcher: Option<Dispatcher>,
    cleaner: Option<ArtifactCleaner>,
    stats: SessionStats,
    meter: ThroughputMeter,
    state: PipelineState,
}

impl DetectionPipeline {
    /// Assemble a pipeline from pre-built parts. The cooldown gate is
    /// derived from the configuration here; nothing reconfigures it later.
    pub fn new(
        config: SentinelConfig,
        camera: CameraSource,
        detector: PersonDetector,
        alarm: AlarmController,
        dispatcher: Dispatcher,
        cleaner: ArtifactCleaner,
    ) -> Self {
        let gate = AlertGate::new(config.detection.cooldown);
        Self {
            config,
            camera,
            detector,
            gate,
            alarm,
            dispatcher: Some(dispatcher),
            cleaner: Some(cleaner),
            stats: SessionStats::new(),
            meter: ThroughputMeter::new(),
            state: PipelineState::Idle,
        }
    }

    /// Build every component the configuration describes.
    pub fn from_config(config: SentinelConfig) -> Result<Self> {
        let camera = CameraSource::new(CameraConfig {
            device: config.camera.device.clone(),
            width: config.camera.width,
            height: config.camera.height,
            target_fps: config.camera.target_fps,
        });
        let backend = backend_for(&config.detection, config.camera.width, config.camera.height)?;
        let detector = PersonDetector::new(backend, config.detection.confidence_threshold);
        let alarm = AlarmController::with_console(
            config.alarm.sound_file.clone(),
            config.alarm.duration,
        );
        let cleaner = ArtifactCleaner::start(config.artifacts.cleanup_delay);
        let dispatcher =
            Dispatcher::from_config(&config, cleaner.handle()).context("build alert channels")?;
        Ok(Self::new(config, camera, detector, alarm, dispatcher, cleaner))
    }

    /// Start the capture thread and warm the model. Fails when the camera
    /// cannot produce a first frame; a dead camera is the one error the
    /// operator must see immediately.
    pub fn start(&mut self) -> Result<()> {
        if self.state == PipelineState::Running {
            return Ok(());
        }
        if let Err(e) = self.detector.warm_up() {
            log::warn!("model warm-up failed: {:#}", e);
        }
        self.camera.start().context("start camera")?;
        let info = self.camera.info();
        log::info!(
            "monitoring {} at {}x{} with the {} backend",
            info.device,
            info.width,
            info.height,
            self.detector.backend_name()
        );
        self.state = PipelineState::Running;
        Ok(())
    }

    /// Run one cycle. Exposed separately from [`run`](Self::run) so tests
    /// can step the loop without threads or pacing.
    pub fn tick(&mut self) -> CycleOutcome {
        let Some(frame) = self.camera.get_frame() else {
            return CycleOutcome::NoFrame;
        };
        self.stats.record_frame();
        if let Some(fps) = self.meter.tick() {
            log::info!(
                "health: {:.1} fps, {} frames, {} alerts",
                fps,
                self.stats.frames_processed(),
                self.stats.alerts_sent()
            );
        }

        let event = match self.detector.detect(&frame) {
            Ok(event) => event,
            Err(e) => {
                log::warn!("detector error: {:#}", e);
                return CycleOutcome::DetectorFailed;
            }
        };
        if !event.human_present {
            return CycleOutcome::Clear;
        }

        self.stats.record_detection();
        if !self.gate.try_grant(Instant::now()) {
            return CycleOutcome::CooldownSuppressed;
        }

        log::warn!(
            "HUMAN DETECTED! count={}, max confidence={:.2}",
            event.person_count(),
            event.max_confidence()
        );
        self.alarm.play();

        let snapshot = match save_snapshot(&frame, &event.detections, &self.config.artifacts.dir)
        {
            Ok(path) => Some(path),
            Err(e) => {
                log::warn!("snapshot write failed, alert goes out text-only: {:#}", e);
                None
            }
        };
        let message = alert_message(&event, &self.config.camera.location, Local::now());
        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.dispatch(AlertPayload::new(message, snapshot));
        }
        self.stats.record_alert();
        CycleOutcome::AlertSent
    }

    /// Loop until `shutdown` is raised. Paces cycles to the configured
    /// frame rate and backs off briefly while the slot is empty.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<()> {
        self.start()?;
        let interval = cycle_interval(self.config.camera.target_fps);
        while self.state == PipelineState::Running && !shutdown.load(Ordering::SeqCst) {
            let cycle_start = Instant::now();
            match self.tick() {
                CycleOutcome::NoFrame => std::thread::sleep(NO_FRAME_DELAY),
                _ => {
                    let elapsed = cycle_start.elapsed();
                    if elapsed < interval {
                        std::thread::sleep(interval - elapsed);
                    }
                }
            }
        }
        self.stop();
        Ok(())
    }

    /// Stop capture, silence the alarm, drain the alert queue, and flush
    /// pending artifact removals. Idempotent.
    pub fn stop(&mut self) {
        if self.state == PipelineState::Stopped {
            return;
        }
        self.state = PipelineState::Stopped;
        self.camera.stop();
        self.alarm.stop();
        if let Some(dispatcher) = self.dispatcher.take() {
            dispatcher.shutdown(DISPATCH_DRAIN_TIMEOUT);
        }
        if let Some(cleaner) = self.cleaner.take() {
            cleaner.shutdown();
        }
        log::info!("{}", self.stats.summary());
    }

    pub fn is_running(&self) -> bool {
        self.state == PipelineState::Running
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }
}

impl Drop for DetectionPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

fn cycle_interval(target_fps: u32) -> Duration {
    if target_fps == 0 {
        Duration::from_millis(0)
    } else {
        Duration::from_millis((1000 / target_fps).max(1) as u64)
    }
}
