//! Camera capture sources.
//!
//! Two backends sit behind `CameraSource`:
//! - A synthetic feed for `stub://` devices. Always available; used by the
//!   demo and by tests.
//! - Local V4L2 devices (e.g. /dev/video0) behind the `camera-v4l2` feature.
//!
//! `start` opens the device, verifies one successful read, then launches a
//! capture thread that publishes every decoded frame into the shared
//! `FrameSlot`. Readers call `get_frame` for a clone of the most recent
//! frame; capture and detection never share a queue, so a slow consumer only
//! ever skips frames, it never builds a backlog.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};

use crate::frame::{Frame, FrameSlot};

/// Delay before retrying after a failed device read.
pub const READ_RETRY_DELAY: Duration = Duration::from_millis(100);

/// How long `stop` waits for the capture thread before detaching it.
pub const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

// ----------------------------------------------------------------------------
// Errors
// ----------------------------------------------------------------------------

/// Camera failures that abort `start`. Read failures after the capture
/// thread is running are absorbed in-loop and never surface here.
#[derive(Debug)]
pub enum CameraError {
    /// The device could not be opened.
    Unavailable { device: String, reason: String },
    /// The device opened but produced no frame during the start probe.
    NoSignal { device: String, reason: String },
}

impl std::fmt::Display for CameraError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraError::Unavailable { device, reason } => {
                write!(f, "camera {} unavailable: {}", device, reason)
            }
            CameraError::NoSignal { device, reason } => {
                write!(f, "camera {} delivered no frame: {}", device, reason)
            }
        }
    }
}

impl std::error::Error for CameraError {}

// ----------------------------------------------------------------------------
// Configuration and reporting types
// ----------------------------------------------------------------------------

/// Configuration for a camera source.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Device path (e.g. "/dev/video0"), or a `stub://` URI for the
    /// synthetic feed.
    pub device: String,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
    /// Target frame rate. The synthetic feed paces itself to this; real
    /// devices treat it as a hint.
    pub target_fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "stub://camera".to_string(),
            width: 640,
            height: 480,
            target_fps: 30,
        }
    }
}

/// Metadata for an active or probed camera.
#[derive(Clone, Debug)]
pub struct CameraInfo {
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub synthetic: bool,
}

/// Capture counters, cumulative across restarts of the same source.
#[derive(Clone, Debug, Default)]
pub struct CaptureStats {
    pub frames_captured: u64,
    pub read_failures: u64,
}

#[derive(Default)]
struct CaptureCounters {
    frames: AtomicU64,
    failures: AtomicU64,
}

// ----------------------------------------------------------------------------
// CameraSource: public capture surface
// ----------------------------------------------------------------------------

/// Owns the camera device and its capture thread.
pub struct CameraSource {
    config: CameraConfig,
    slot: Arc<FrameSlot>,
    counters: Arc<CaptureCounters>,
    worker: Option<CaptureWorker>,
}

struct CaptureWorker {
    shutdown: Arc<AtomicBool>,
    join: JoinHandle<()>,
    /// Closed (sender dropped) when the capture thread exits; lets `stop`
    /// join with a bound instead of blocking on a wedged device read.
    done: Receiver<()>,
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            slot: Arc::new(FrameSlot::new()),
            counters: Arc::new(CaptureCounters::default()),
            worker: None,
        }
    }

    /// Open the device, probe one frame, and launch the capture thread.
    ///
    /// The probe frame is published, so `get_frame` has data as soon as
    /// `start` returns. Calling `start` while already running is a no-op.
    pub fn start(&mut self) -> Result<(), CameraError> {
        if self.worker.is_some() {
            log::debug!("CameraSource: start called while already running");
            return Ok(());
        }

        let mut backend = CameraBackend::open(&self.config)?;

        // One successful read before the thread launches. A device that
        // opens but never signals fails here, not silently in the loop.
        let probe = backend
            .read_frame(1)
            .map_err(|err| CameraError::NoSignal {
                device: self.config.device.clone(),
                reason: format!("{err:#}"),
            })?;
        self.slot.publish(probe);
        self.counters.frames.fetch_add(1, Ordering::Relaxed);

        let shutdown = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = bounded::<()>(1);

        let slot = self.slot.clone();
        let counters = self.counters.clone();
        let thread_shutdown = shutdown.clone();
        let device = self.config.device.clone();
        let join = std::thread::spawn(move || {
            let _done = done_tx;
            run_capture(&mut backend, &slot, &counters, &thread_shutdown);
            log::info!("CameraSource: capture thread for {} exited", device);
        });

        self.worker = Some(CaptureWorker {
            shutdown,
            join,
            done: done_rx,
        });
        log::info!("CameraSource: capturing from {}", self.config.device);
        Ok(())
    }

    /// Clone of the most recent frame, or `None` before the first capture.
    pub fn get_frame(&self) -> Option<Frame> {
        self.slot.snapshot()
    }

    /// Signal the capture thread, join it with a bounded timeout, and
    /// release the device. Idempotent.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        worker.shutdown.store(true, Ordering::SeqCst);
        match worker.done.recv_timeout(STOP_JOIN_TIMEOUT) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.join.join().is_err() {
                    log::error!("CameraSource: capture thread panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                // A wedged device read must not hang shutdown; detach.
                log::warn!(
                    "CameraSource: capture thread for {} did not stop within {:?}",
                    self.config.device,
                    STOP_JOIN_TIMEOUT
                );
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Metadata for the configured device.
    pub fn info(&self) -> CameraInfo {
        CameraInfo {
            device: self.config.device.clone(),
            width: self.config.width,
            height: self.config.height,
            synthetic: is_synthetic(&self.config.device),
        }
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            frames_captured: self.counters.frames.load(Ordering::Relaxed),
            read_failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_capture(
    backend: &mut CameraBackend,
    slot: &FrameSlot,
    counters: &CaptureCounters,
    shutdown: &AtomicBool,
) {
    // Probe was seq 1.
    let mut seq = 2u64;
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match backend.read_frame(seq) {
            Ok(frame) => {
                slot.publish(frame);
                counters.frames.fetch_add(1, Ordering::Relaxed);
                seq += 1;
            }
            Err(err) => {
                counters.failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("CameraSource: frame read failed: {err:#}");
                std::thread::sleep(READ_RETRY_DELAY);
            }
        }
    }
}

fn is_synthetic(device: &str) -> bool {
    device.starts_with("stub://")
}

/// Probe device indices `0..max_index` and report which ones open.
///
/// The synthetic feed is always listed last. Real device probing requires
/// the `camera-v4l2` feature; without it only the synthetic entry appears.
pub fn list_cameras(max_index: u32) -> Vec<CameraInfo> {
    let mut found = Vec::new();

    #[cfg(feature = "camera-v4l2")]
    for index in 0..max_index {
        let device = format!("/dev/video{}", index);
        match v4l2::probe_device(&device) {
            Ok(info) => found.push(info),
            Err(err) => log::debug!("list_cameras: {} skipped: {err:#}", device),
        }
    }
    #[cfg(not(feature = "camera-v4l2"))]
    if max_index > 0 {
        log::info!("list_cameras: device probing requires the camera-v4l2 feature");
    }

    found.push(CameraInfo {
        device: "stub://camera".to_string(),
        width: 640,
        height: 480,
        synthetic: true,
    });
    found
}

// ----------------------------------------------------------------------------
// Backends
// ----------------------------------------------------------------------------

enum CameraBackend {
    Synthetic(SyntheticCamera),
    #[cfg(feature = "camera-v4l2")]
    V4l2(v4l2::V4l2Camera),
}

impl CameraBackend {
    fn open(config: &CameraConfig) -> Result<Self, CameraError> {
        if is_synthetic(&config.device) {
            return Ok(Self::Synthetic(SyntheticCamera::new(config.clone())));
        }
        #[cfg(feature = "camera-v4l2")]
        {
            Ok(Self::V4l2(v4l2::V4l2Camera::open(config).map_err(
                |err| CameraError::Unavailable {
                    device: config.device.clone(),
                    reason: format!("{err:#}"),
                },
            )?))
        }
        #[cfg(not(feature = "camera-v4l2"))]
        {
            Err(CameraError::Unavailable {
                device: config.device.clone(),
                reason: "real devices require the camera-v4l2 feature".to_string(),
            })
        }
    }

    fn read_frame(&mut self, seq: u64) -> Result<Frame> {
        match self {
            CameraBackend::Synthetic(camera) => camera.read_frame(seq),
            #[cfg(feature = "camera-v4l2")]
            CameraBackend::V4l2(camera) => camera.read_frame(seq),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic feed (stub://)
// ----------------------------------------------------------------------------

struct SyntheticCamera {
    config: CameraConfig,
    scene_state: u8,
}

impl SyntheticCamera {
    fn new(config: CameraConfig) -> Self {
        Self {
            config,
            scene_state: 0,
        }
    }

    fn read_frame(&mut self, seq: u64) -> Result<Frame> {
        if self.config.target_fps > 0 {
            std::thread::sleep(Duration::from_millis(
                (1000 / u64::from(self.config.target_fps)).max(1),
            ));
        }
        Ok(Frame::new(
            self.paint(seq),
            self.config.width,
            self.config.height,
            seq,
        ))
    }

    /// Paint a synthetic scene: a static gradient background, a brighter
    /// block that drifts across the frame, and a sprinkle of sensor noise.
    fn paint(&mut self, seq: u64) -> Vec<u8> {
        use rand::Rng;

        let width = self.config.width as usize;
        let height = self.config.height as usize;
        let mut pixels = vec![0u8; width * height * 3];

        if seq % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }

        for y in 0..height {
            for x in 0..width {
                let offset = (y * width + x) * 3;
                pixels[offset] = ((x + self.scene_state as usize) % 256) as u8;
                pixels[offset + 1] = (y % 256) as u8;
                pixels[offset + 2] = 32;
            }
        }

        // Drifting block, one figure-width per ~width frames.
        let block_w = (width / 8).max(1);
        let block_h = (height / 3).max(1);
        let block_x = (seq as usize * 2) % width.saturating_sub(block_w).max(1);
        let block_y = height.saturating_sub(block_h) / 2;
        for y in block_y..(block_y + block_h).min(height) {
            for x in block_x..(block_x + block_w).min(width) {
                let offset = (y * width + x) * 3;
                pixels[offset] = 220;
                pixels[offset + 1] = 210;
                pixels[offset + 2] = 200;
            }
        }

        let mut rng = rand::thread_rng();
        for _ in 0..(width * height / 100).max(1) {
            let index = rng.gen_range(0..width * height) * 3;
            let value = rng.gen::<u8>();
            pixels[index] = value;
            pixels[index + 1] = value;
            pixels[index + 2] = value;
        }

        pixels
    }
}

// ----------------------------------------------------------------------------
// V4L2 devices (feature camera-v4l2)
// ----------------------------------------------------------------------------

#[cfg(feature = "camera-v4l2")]
mod v4l2 {
    use anyhow::{anyhow, Context, Result};
    use ouroboros::self_referencing;

    use super::{CameraConfig, CameraInfo};
    use crate::frame::Frame;

    pub(super) struct V4l2Camera {
        state: CameraState,
        fourcc: [u8; 4],
        width: u32,
        height: u32,
    }

    #[self_referencing]
    struct CameraState {
        device: v4l::Device,
        #[borrows(mut device)]
        #[covariant]
        stream: v4l::prelude::MmapStream<'this, v4l::Device>,
    }

    impl V4l2Camera {
        pub(super) fn open(config: &CameraConfig) -> Result<Self> {
            use v4l::buffer::Type;
            use v4l::video::Capture;

            let mut device = v4l::Device::with_path(&config.device)
                .with_context(|| format!("open v4l2 device {}", config.device))?;

            let mut format = device.format().context("read v4l2 format")?;
            format.width = config.width;
            format.height = config.height;
            format.fourcc = v4l::FourCC::new(b"RGB3");
            let format = match device.set_format(&format) {
                Ok(format) => format,
                Err(err) => {
                    log::warn!(
                        "V4l2Camera: failed to set format on {}: {}",
                        config.device,
                        err
                    );
                    device
                        .format()
                        .context("read v4l2 format after set failure")?
                }
            };

            if config.target_fps > 0 {
                let params = v4l::video::capture::Parameters::with_fps(config.target_fps);
                if let Err(err) = device.set_params(&params) {
                    log::warn!("V4l2Camera: failed to set fps on {}: {}", config.device, err);
                }
            }

            let fourcc = format.fourcc.repr;
            let width = format.width;
            let height = format.height;

            let state = CameraStateBuilder {
                device,
                stream_builder: |device| {
                    v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                        .map_err(|err| {
                            anyhow::Error::new(err).context("create v4l2 buffer stream")
                        })
                },
            }
            .try_build()?;

            log::info!(
                "V4l2Camera: opened {} ({}x{} {})",
                config.device,
                width,
                height,
                String::from_utf8_lossy(&fourcc)
            );
            Ok(Self {
                state,
                fourcc,
                width,
                height,
            })
        }

        pub(super) fn read_frame(&mut self, seq: u64) -> Result<Frame> {
            use v4l::io::traits::CaptureStream;

            let fourcc = self.fourcc;
            let width = self.width;
            let height = self.height;
            let pixels = self.state.with_stream_mut(|stream| -> Result<Vec<u8>> {
                let (buf, _meta) = stream.next().context("capture v4l2 frame")?;
                decode_pixels(buf, width, height, fourcc)
            })?;
            Ok(Frame::new(pixels, width, height, seq))
        }
    }

    /// Open a device node and report its current format without streaming.
    pub(super) fn probe_device(device: &str) -> Result<CameraInfo> {
        use v4l::video::Capture;

        let dev =
            v4l::Device::with_path(device).with_context(|| format!("open v4l2 device {device}"))?;
        let format = dev.format().context("read v4l2 format")?;
        Ok(CameraInfo {
            device: device.to_string(),
            width: format.width,
            height: format.height,
            synthetic: false,
        })
    }

    fn decode_pixels(buf: &[u8], width: u32, height: u32, fourcc: [u8; 4]) -> Result<Vec<u8>> {
        match &fourcc {
            b"RGB3" => {
                let expected = (width as usize) * (height as usize) * 3;
                if buf.len() != expected {
                    return Err(anyhow!(
                        "RGB frame length mismatch: expected {}, got {}",
                        expected,
                        buf.len()
                    ));
                }
                Ok(buf.to_vec())
            }
            b"YUYV" => yuyv_to_rgb(buf, width, height),
            other => Err(anyhow!(
                "unsupported fourcc {}",
                String::from_utf8_lossy(other)
            )),
        }
    }

    fn yuyv_to_rgb(buf: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
        let w = width as usize;
        let h = height as usize;
        let expected = w
            .checked_mul(h)
            .and_then(|v| v.checked_mul(2))
            .ok_or_else(|| anyhow!("YUYV frame dimensions overflow"))?;
        if buf.len() != expected {
            return Err(anyhow!(
                "YUYV frame length mismatch: expected {}, got {}",
                expected,
                buf.len()
            ));
        }

        let mut rgb = vec![0u8; w * h * 3];
        for (pair_index, chunk) in buf.chunks_exact(4).enumerate() {
            let y0 = chunk[0] as f32;
            let u = chunk[1] as f32 - 128.0;
            let y1 = chunk[2] as f32;
            let v = chunk[3] as f32 - 128.0;

            for (slot, y) in [(0, y0), (1, y1)] {
                let r = y + 1.402_f32 * v;
                let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
                let b = y + 1.772_f32 * u;
                let offset = (pair_index * 2 + slot) * 3;
                rgb[offset] = clamp_to_u8(r);
                rgb[offset + 1] = clamp_to_u8(g);
                rgb[offset + 2] = clamp_to_u8(b);
            }
        }
        Ok(rgb)
    }

    fn clamp_to_u8(value: f32) -> u8 {
        value.round().clamp(0.0, 255.0) as u8
    }

}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
