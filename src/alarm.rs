//! Audible alarm control.
//!
//! `AlarmController` starts and stops alarm playback without ever blocking
//! the caller: playback runs on its own short-lived thread, an atomic flag
//! makes concurrent `play` calls collapse into one active playback, and any
//! backend failure degrades to console alert ticks instead of surfacing an
//! error. An unavailable audio device must never cost an alert.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

/// Audio subsystem boundary.
///
/// `play_loop` blocks on the playback thread for up to `duration`;
/// implementations must return early when `stop` is called from another
/// thread, so they synchronize internally rather than through a shared
/// lock.
pub trait AudioBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Play `sound_file` on a loop for `duration`, or until `stop`.
    fn play_loop(&self, sound_file: &Path, duration: Duration) -> Result<()>;

    /// Interrupt an in-progress `play_loop`. Must be safe to call at any
    /// time, including when nothing is playing.
    fn stop(&self);
}

// ----------------------------------------------------------------------------
// ConsoleAudio: always-available textual backend
// ----------------------------------------------------------------------------

/// Textual alarm backend: one alert line per second. Always available;
/// serves as the default where no audio device is wired up.
#[derive(Default)]
pub struct ConsoleAudio {
    interrupted: AtomicBool,
}

impl ConsoleAudio {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioBackend for ConsoleAudio {
    fn name(&self) -> &'static str {
        "console"
    }

    fn play_loop(&self, _sound_file: &Path, duration: Duration) -> Result<()> {
        self.interrupted.store(false, Ordering::SeqCst);
        let started = Instant::now();
        while started.elapsed() < duration {
            if self.interrupted.load(Ordering::SeqCst) {
                break;
            }
            log::warn!("ALARM: human detected!");
            std::thread::sleep(Duration::from_secs(1).min(duration));
        }
        Ok(())
    }

    fn stop(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }
}

// ----------------------------------------------------------------------------
// AlarmController
// ----------------------------------------------------------------------------

/// Idempotent start/stop wrapper around an `AudioBackend`.
pub struct AlarmController {
    sound_file: PathBuf,
    duration: Duration,
    backend: Arc<dyn AudioBackend>,
    playing: Arc<AtomicBool>,
    triggered: Arc<AtomicU32>,
}

impl AlarmController {
    pub fn new(sound_file: PathBuf, duration: Duration, backend: Arc<dyn AudioBackend>) -> Self {
        Self {
            sound_file,
            duration,
            backend,
            playing: Arc::new(AtomicBool::new(false)),
            triggered: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Controller with the console backend.
    pub fn with_console(sound_file: PathBuf, duration: Duration) -> Self {
        Self::new(sound_file, duration, Arc::new(ConsoleAudio::new()))
    }

    /// Sound the alarm for the configured duration. No-op if an alarm is
    /// already playing; the caller never blocks on playback.
    pub fn play(&self) {
        self.play_for(self.duration);
    }

    /// Sound the alarm for an explicit duration (self-test entry point).
    pub fn play_for(&self, duration: Duration) {
        if self
            .playing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::debug!("AlarmController: alarm already playing, ignoring trigger");
            return;
        }
        self.triggered.fetch_add(1, Ordering::Relaxed);
        log::warn!(
            "AlarmController: sounding alarm for {}s via {}",
            duration.as_secs(),
            self.backend.name()
        );

        let backend = self.backend.clone();
        let playing = self.playing.clone();
        let sound_file = self.sound_file.clone();
        std::thread::spawn(move || {
            run_playback(&*backend, &playing, &sound_file, duration);
            playing.store(false, Ordering::SeqCst);
        });
    }

    /// Stop a playing alarm. No-op when nothing is playing; always leaves
    /// the controller ready for the next `play`.
    pub fn stop(&self) {
        if !self.playing.swap(false, Ordering::SeqCst) {
            return;
        }
        self.backend.stop();
        log::info!("AlarmController: alarm stopped");
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    /// How many times the alarm has actually started.
    pub fn times_triggered(&self) -> u32 {
        self.triggered.load(Ordering::Relaxed)
    }
}

fn run_playback(
    backend: &dyn AudioBackend,
    playing: &AtomicBool,
    sound_file: &Path,
    duration: Duration,
) {
    let started = Instant::now();
    match backend.play_loop(sound_file, duration) {
        Ok(()) => {}
        Err(err) => {
            // Degraded path: the alert must still be audible somewhere.
            log::error!(
                "AlarmController: {} playback failed: {err:#}; falling back to console ticks",
                backend.name()
            );
            while started.elapsed() < duration && playing.load(Ordering::SeqCst) {
                log::warn!("ALARM: human detected!");
                std::thread::sleep(Duration::from_secs(1));
            }
        }
    }
    // Early stop: the controller flipped the flag, tell the backend too.
    if !playing.load(Ordering::SeqCst) {
        backend.stop();
    }
}
