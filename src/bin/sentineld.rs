//! sentineld - human detection alarm daemon
//!
//! This daemon:
//! 1. Captures frames from the configured camera on a dedicated thread
//! 2. Runs person detection on the freshest frame
//! 3. Sounds the alarm and fans out notifications, one alert per cooldown
//! 4. Removes snapshot artifacts after a configurable delay
//!
//! Utility subcommands probe cameras and exercise the alarm and the
//! notification channels without starting the monitoring loop.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sentinel_core::camera::{CameraConfig, CameraSource};
use sentinel_core::config::SentinelConfig;
use sentinel_core::notify::{AlertPayload, ArtifactCleaner, Dispatcher};
use sentinel_core::{list_cameras, AlarmController, DetectionPipeline};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(long, env = "SENTINEL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Monitor the camera and alert on detected humans (the default).
    Run,
    /// Probe for available cameras and exit.
    ListCameras {
        /// Highest device index to probe.
        #[arg(long, default_value_t = 10)]
        max_index: u32,
    },
    /// Capture frames for a while, report throughput, and exit.
    TestCamera {
        /// How long to capture, in seconds.
        #[arg(long, default_value_t = 10)]
        seconds: u64,
    },
    /// Sound the alarm once and exit.
    TestAlarm,
    /// Send a test alert through every configured channel and exit.
    TestNotify,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(config),
        Command::ListCameras { max_index } => {
            for info in list_cameras(max_index) {
                println!(
                    "{} {}x{}{}",
                    info.device,
                    info.width,
                    info.height,
                    if info.synthetic { " (synthetic)" } else { "" }
                );
            }
            Ok(())
        }
        Command::TestCamera { seconds } => test_camera(&config, seconds),
        Command::TestAlarm => test_alarm(&config),
        Command::TestNotify => test_notify(&config),
    }
}

fn load_config(path: Option<&Path>) -> Result<SentinelConfig> {
    match path {
        Some(path) => SentinelConfig::load_from(path),
        None => SentinelConfig::load(),
    }
}

fn run(config: SentinelConfig) -> Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .expect("error setting Ctrl-C handler");

    let mut pipeline = DetectionPipeline::from_config(config)?;
    log::info!("sentineld running; press Ctrl-C to stop");
    pipeline.run(&shutdown)
}

fn test_camera(config: &SentinelConfig, seconds: u64) -> Result<()> {
    let mut camera = CameraSource::new(CameraConfig {
        device: config.camera.device.clone(),
        width: config.camera.width,
        height: config.camera.height,
        target_fps: config.camera.target_fps,
    });
    camera.start()?;
    let info = camera.info();
    println!("capturing from {} at {}x{}", info.device, info.width, info.height);

    let started = Instant::now();
    let deadline = started + Duration::from_secs(seconds.max(1));
    while Instant::now() < deadline {
        std::thread::sleep(Duration::from_secs(1));
        let stats = camera.stats();
        println!(
            "  {}s: {} frames captured, {} read failures",
            started.elapsed().as_secs(),
            stats.frames_captured,
            stats.read_failures
        );
    }
    camera.stop();

    let stats = camera.stats();
    let fps = stats.frames_captured as f64 / started.elapsed().as_secs_f64();
    println!(
        "camera test done: {} frames in {}s ({:.1} fps)",
        stats.frames_captured,
        started.elapsed().as_secs(),
        fps
    );
    Ok(())
}

fn test_alarm(config: &SentinelConfig) -> Result<()> {
    let alarm = AlarmController::with_console(
        config.alarm.sound_file.clone(),
        config.alarm.duration,
    );
    println!(
        "sounding alarm for {}s ({})",
        config.alarm.duration.as_secs(),
        config.alarm.sound_file.display()
    );
    alarm.play();
    std::thread::sleep(config.alarm.duration + Duration::from_millis(250));
    alarm.stop();
    println!("alarm test completed");
    Ok(())
}

fn test_notify(config: &SentinelConfig) -> Result<()> {
    let active_channels = [
        ("chat", config.chat.is_active()),
        ("email", config.email.is_active()),
    ];
    let names: Vec<&str> = active_channels
        .iter()
        .filter(|(_, active)| *active)
        .map(|(name, _)| *name)
        .collect();
    if names.is_empty() {
        println!("no delivery channels configured; nothing to test");
        return Ok(());
    }
    println!("sending test alert via: {}", names.join(", "));

    let cleaner = ArtifactCleaner::start(config.artifacts.cleanup_delay);
    let dispatcher = Dispatcher::from_config(config, cleaner.handle())?;
    dispatcher.dispatch(AlertPayload::new(
        "Test alert from the human detection system. \
         If you received this, notifications are working."
            .to_string(),
        None,
    ));
    dispatcher.shutdown(config.upload.timeout + Duration::from_secs(5));
    cleaner.shutdown();
    println!("test alert dispatched; check the recipient inboxes");
    Ok(())
}
