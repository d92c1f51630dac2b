//! demo - end-to-end synthetic run of the detection pipeline
//!
//! Runs the full capture / detect / gate / alert loop against the synthetic
//! camera and the scripted detector, with no hardware, model file, or
//! network endpoint required. People "appear" periodically, so a short run
//! shows the alarm firing, the cooldown suppressing, and snapshots landing
//! in the output directory.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sentinel_core::config::{
    AlarmSettings, ArtifactSettings, CameraSettings, ChannelSettings, DetectionConfig,
    SentinelConfig, UploadSettings,
};
use sentinel_core::DetectionPipeline;

const DEFAULT_ARTIFACT_DIR: &str = "demo_detections";

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Duration of the synthetic run in seconds.
    #[arg(long, default_value_t = 20)]
    seconds: u64,
    /// Cooldown between alerts in seconds.
    #[arg(long, default_value_t = 5)]
    cooldown: u64,
    /// Output directory for snapshot artifacts.
    #[arg(long, default_value = DEFAULT_ARTIFACT_DIR)]
    out: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    stage("build synthetic pipeline");
    let mut pipeline = DetectionPipeline::from_config(demo_config(&args))?;

    stage("run detection loop");
    let shutdown = Arc::new(AtomicBool::new(false));
    let ctrlc_flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        ctrlc_flag.store(true, Ordering::SeqCst);
    })
    .expect("error setting Ctrl-C handler");
    let timer_flag = Arc::clone(&shutdown);
    let seconds = args.seconds.max(1);
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_secs(seconds));
        timer_flag.store(true, Ordering::SeqCst);
    });
    pipeline.run(&shutdown)?;

    let stats = pipeline.stats();
    println!("demo summary:");
    println!("  frames processed: {}", stats.frames_processed());
    println!("  detection cycles: {}", stats.detection_cycles());
    println!("  alerts sent: {}", stats.alerts_sent());
    println!("  snapshots in: {}", args.out);
    println!("next steps:");
    println!("  ls -la {}", args.out);
    println!("  cargo run --bin sentineld -- --help");
    Ok(())
}

fn stage(msg: &str) {
    eprintln!("demo: {}", msg);
}

fn demo_config(args: &Args) -> SentinelConfig {
    SentinelConfig {
        detection: DetectionConfig {
            confidence_threshold: 0.5,
            cooldown: Duration::from_secs(args.cooldown),
            backend: "scripted".to_string(),
            model_path: None,
        },
        camera: CameraSettings {
            device: "stub://camera".to_string(),
            width: 640,
            height: 480,
            target_fps: 30,
            location: "Demo Camera".to_string(),
        },
        alarm: AlarmSettings {
            sound_file: PathBuf::from("alarm.wav"),
            duration: Duration::from_secs(2),
        },
        chat: ChannelSettings::default(),
        email: ChannelSettings::default(),
        upload: UploadSettings {
            providers: Vec::new(),
            timeout: Duration::from_secs(10),
        },
        artifacts: ArtifactSettings {
            dir: PathBuf::from(&args.out),
            cleanup_delay: Duration::from_secs(10),
        },
    }
}
