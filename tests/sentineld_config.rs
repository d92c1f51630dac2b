use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use sentinel_core::config::SentinelConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SENTINEL_CONFIG",
        "SENTINEL_CAMERA",
        "SENTINEL_CONFIDENCE_THRESHOLD",
        "SENTINEL_COOLDOWN_SECS",
        "SENTINEL_ALARM_SOUND",
        "SENTINEL_CHAT_WEBHOOK",
        "SENTINEL_CHAT_TOKEN",
        "SENTINEL_CHAT_RECIPIENTS",
        "SENTINEL_EMAIL_WEBHOOK",
        "SENTINEL_EMAIL_TOKEN",
        "SENTINEL_EMAIL_RECIPIENTS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = SentinelConfig::load().expect("load defaults");

    assert_eq!(cfg.detection.confidence_threshold, 0.5);
    assert_eq!(cfg.detection.cooldown, Duration::from_secs(10));
    assert_eq!(cfg.detection.backend, "scripted");
    assert_eq!(cfg.camera.device, "stub://camera");
    assert_eq!(cfg.camera.width, 640);
    assert_eq!(cfg.camera.height, 480);
    assert_eq!(cfg.camera.target_fps, 30);
    assert_eq!(cfg.camera.location, "Security Camera");
    assert_eq!(cfg.alarm.sound_file.to_str().unwrap(), "alarm.wav");
    assert_eq!(cfg.alarm.duration, Duration::from_secs(3));
    assert!(cfg.upload.providers.is_empty());
    assert_eq!(cfg.upload.timeout, Duration::from_secs(30));
    assert_eq!(cfg.artifacts.dir.to_str().unwrap(), "detections");
    assert_eq!(cfg.artifacts.cleanup_delay, Duration::from_secs(60));
    assert!(!cfg.chat.is_active());
    assert!(!cfg.email.is_active());

    clear_env();
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "detection": {
            "confidence_threshold": 0.7,
            "cooldown_secs": 20,
            "backend": "scripted"
        },
        "camera": {
            "device": "/dev/video2",
            "width": 1280,
            "height": 720,
            "target_fps": 15,
            "location": "Warehouse East"
        },
        "alarm": {
            "sound_file": "siren.wav",
            "duration_secs": 5
        },
        "chat": {
            "webhook_url": "https://relay.example/chat",
            "token": "secret-token",
            "recipients": ["+15551234567"]
        },
        "email": {
            "webhook_url": "https://relay.example/mail",
            "recipients": ["ops@example.com"]
        },
        "upload": {
            "providers": [
                { "kind": "imgbb", "api_key": "key-123" },
                { "kind": "cloudinary", "upload_preset": "alerts" }
            ],
            "timeout_secs": 12
        },
        "artifacts": {
            "dir": "artifacts",
            "cleanup_delay_secs": 30
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("SENTINEL_CONFIG", file.path());
    std::env::set_var("SENTINEL_COOLDOWN_SECS", "45");
    std::env::set_var(
        "SENTINEL_CHAT_RECIPIENTS",
        "+15550001111, +15550002222",
    );

    let cfg = SentinelConfig::load().expect("load config");

    assert_eq!(cfg.detection.confidence_threshold, 0.7);
    // Environment wins over the file.
    assert_eq!(cfg.detection.cooldown, Duration::from_secs(45));
    assert_eq!(cfg.camera.device, "/dev/video2");
    assert_eq!(cfg.camera.width, 1280);
    assert_eq!(cfg.camera.height, 720);
    assert_eq!(cfg.camera.target_fps, 15);
    assert_eq!(cfg.camera.location, "Warehouse East");
    assert_eq!(cfg.alarm.sound_file.to_str().unwrap(), "siren.wav");
    assert_eq!(cfg.alarm.duration, Duration::from_secs(5));
    assert_eq!(
        cfg.chat.webhook_url.as_deref(),
        Some("https://relay.example/chat")
    );
    assert_eq!(cfg.chat.token.as_deref(), Some("secret-token"));
    assert_eq!(cfg.chat.recipients, vec!["+15550001111", "+15550002222"]);
    assert_eq!(cfg.email.recipients, vec!["ops@example.com"]);
    assert!(cfg.chat.is_active());
    assert!(cfg.email.is_active());
    assert_eq!(cfg.upload.providers.len(), 2);
    assert_eq!(cfg.upload.providers[0].kind, "imgbb");
    assert_eq!(cfg.upload.providers[0].api_key.as_deref(), Some("key-123"));
    assert_eq!(cfg.upload.providers[1].kind, "cloudinary");
    assert_eq!(
        cfg.upload.providers[1].upload_preset.as_deref(),
        Some("alerts")
    );
    assert_eq!(cfg.upload.timeout, Duration::from_secs(12));
    assert_eq!(cfg.artifacts.dir.to_str().unwrap(), "artifacts");
    assert_eq!(cfg.artifacts.cleanup_delay, Duration::from_secs(30));

    clear_env();
}

#[test]
fn out_of_range_threshold_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SENTINEL_CONFIDENCE_THRESHOLD", "1.5");
    let err = SentinelConfig::load().expect_err("threshold above 1 must fail");
    assert!(err.to_string().contains("confidence_threshold"));

    clear_env();
}

#[test]
fn malformed_email_recipient_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SENTINEL_EMAIL_WEBHOOK", "https://relay.example/mail");
    std::env::set_var("SENTINEL_EMAIL_RECIPIENTS", "not-an-address");
    let err = SentinelConfig::load().expect_err("bad address must fail");
    assert!(err.to_string().contains("not a valid email"));

    clear_env();
}

#[test]
fn unknown_provider_kind_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{ "upload": { "providers": [ { "kind": "s3" } ] } }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    std::env::set_var("SENTINEL_CONFIG", file.path());

    let err = SentinelConfig::load().expect_err("unknown provider must fail");
    assert!(err.to_string().contains("unknown upload provider"));

    clear_env();
}

#[test]
fn non_http_webhook_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SENTINEL_CHAT_WEBHOOK", "ftp://relay.example/chat");
    std::env::set_var("SENTINEL_CHAT_RECIPIENTS", "+15551234567");
    let err = SentinelConfig::load().expect_err("ftp webhook must fail");
    assert!(err.to_string().contains("http"));

    clear_env();
}

#[test]
fn csv_recipients_are_trimmed() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var(
        "SENTINEL_EMAIL_RECIPIENTS",
        " a@example.com , b@example.com ,,",
    );
    let cfg = SentinelConfig::load().expect("load config");
    assert_eq!(cfg.email.recipients, vec!["a@example.com", "b@example.com"]);

    clear_env();
}
