use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
const DEFAULT_COOLDOWN_SECS: u64 = 10;
const DEFAULT_DETECTION_BACKEND: &str = "scripted";
const DEFAULT_CAMERA_DEVICE: &str = "stub://camera";
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CAMERA_FPS: u32 = 30;
const DEFAULT_CAMERA_LOCATION: &str = "Security Camera";
const DEFAULT_ALARM_SOUND: &str = "alarm.wav";
const DEFAULT_ALARM_DURATION_SECS: u64 = 3;
const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 30;
const DEFAULT_ARTIFACT_DIR: &str = "detections";
const DEFAULT_CLEANUP_DELAY_SECS: u64 = 60;

#[derive(Debug, Deserialize, Default)]
struct SentinelConfigFile {
    detection: Option<DetectionConfigFile>,
    camera: Option<CameraConfigFile>,
    alarm: Option<AlarmConfigFile>,
    chat: Option<ChannelConfigFile>,
    email: Option<ChannelConfigFile>,
    upload: Option<UploadConfigFile>,
    artifacts: Option<ArtifactConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    confidence_threshold: Option<f32>,
    cooldown_secs: Option<u64>,
    backend: Option<String>,
    model_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
    location: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct AlarmConfigFile {
    sound_file: Option<PathBuf>,
    duration_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ChannelConfigFile {
    webhook_url: Option<String>,
    token: Option<String>,
    recipients: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct UploadConfigFile {
    providers: Option<Vec<ProviderConfigFile>>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ProviderConfigFile {
    kind: Option<String>,
    api_key: Option<String>,
    endpoint: Option<String>,
    upload_preset: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ArtifactConfigFile {
    dir: Option<PathBuf>,
    cleanup_delay_secs: Option<u64>,
}

/// Resolved process configuration. Built once at startup, validated, and
/// passed read-only into the pipeline; nothing mutates it afterwards.
#[derive(Debug, Clone)]
pub struct SentinelConfig {
    pub detection: DetectionConfig,
    pub camera: CameraSettings,
    pub alarm: AlarmSettings,
    pub chat: ChannelSettings,
    pub email: ChannelSettings,
    pub upload: UploadSettings,
    pub artifacts: ArtifactSettings,
}

#[derive(Debug, Clone)]
pub struct DetectionConfig {
    pub confidence_threshold: f32,
    pub cooldown: Duration,
    pub backend: String,
    pub model_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
    /// Human-readable placement, used verbatim in alert text.
    pub location: String,
}

#[derive(Debug, Clone)]
pub struct AlarmSettings {
    pub sound_file: PathBuf,
    pub duration: Duration,
}

/// One delivery channel. A channel participates in the fan-out only when it
/// has both an endpoint and at least one recipient.
#[derive(Debug, Clone, Default)]
pub struct ChannelSettings {
    pub webhook_url: Option<String>,
    pub token: Option<String>,
    pub recipients: Vec<String>,
}

impl ChannelSettings {
    pub fn is_active(&self) -> bool {
        self.webhook_url.is_some() && !self.recipients.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    /// Providers tried in order; the first success wins.
    pub providers: Vec<ProviderSettings>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// "imgbb" or "cloudinary".
    pub kind: String,
    pub api_key: Option<String>,
    /// Endpoint override; each kind carries its own default.
    pub endpoint: Option<String>,
    pub upload_preset: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ArtifactSettings {
    pub dir: PathBuf,
    pub cleanup_delay: Duration,
}

impl SentinelConfig {
    /// Load from the file named by `SENTINEL_CONFIG` (when set), then apply
    /// environment overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SENTINEL_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        Self::resolve(file_cfg.unwrap_or_default())
    }

    /// Load from an explicit file path (the `--config` flag), then apply
    /// environment overrides and validate.
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::resolve(read_config_file(path)?)
    }

    fn resolve(file: SentinelConfigFile) -> Result<Self> {
        let mut cfg = Self::from_file(file);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SentinelConfigFile) -> Self {
        let detection = DetectionConfig {
            confidence_threshold: file
                .detection
                .as_ref()
                .and_then(|detection| detection.confidence_threshold)
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            cooldown: Duration::from_secs(
                file.detection
                    .as_ref()
                    .and_then(|detection| detection.cooldown_secs)
                    .unwrap_or(DEFAULT_COOLDOWN_SECS),
            ),
            backend: file
                .detection
                .as_ref()
                .and_then(|detection| detection.backend.clone())
                .unwrap_or_else(|| DEFAULT_DETECTION_BACKEND.to_string()),
            model_path: file.detection.and_then(|detection| detection.model_path),
        };
        let camera = CameraSettings {
            device: file
                .camera
                .as_ref()
                .and_then(|camera| camera.device.clone())
                .unwrap_or_else(|| DEFAULT_CAMERA_DEVICE.to_string()),
            width: file
                .camera
                .as_ref()
                .and_then(|camera| camera.width)
                .unwrap_or(DEFAULT_CAMERA_WIDTH),
            height: file
                .camera
                .as_ref()
                .and_then(|camera| camera.height)
                .unwrap_or(DEFAULT_CAMERA_HEIGHT),
            target_fps: file
                .camera
                .as_ref()
                .and_then(|camera| camera.target_fps)
                .unwrap_or(DEFAULT_CAMERA_FPS),
            location: file
                .camera
                .and_then(|camera| camera.location)
                .unwrap_or_else(|| DEFAULT_CAMERA_LOCATION.to_string()),
        };
        let alarm = AlarmSettings {
            sound_file: file
                .alarm
                .as_ref()
                .and_then(|alarm| alarm.sound_file.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ALARM_SOUND)),
            duration: Duration::from_secs(
                file.alarm
                    .and_then(|alarm| alarm.duration_secs)
                    .unwrap_or(DEFAULT_ALARM_DURATION_SECS),
            ),
        };
        let chat = channel_settings(file.chat);
        let email = channel_settings(file.email);
        let upload = UploadSettings {
            providers: file
                .upload
                .as_ref()
                .and_then(|upload| upload.providers.as_ref())
                .map(|providers| providers.iter().map(provider_settings).collect())
                .unwrap_or_default(),
            timeout: Duration::from_secs(
                file.upload
                    .and_then(|upload| upload.timeout_secs)
                    .unwrap_or(DEFAULT_UPLOAD_TIMEOUT_SECS),
            ),
        };
        let artifacts = ArtifactSettings {
            dir: file
                .artifacts
                .as_ref()
                .and_then(|artifacts| artifacts.dir.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACT_DIR)),
            cleanup_delay: Duration::from_secs(
                file.artifacts
                    .and_then(|artifacts| artifacts.cleanup_delay_secs)
                    .unwrap_or(DEFAULT_CLEANUP_DELAY_SECS),
            ),
        };
        Self {
            detection,
            camera,
            alarm,
            chat,
            email,
            upload,
            artifacts,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(device) = std::env::var("SENTINEL_CAMERA") {
            if !device.trim().is_empty() {
                self.camera.device = device;
            }
        }
        if let Ok(threshold) = std::env::var("SENTINEL_CONFIDENCE_THRESHOLD") {
            let value: f32 = threshold.parse().map_err(|_| {
                anyhow!("SENTINEL_CONFIDENCE_THRESHOLD must be a number between 0 and 1")
            })?;
            self.detection.confidence_threshold = value;
        }
        if let Ok(cooldown) = std::env::var("SENTINEL_COOLDOWN_SECS") {
            let seconds: u64 = cooldown.parse().map_err(|_| {
                anyhow!("SENTINEL_COOLDOWN_SECS must be an integer number of seconds")
            })?;
            self.detection.cooldown = Duration::from_secs(seconds);
        }
        if let Ok(sound) = std::env::var("SENTINEL_ALARM_SOUND") {
            if !sound.trim().is_empty() {
                self.alarm.sound_file = PathBuf::from(sound);
            }
        }
        if let Ok(url) = std::env::var("SENTINEL_CHAT_WEBHOOK") {
            if !url.trim().is_empty() {
                self.chat.webhook_url = Some(url);
            }
        }
        if let Ok(token) = std::env::var("SENTINEL_CHAT_TOKEN") {
            if !token.trim().is_empty() {
                self.chat.token = Some(token);
            }
        }
        if let Ok(recipients) = std::env::var("SENTINEL_CHAT_RECIPIENTS") {
            let parsed = split_csv(&recipients);
            if !parsed.is_empty() {
                self.chat.recipients = parsed;
            }
        }
        if let Ok(url) = std::env::var("SENTINEL_EMAIL_WEBHOOK") {
            if !url.trim().is_empty() {
                self.email.webhook_url = Some(url);
            }
        }
        if let Ok(token) = std::env::var("SENTINEL_EMAIL_TOKEN") {
            if !token.trim().is_empty() {
                self.email.token = Some(token);
            }
        }
        if let Ok(recipients) = std::env::var("SENTINEL_EMAIL_RECIPIENTS") {
            let parsed = split_csv(&recipients);
            if !parsed.is_empty() {
                self.email.recipients = parsed;
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.detection.confidence_threshold) {
            return Err(anyhow!("confidence_threshold must be between 0 and 1"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera resolution must be non-zero"));
        }
        if self.alarm.duration.as_secs() == 0 {
            return Err(anyhow!("alarm duration must be greater than zero"));
        }
        if self.upload.timeout.as_secs() == 0 {
            return Err(anyhow!("upload timeout must be greater than zero"));
        }

        for recipient in &self.chat.recipients {
            validate_chat_recipient(recipient)?;
        }
        for recipient in &self.email.recipients {
            validate_email_recipient(recipient)?;
        }
        if let Some(url) = &self.chat.webhook_url {
            validate_endpoint("chat.webhook_url", url)?;
        }
        if let Some(url) = &self.email.webhook_url {
            validate_endpoint("email.webhook_url", url)?;
        }

        for provider in &self.upload.providers {
            match provider.kind.as_str() {
                "imgbb" | "cloudinary" => {}
                other => {
                    return Err(anyhow!(
                        "unknown upload provider kind '{}' (expected imgbb or cloudinary)",
                        other
                    ));
                }
            }
            if let Some(endpoint) = &provider.endpoint {
                validate_endpoint("upload provider endpoint", endpoint)?;
            }
        }
        Ok(())
    }
}

fn channel_settings(file: Option<ChannelConfigFile>) -> ChannelSettings {
    let Some(file) = file else {
        return ChannelSettings::default();
    };
    ChannelSettings {
        webhook_url: file.webhook_url,
        token: file.token,
        recipients: file.recipients.unwrap_or_default(),
    }
}

fn provider_settings(file: &ProviderConfigFile) -> ProviderSettings {
    ProviderSettings {
        kind: file.kind.clone().unwrap_or_default(),
        api_key: file.api_key.clone(),
        endpoint: file.endpoint.clone(),
        upload_preset: file.upload_preset.clone(),
    }
}

/// Chat recipients are routing handles (chat ids, numbers, @names), not
/// free text. A positive allowlist keeps surprises out of request bodies.
pub fn validate_chat_recipient(recipient: &str) -> Result<()> {
    static CHAT_RECIPIENT_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = CHAT_RECIPIENT_RE
        .get_or_init(|| regex::Regex::new(r"^\+?[A-Za-z0-9@:_.-]{2,64}$").unwrap());

    if !re.is_match(recipient) {
        return Err(anyhow!(
            "chat recipient '{}' must match ^\\+?[A-Za-z0-9@:_.-]{{2,64}}$",
            recipient
        ));
    }
    Ok(())
}

/// Loose address shape check; deliverability is the relay's problem.
pub fn validate_email_recipient(recipient: &str) -> Result<()> {
    static EMAIL_RECIPIENT_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = EMAIL_RECIPIENT_RE.get_or_init(|| {
        regex::Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").unwrap()
    });

    if !re.is_match(recipient) {
        return Err(anyhow!("'{}' is not a valid email address", recipient));
    }
    Ok(())
}

fn validate_endpoint(what: &str, raw: &str) -> Result<()> {
    let url = url::Url::parse(raw).map_err(|e| anyhow!("{} is not a valid URL: {}", what, e))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(anyhow!("{} must be http(s), got '{}'", what, other)),
    }
}

fn read_config_file(path: &Path) -> Result<SentinelConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
