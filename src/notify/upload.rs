//! Snapshot hosting providers and the ordered fallback chain.

use anyhow::{anyhow, Context, Result};
use base64::Engine;
use std::path::Path;

use super::multipart::MultipartForm;
use crate::config::UploadSettings;

const IMGBB_ENDPOINT: &str = "https://api.imgbb.com/1/upload";
const CLOUDINARY_ENDPOINT: &str = "https://api.cloudinary.com/v1_1/demo/image/upload";
const CLOUDINARY_DEFAULT_PRESET: &str = "ml_default";

/// An image hosting provider that turns snapshot bytes into a public URL.
pub trait ImageHost: Send + Sync {
    fn name(&self) -> &'static str;

    fn upload(&self, jpeg: &[u8], file_name: &str) -> Result<String>;
}

/// imgbb-style host: base64 form upload keyed by an API key.
pub struct ImgbbHost {
    agent: ureq::Agent,
    api_key: String,
    endpoint: String,
}

impl ImgbbHost {
    pub fn new(agent: ureq::Agent, api_key: String, endpoint: Option<String>) -> Self {
        Self {
            agent,
            api_key,
            endpoint: endpoint.unwrap_or_else(|| IMGBB_ENDPOINT.to_string()),
        }
    }
}

impl ImageHost for ImgbbHost {
    fn name(&self) -> &'static str {
        "imgbb"
    }

    fn upload(&self, jpeg: &[u8], _file_name: &str) -> Result<String> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(jpeg);
        let response = self
            .agent
            .post(&self.endpoint)
            .send_form(&[("key", self.api_key.as_str()), ("image", encoded.as_str())])
            .context("imgbb upload request")?;
        let value: serde_json::Value = response.into_json().context("imgbb response body")?;
        value["data"]["url"]
            .as_str()
            .map(|url| url.to_string())
            .ok_or_else(|| anyhow!("imgbb response missing data.url"))
    }
}

/// Cloudinary-style host: unsigned multipart upload against a preset.
pub struct CloudinaryHost {
    agent: ureq::Agent,
    endpoint: String,
    upload_preset: String,
}

impl CloudinaryHost {
    pub fn new(agent: ureq::Agent, endpoint: Option<String>, upload_preset: Option<String>) -> Self {
        Self {
            agent,
            endpoint: endpoint.unwrap_or_else(|| CLOUDINARY_ENDPOINT.to_string()),
            upload_preset: upload_preset.unwrap_or_else(|| CLOUDINARY_DEFAULT_PRESET.to_string()),
        }
    }
}

impl ImageHost for CloudinaryHost {
    fn name(&self) -> &'static str {
        "cloudinary"
    }

    fn upload(&self, jpeg: &[u8], file_name: &str) -> Result<String> {
        let mut form = MultipartForm::new();
        form.text("upload_preset", &self.upload_preset);
        form.file("file", file_name, "image/jpeg", jpeg);
        let (content_type, body) = form.finish();

        let response = self
            .agent
            .post(&self.endpoint)
            .set("Content-Type", &content_type)
            .send_bytes(&body)
            .context("cloudinary upload request")?;
        let value: serde_json::Value = response.into_json().context("cloudinary response body")?;
        value["secure_url"]
            .as_str()
            .or_else(|| value["url"].as_str())
            .map(|url| url.to_string())
            .ok_or_else(|| anyhow!("cloudinary response missing secure_url"))
    }
}

/// Ordered provider chain. Providers are tried front to back with the same
/// request timeout; the first accepted upload wins and later providers are
/// not contacted.
pub struct UploadChain {
    hosts: Vec<Box<dyn ImageHost>>,
}

impl UploadChain {
    pub fn new(hosts: Vec<Box<dyn ImageHost>>) -> Self {
        Self { hosts }
    }

    pub fn from_config(settings: &UploadSettings, agent: ureq::Agent) -> Result<Self> {
        let mut hosts: Vec<Box<dyn ImageHost>> = Vec::with_capacity(settings.providers.len());
        for provider in &settings.providers {
            match provider.kind.as_str() {
                "imgbb" => {
                    let api_key = provider
                        .api_key
                        .clone()
                        .ok_or_else(|| anyhow!("imgbb provider requires api_key"))?;
                    hosts.push(Box::new(ImgbbHost::new(
                        agent.clone(),
                        api_key,
                        provider.endpoint.clone(),
                    )));
                }
                "cloudinary" => {
                    hosts.push(Box::new(CloudinaryHost::new(
                        agent.clone(),
                        provider.endpoint.clone(),
                        provider.upload_preset.clone(),
                    )));
                }
                other => return Err(anyhow!("unknown upload provider kind '{}'", other)),
            }
        }
        Ok(Self { hosts })
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Try every provider in order. Returns the hosted URL on the first
    /// success, `None` when no provider accepted the image. Never errors;
    /// a text-only alert is the degraded path.
    pub fn upload(&self, snapshot: &Path) -> Option<String> {
        if self.hosts.is_empty() {
            log::debug!("no upload providers configured; alert goes out text-only");
            return None;
        }
        let bytes = match std::fs::read(snapshot) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("could not read snapshot {}: {}", snapshot.display(), e);
                return None;
            }
        };
        let file_name = snapshot
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("snapshot.jpg");

        for host in &self.hosts {
            match host.upload(&bytes, file_name) {
                Ok(url) => {
                    log::info!("snapshot hosted by {}: {}", host.name(), url);
                    return Some(url);
                }
                Err(e) => log::warn!("{} upload failed: {:#}", host.name(), e),
            }
        }
        log::warn!("all upload providers failed; alert goes out text-only");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    struct ScriptedHost {
        label: &'static str,
        url: Option<&'static str>,
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    impl ImageHost for ScriptedHost {
        fn name(&self) -> &'static str {
            self.label
        }

        fn upload(&self, _jpeg: &[u8], _file_name: &str) -> Result<String> {
            self.calls.lock().unwrap().push(self.label);
            match self.url {
                Some(url) => Ok(url.to_string()),
                None => Err(anyhow!("provider rejected upload")),
            }
        }
    }

    fn chain(
        entries: &[(&'static str, Option<&'static str>)],
    ) -> (UploadChain, Arc<Mutex<Vec<&'static str>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let hosts = entries
            .iter()
            .map(|&(label, url)| {
                Box::new(ScriptedHost {
                    label,
                    url,
                    calls: Arc::clone(&calls),
                }) as Box<dyn ImageHost>
            })
            .collect();
        (UploadChain::new(hosts), calls)
    }

    fn snapshot_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0xFF, 0xD8, 0xFF, 0xD9]).unwrap();
        file
    }

    #[test]
    fn first_success_short_circuits() {
        let (chain, calls) = chain(&[
            ("primary", Some("https://img.example/a.jpg")),
            ("secondary", Some("https://img.example/b.jpg")),
        ]);
        let file = snapshot_file();

        let url = chain.upload(file.path());
        assert_eq!(url.as_deref(), Some("https://img.example/a.jpg"));
        assert_eq!(*calls.lock().unwrap(), vec!["primary"]);
    }

    #[test]
    fn failure_falls_through_in_order() {
        let (chain, calls) = chain(&[
            ("primary", None),
            ("secondary", Some("https://img.example/b.jpg")),
        ]);
        let file = snapshot_file();

        let url = chain.upload(file.path());
        assert_eq!(url.as_deref(), Some("https://img.example/b.jpg"));
        assert_eq!(*calls.lock().unwrap(), vec!["primary", "secondary"]);
    }

    #[test]
    fn all_failures_yield_none() {
        let (chain, calls) = chain(&[("primary", None), ("secondary", None)]);
        let file = snapshot_file();

        assert!(chain.upload(file.path()).is_none());
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn empty_chain_skips_file_read() {
        let chain = UploadChain::new(Vec::new());
        assert!(chain
            .upload(Path::new("/nonexistent/never-read.jpg"))
            .is_none());
    }

    #[test]
    fn unreadable_snapshot_contacts_no_provider() {
        let (chain, calls) = chain(&[("primary", Some("https://img.example/a.jpg"))]);
        assert!(chain.upload(Path::new("/nonexistent/gone.jpg")).is_none());
        assert!(calls.lock().unwrap().is_empty());
    }
}
