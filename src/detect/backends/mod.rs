pub mod scripted;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use scripted::ScriptedBackend;

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;

use anyhow::{anyhow, Result};

use crate::config::DetectionConfig;
use crate::detect::backend::ModelBackend;

/// Build the configured model backend.
///
/// `width`/`height` are the frame dimensions the model will see; the tract
/// backend shapes its input tensor from them.
pub fn backend_for(
    config: &DetectionConfig,
    width: u32,
    height: u32,
) -> Result<Box<dyn ModelBackend>> {
    let _ = (width, height);
    match config.backend.as_str() {
        "scripted" => Ok(Box::new(ScriptedBackend::intermittent(0.9, 150))),
        #[cfg(feature = "backend-tract")]
        "tract" => {
            let path = config
                .model_path
                .as_ref()
                .ok_or_else(|| anyhow!("detection backend 'tract' requires detection.model_path"))?;
            Ok(Box::new(tract::TractBackend::new(path, width, height)?))
        }
        #[cfg(not(feature = "backend-tract"))]
        "tract" => Err(anyhow!(
            "detection backend 'tract' requires the backend-tract feature"
        )),
        other => Err(anyhow!("unknown detection backend '{}'", other)),
    }
}
