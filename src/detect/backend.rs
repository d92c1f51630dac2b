use anyhow::Result;

use crate::detect::result::BoundingBox;

/// COCO class id for "person", the only class this pipeline acts on.
pub const PERSON_CLASS_ID: u32 = 0;

/// One raw model detection before class filtering and thresholding.
#[derive(Clone, Debug)]
pub struct ModelOutput {
    pub class_id: u32,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Detection model boundary.
///
/// The pipeline treats the model as a black box: one frame in, raw
/// detections out. No batching, no caching; any state (weights, sessions)
/// belongs to the implementation.
pub trait ModelBackend: Send {
    /// Backend identifier for logs.
    fn name(&self) -> &'static str;

    /// Run the model on one tightly packed RGB8 frame.
    ///
    /// Returns every raw detection; person filtering and confidence
    /// thresholding happen in the adapter.
    fn infer(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<ModelOutput>>;

    /// Optional warm-up hook, called once before the first frame.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
