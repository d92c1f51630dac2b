mod adapter;
mod backend;
mod backends;
mod result;

pub use adapter::{annotate, PersonDetector};
pub use backend::{ModelBackend, ModelOutput, PERSON_CLASS_ID};
pub use backends::{backend_for, ScriptedBackend};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use result::{BoundingBox, Detection, DetectionEvent};
