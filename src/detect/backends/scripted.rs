use std::collections::VecDeque;

use anyhow::Result;

use crate::detect::backend::{ModelBackend, ModelOutput, PERSON_CLASS_ID};
use crate::detect::result::BoundingBox;

/// Scripted backend for tests and the demo. No model, no I/O; it replays
/// whatever detections it was told to produce.
pub struct ScriptedBackend {
    mode: Mode,
    calls: u64,
}

enum Mode {
    /// Play each entry once, then report nothing.
    Script(VecDeque<Vec<ModelOutput>>),
    /// Never report anything.
    Quiet,
    /// Report one centered person on every frame.
    Person { confidence: f32 },
    /// Report a person for a short burst of frames once per `period` calls.
    Intermittent { confidence: f32, period: u64 },
}

/// Burst length for the intermittent mode, in consecutive frames.
const APPEARANCE_FRAMES: u64 = 8;

impl ScriptedBackend {
    pub fn with_script(script: Vec<Vec<ModelOutput>>) -> Self {
        Self {
            mode: Mode::Script(script.into()),
            calls: 0,
        }
    }

    pub fn quiet() -> Self {
        Self {
            mode: Mode::Quiet,
            calls: 0,
        }
    }

    pub fn person(confidence: f32) -> Self {
        Self {
            mode: Mode::Person { confidence },
            calls: 0,
        }
    }

    pub fn intermittent(confidence: f32, period: u64) -> Self {
        Self {
            mode: Mode::Intermittent {
                confidence,
                period: period.max(1),
            },
            calls: 0,
        }
    }
}

impl ModelBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn infer(&mut self, _pixels: &[u8], width: u32, height: u32) -> Result<Vec<ModelOutput>> {
        let call = self.calls;
        self.calls += 1;
        match &mut self.mode {
            Mode::Script(script) => Ok(script.pop_front().unwrap_or_default()),
            Mode::Quiet => Ok(Vec::new()),
            Mode::Person { confidence } => Ok(vec![centered_person(*confidence, width, height)]),
            Mode::Intermittent { confidence, period } => {
                if call % *period < APPEARANCE_FRAMES {
                    Ok(vec![centered_person(*confidence, width, height)])
                } else {
                    Ok(Vec::new())
                }
            }
        }
    }
}

/// A person-shaped box in the middle of the frame.
pub fn centered_person(confidence: f32, width: u32, height: u32) -> ModelOutput {
    ModelOutput {
        class_id: PERSON_CLASS_ID,
        confidence,
        bbox: BoundingBox::new(width / 4, height / 6, width * 3 / 4, height * 5 / 6),
    }
}
