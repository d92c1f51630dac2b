use std::time::Instant;

/// Axis-aligned box in pixel coordinates, inclusive corners.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BoundingBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl BoundingBox {
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }
}

/// One detected person that survived filtering.
#[derive(Clone, Debug)]
pub struct Detection {
    pub bbox: BoundingBox,
    /// Model confidence in `[0, 1]`.
    pub confidence: f32,
}

/// Outcome of one detection pass over one frame. Produced and consumed
/// within a single loop cycle.
#[derive(Clone, Debug)]
pub struct DetectionEvent {
    pub human_present: bool,
    pub detections: Vec<Detection>,
    pub observed_at: Instant,
}

impl DetectionEvent {
    pub fn empty() -> Self {
        Self {
            human_present: false,
            detections: Vec::new(),
            observed_at: Instant::now(),
        }
    }

    pub fn person_count(&self) -> usize {
        self.detections.len()
    }

    /// Highest confidence among the surviving detections, 0.0 when none.
    pub fn max_confidence(&self) -> f32 {
        self.detections
            .iter()
            .map(|d| d.confidence)
            .fold(0.0, f32::max)
    }

    /// Every surviving confidence, in detection order.
    pub fn confidences(&self) -> Vec<f32> {
        self.detections.iter().map(|d| d.confidence).collect()
    }
}
