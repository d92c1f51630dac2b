use std::time::Instant;

use anyhow::Result;

use crate::detect::backend::{ModelBackend, PERSON_CLASS_ID};
use crate::detect::result::{Detection, DetectionEvent};
use crate::frame::Frame;

const BOX_THICKNESS: u32 = 2;
const BOX_COLOR: [u8; 3] = [0, 255, 0];

/// Reduces raw model output to "is a person in this frame".
///
/// The confidence threshold is fixed at construction; the detector carries
/// no other state of its own.
pub struct PersonDetector {
    backend: Box<dyn ModelBackend>,
    confidence_threshold: f32,
}

impl PersonDetector {
    pub fn new(backend: Box<dyn ModelBackend>, confidence_threshold: f32) -> Self {
        Self {
            backend,
            confidence_threshold,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn warm_up(&mut self) -> Result<()> {
        self.backend.warm_up()
    }

    /// Run the model once and keep person detections at or above the
    /// threshold. Deterministic given identical model output.
    pub fn detect(&mut self, frame: &Frame) -> Result<DetectionEvent> {
        let outputs = self
            .backend
            .infer(&frame.data, frame.width, frame.height)?;

        let detections: Vec<Detection> = outputs
            .into_iter()
            .filter(|output| output.class_id == PERSON_CLASS_ID)
            .filter(|output| output.confidence >= self.confidence_threshold)
            .map(|output| Detection {
                bbox: output.bbox,
                confidence: output.confidence,
            })
            .collect();

        Ok(DetectionEvent {
            human_present: !detections.is_empty(),
            detections,
            observed_at: Instant::now(),
        })
    }
}

/// Draw detection boxes into a copy of the frame's pixels.
///
/// Pure with respect to the frame; the annotated buffer feeds the alert
/// snapshot and nothing else reads it.
pub fn annotate(frame: &Frame, detections: &[Detection]) -> Vec<u8> {
    let mut pixels = frame.data.clone();
    for detection in detections {
        draw_rect(
            &mut pixels,
            frame.width,
            frame.height,
            detection.bbox.x1,
            detection.bbox.y1,
            detection.bbox.x2,
            detection.bbox.y2,
        );
    }
    pixels
}

fn draw_rect(pixels: &mut [u8], width: u32, height: u32, x1: u32, y1: u32, x2: u32, y2: u32) {
    let x1 = x1.min(width.saturating_sub(1));
    let y1 = y1.min(height.saturating_sub(1));
    let x2 = x2.min(width.saturating_sub(1));
    let y2 = y2.min(height.saturating_sub(1));
    if x2 <= x1 || y2 <= y1 {
        return;
    }

    for t in 0..BOX_THICKNESS {
        // Horizontal edges.
        for x in x1..=x2 {
            put_pixel(pixels, width, x, y1.saturating_add(t).min(y2));
            put_pixel(pixels, width, x, y2.saturating_sub(t).max(y1));
        }
        // Vertical edges.
        for y in y1..=y2 {
            put_pixel(pixels, width, x1.saturating_add(t).min(x2), y);
            put_pixel(pixels, width, x2.saturating_sub(t).max(x1), y);
        }
    }
}

fn put_pixel(pixels: &mut [u8], width: u32, x: u32, y: u32) {
    let offset = ((y as usize) * (width as usize) + (x as usize)) * 3;
    if offset + 2 < pixels.len() {
        pixels[offset..offset + 3].copy_from_slice(&BOX_COLOR);
    }
}
