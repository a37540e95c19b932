//! Stand-in detection backend for demos and smoke tests.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tracing::debug;

use crate::{
    BoundingBox, CompletionFn, DetectionError, DetectionRequest, DetectionService, EyePosition,
    FaceCandidate,
};

/// Deterministic detector that synthesises a single face sweeping the frame
/// in a slow circle, eye landmarks included.
///
/// Completions fire synchronously on the submitting thread; real backends
/// complete from their own inference threads, which callers must already
/// tolerate.
pub struct ScriptedDetector {
    sequence: AtomicU64,
    closed: AtomicBool,
}

impl ScriptedDetector {
    pub fn new() -> Self {
        Self {
            sequence: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }
}

impl Default for ScriptedDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectionService for ScriptedDetector {
    fn submit(&self, request: DetectionRequest, on_complete: CompletionFn) {
        if self.closed.load(Ordering::SeqCst) {
            on_complete(Err(DetectionError::Closed));
            return;
        }

        let width = request.width as f32;
        let height = request.height as f32;
        if width <= 0.0 || height <= 0.0 {
            on_complete(Ok(Vec::new()));
            return;
        }

        let t = self.sequence.fetch_add(1, Ordering::SeqCst) as f32 * 0.05;
        let cx = width / 2.0 + t.cos() * width * 0.25;
        let cy = height / 2.0 + t.sin() * height * 0.25;
        let half = (width.min(height) * 0.15).max(1.0);

        let bounding_box = BoundingBox::new(
            (cx - half).clamp(0.0, width - 1.0),
            (cy - half).clamp(0.0, height - 1.0),
            (cx + half).clamp(1.0, width),
            (cy + half).clamp(1.0, height),
        );
        let eye_dy = half * 0.2;
        let eye_dx = half * 0.4;
        let candidate = FaceCandidate {
            bounding_box,
            left_eye: Some(EyePosition {
                x: cx - eye_dx,
                y: cy - eye_dy,
            }),
            right_eye: Some(EyePosition {
                x: cx + eye_dx,
                y: cy - eye_dy,
            }),
            tracking_id: 0,
        };
        debug!(
            cx,
            cy,
            "scripted detector produced candidate (area {:.1})",
            bounding_box.area()
        );
        on_complete(Ok(vec![candidate]));
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
