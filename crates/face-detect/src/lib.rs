//! Face candidate data model and the asynchronous detection-service contract.
//!
//! Detection backends are black boxes behind [`DetectionService`]: one
//! submission produces exactly one completion callback, on an arbitrary
//! thread, carrying either the candidate list or a [`DetectionError`]. The
//! [`ScriptedDetector`] in `scripted` stands in for a real backend in demos
//! and tests.

mod scripted;

pub use scripted::ScriptedDetector;

use std::sync::Arc;

use thiserror::Error;

/// Pixel-space eye landmark position.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EyePosition {
    pub x: f32,
    pub y: f32,
}

/// Axis-aligned face bounding box in frame pixel space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl BoundingBox {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn center(&self) -> (f32, f32) {
        (
            (self.left + self.right) / 2.0,
            (self.top + self.bottom) / 2.0,
        )
    }

    /// A box is usable when its corners are finite, non-negative, and span a
    /// positive area.
    pub fn is_valid(&self) -> bool {
        let finite = self.left.is_finite()
            && self.top.is_finite()
            && self.right.is_finite()
            && self.bottom.is_finite();
        finite && self.left >= 0.0 && self.top >= 0.0 && self.right > self.left
            && self.bottom > self.top
    }
}

/// Single face returned by a detection backend.
#[derive(Clone, Debug)]
pub struct FaceCandidate {
    pub bounding_box: BoundingBox,
    pub left_eye: Option<EyePosition>,
    pub right_eye: Option<EyePosition>,
    /// Opaque identity assigned by tracking-enabled backends.
    pub tracking_id: i64,
}

#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("detection service is closed")]
    Closed,
    #[error("detection service failure: {reason}")]
    Backend { reason: String },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// One frame's worth of pixels handed to a detection backend.
///
/// Pixel data is shared, not owned: the frame lease stays with the caller and
/// the backend keeps the buffer alive only through this reference count.
#[derive(Clone)]
pub struct DetectionRequest {
    pub pixels: Arc<[u8]>,
    pub width: i32,
    pub height: i32,
    pub rotation_degrees: i32,
}

pub type DetectionOutcome = Result<Vec<FaceCandidate>, DetectionError>;

/// Completion callback for one submission. Invoked exactly once.
pub type CompletionFn = Box<dyn FnOnce(DetectionOutcome) + Send>;

/// Asynchronous detection contract.
///
/// `submit` is fire-and-forget: it must not block on inference, and the
/// completion fires later from whatever thread the backend runs on. `close`
/// releases backend resources and is idempotent; submissions after close
/// complete with [`DetectionError::Closed`].
pub trait DetectionService: Send + Sync {
    fn submit(&self, request: DetectionRequest, on_complete: CompletionFn);
    fn close(&self);
}
