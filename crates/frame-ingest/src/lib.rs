//! Frame acquisition layer shared by the gaze pipeline and its tests.
//!
//! The crate defines the data model for camera frames ([`Frame`]), the
//! release-exactly-once lease accounting ([`FrameLease`] / [`LeaseTracker`]),
//! and the [`FrameSource`] subscription contract that every capture backend
//! implements. A deterministic [`SyntheticSource`] used by the demo binary
//! and smoke tests lives in `synthetic`.

mod synthetic;

pub use synthetic::SyntheticSource;

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use thiserror::Error;

/// Raw frame captured from a video source.
///
/// Pixel data is reference counted so detection backends can keep reading it
/// after the owning lease has been released back to the source.
#[derive(Clone)]
pub struct Frame {
    pub data: Arc<[u8]>,
    pub width: i32,
    pub height: i32,
    pub rotation: Rotation,
    pub timestamp_ms: i64,
    pub format: FrameFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    Bgr8,
}

/// Sensor-to-display rotation carried alongside each frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rotation {
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Parse a rotation from degrees. Only the four right angles are valid.
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Rotation::Deg0),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }

    pub fn degrees(self) -> i32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open video source {uri:?}")]
    Open { uri: String },
    #[error("a consumer is already subscribed to this source")]
    AlreadySubscribed,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Callback invoked with each delivered frame lease.
pub type FrameConsumer = Arc<dyn Fn(FrameLease) + Send + Sync>;

/// Subscription contract implemented by capture backends.
///
/// Sources deliver leases to a single registered consumer, one at a time,
/// under keep-latest backpressure: while a previously delivered lease is
/// still outstanding, newer frames are dropped, never queued. Deliveries for
/// one subscription never overlap.
pub trait FrameSource: Send + Sync {
    fn subscribe(&self, consumer: FrameConsumer) -> Result<(), CaptureError>;

    /// Stop delivering frames. Idempotent; safe to call while a lease is
    /// still outstanding.
    fn unsubscribe(&self);
}

/// Shared accounting for leases handed out by a source.
///
/// `outstanding` is the number of frames currently owned by the consumer;
/// sources use it to apply keep-latest backpressure, tests use it to assert
/// that every admitted frame was released exactly once.
#[derive(Default)]
pub struct LeaseTracker {
    outstanding: AtomicUsize,
    released: AtomicUsize,
}

impl LeaseTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Total number of leases released since the tracker was created.
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    fn acquire(&self) {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Exclusive ownership of one frame for one processing cycle.
///
/// Dropping the lease releases the frame back to its source. Ownership is
/// move-only, so release happens exactly once on every exit path and the
/// frame is never read after release.
pub struct FrameLease {
    frame: Frame,
    tracker: Arc<LeaseTracker>,
}

impl FrameLease {
    pub fn new(frame: Frame, tracker: Arc<LeaseTracker>) -> Self {
        tracker.acquire();
        Self { frame, tracker }
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }
}

impl Drop for FrameLease {
    fn drop(&mut self) {
        self.tracker.release();
    }
}
