//! Deterministic frame source for demos and smoke tests.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use chrono::Utc;
use tracing::debug;

use crate::{
    CaptureError, Frame, FrameConsumer, FrameFormat, FrameLease, FrameSource, LeaseTracker,
    Rotation,
};

/// Background source generating flat BGR8 test frames at a fixed cadence.
///
/// Delivery follows the keep-latest contract: while the consumer still holds
/// the previous lease, new frames are dropped instead of queued. The shade of
/// each frame advances with its sequence number so consumers can tell frames
/// apart.
pub struct SyntheticSource {
    width: i32,
    height: i32,
    interval: Duration,
    running: Arc<AtomicBool>,
    tracker: Arc<LeaseTracker>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl SyntheticSource {
    pub fn new(width: i32, height: i32, fps: u32) -> Self {
        let fps = fps.max(1);
        Self {
            width,
            height,
            interval: Duration::from_millis(1_000 / u64::from(fps)),
            running: Arc::new(AtomicBool::new(false)),
            tracker: LeaseTracker::new(),
            worker: Mutex::new(None),
        }
    }

    /// Lease accounting shared with the delivery thread, exposed so callers
    /// can assert release behaviour.
    pub fn tracker(&self) -> Arc<LeaseTracker> {
        self.tracker.clone()
    }
}

impl FrameSource for SyntheticSource {
    fn subscribe(&self, consumer: FrameConsumer) -> Result<(), CaptureError> {
        let mut slot = match self.worker.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if slot.is_some() {
            return Err(CaptureError::AlreadySubscribed);
        }
        if self.width <= 0 || self.height <= 0 {
            return Err(CaptureError::Open {
                uri: format!("synthetic:{}x{}", self.width, self.height),
            });
        }

        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();
        let tracker = self.tracker.clone();
        let (width, height) = (self.width, self.height);
        let interval = self.interval;

        let handle = thread::Builder::new()
            .name("frame-synthetic".into())
            .spawn(move || {
                let mut sequence: u64 = 0;
                while running.load(Ordering::Relaxed) {
                    thread::sleep(interval);
                    if !running.load(Ordering::Relaxed) {
                        break;
                    }
                    if tracker.outstanding() > 0 {
                        metrics::counter!("gaze_frames_dropped_total").increment(1);
                        debug!(sequence, "consumer busy, dropping synthetic frame");
                        sequence = sequence.wrapping_add(1);
                        continue;
                    }
                    let shade = (sequence % 256) as u8;
                    let data: Arc<[u8]> = vec![shade; (width * height * 3) as usize].into();
                    let frame = Frame {
                        data,
                        width,
                        height,
                        rotation: Rotation::Deg0,
                        timestamp_ms: Utc::now().timestamp_millis(),
                        format: FrameFormat::Bgr8,
                    };
                    consumer(FrameLease::new(frame, tracker.clone()));
                    sequence = sequence.wrapping_add(1);
                }
            })
            .map_err(|err| CaptureError::Other(err.into()))?;

        *slot = Some(handle);
        Ok(())
    }

    fn unsubscribe(&self) {
        self.running.store(false, Ordering::SeqCst);
        let handle = match self.worker.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    #[test]
    fn delivers_frames_to_subscribed_consumer() {
        let source = SyntheticSource::new(32, 24, 200);
        let (tx, rx) = mpsc::channel();
        let consumer: FrameConsumer = Arc::new(move |lease: FrameLease| {
            let _ = tx.send((lease.frame().width, lease.frame().height));
        });

        source.subscribe(consumer).unwrap();
        let (width, height) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        source.unsubscribe();

        assert_eq!((width, height), (32, 24));
        assert_eq!(source.tracker().outstanding(), 0);
    }

    #[test]
    fn keeps_at_most_one_lease_outstanding() {
        let source = SyntheticSource::new(16, 16, 200);
        let tracker = source.tracker();
        let (tx, rx) = mpsc::channel();
        let consumer: FrameConsumer = Arc::new(move |lease: FrameLease| {
            // Park the lease with the test so the source sees a busy consumer.
            let _ = tx.send(lease);
        });

        source.subscribe(consumer).unwrap();
        let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();

        // Several delivery intervals pass while the first lease is held; the
        // source must drop frames rather than stack leases.
        thread::sleep(Duration::from_millis(100));
        assert_eq!(tracker.outstanding(), 1);
        assert!(rx.try_recv().is_err());

        drop(first);
        let second = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        drop(second);
        source.unsubscribe();
        assert_eq!(tracker.outstanding(), 0);
    }

    #[test]
    fn rejects_second_subscription() {
        let source = SyntheticSource::new(16, 16, 30);
        let consumer: FrameConsumer = Arc::new(|_lease| {});
        source.subscribe(consumer.clone()).unwrap();
        assert!(matches!(
            source.subscribe(consumer),
            Err(CaptureError::AlreadySubscribed)
        ));
        source.unsubscribe();
    }

    #[test]
    fn rejects_degenerate_dimensions() {
        let source = SyntheticSource::new(0, 480, 30);
        let consumer: FrameConsumer = Arc::new(|_lease| {});
        assert!(matches!(
            source.subscribe(consumer),
            Err(CaptureError::Open { .. })
        ));
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let source = SyntheticSource::new(16, 16, 30);
        source.unsubscribe();
        let consumer: FrameConsumer = Arc::new(|_lease| {});
        source.subscribe(consumer).unwrap();
        source.unsubscribe();
        source.unsubscribe();
    }
}
