//! Sink registry and wire-level payload encoding.
//!
//! The emitter owns the only mutable sink reference in the pipeline. Attach
//! and detach are pure registration operations; publishing clones the sink
//! handle out of the slot so a slow sink never blocks frame delivery, and a
//! missing sink silently drops the point.

use std::{
    io::{self, Write},
    sync::{
        Arc, Mutex,
        atomic::{AtomicI64, Ordering},
    },
};

use serde_json::Value;
use tracing::{error, trace};

use crate::gaze::data::GazePoint;

/// Consumer-provided destination for gaze events.
pub trait EventSink: Send + Sync {
    fn on_gaze(&self, payload: &Value);
}

/// Publishes gaze points to the currently attached sink.
///
/// Emitted timestamps are forced monotonic non-decreasing per emitter
/// instance, independent of wall-clock adjustments between frames.
pub struct GazeEmitter {
    sink: Mutex<Option<Arc<dyn EventSink>>>,
    last_timestamp_ms: AtomicI64,
}

impl GazeEmitter {
    pub fn new() -> Self {
        Self {
            sink: Mutex::new(None),
            last_timestamp_ms: AtomicI64::new(i64::MIN),
        }
    }

    pub fn attach(&self, sink: Arc<dyn EventSink>) {
        if let Ok(mut slot) = self.sink.lock() {
            *slot = Some(sink);
        }
    }

    pub fn detach(&self) {
        if let Ok(mut slot) = self.sink.lock() {
            *slot = None;
        }
    }

    /// Serialize the point and forward it to the attached sink, if any.
    pub fn publish(&self, point: GazePoint) {
        let previous = self
            .last_timestamp_ms
            .fetch_max(point.timestamp_ms, Ordering::AcqRel);
        let point = GazePoint {
            timestamp_ms: point.timestamp_ms.max(previous),
            ..point
        };

        let sink = match self.sink.lock() {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        };
        let sink = match sink {
            Some(sink) => sink,
            None => {
                trace!("no sink attached, dropping gaze point");
                return;
            }
        };

        match serde_json::to_value(point) {
            Ok(payload) => {
                sink.on_gaze(&payload);
                metrics::counter!("gaze_points_published_total").increment(1);
            }
            Err(err) => error!("failed to encode gaze payload: {err}"),
        }
    }
}

impl Default for GazeEmitter {
    fn default() -> Self {
        Self::new()
    }
}

/// Sink printing one wire payload per line to stdout. Default sink of the
/// demo binary.
pub struct JsonLineSink;

impl EventSink for JsonLineSink {
    fn on_gaze(&self, payload: &Value) {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        let _ = writeln!(out, "{payload}");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;

    #[derive(Default)]
    struct CollectingSink {
        payloads: StdMutex<Vec<Value>>,
    }

    impl EventSink for CollectingSink {
        fn on_gaze(&self, payload: &Value) {
            self.payloads.lock().unwrap().push(payload.clone());
        }
    }

    fn point(ts: i64) -> GazePoint {
        GazePoint {
            x: 0.25,
            y: 0.5,
            valid: true,
            timestamp_ms: ts,
        }
    }

    #[test]
    fn publish_without_sink_is_silent() {
        let emitter = GazeEmitter::new();
        emitter.publish(point(1));
    }

    #[test]
    fn publish_forwards_wire_payload() {
        let emitter = GazeEmitter::new();
        let sink = Arc::new(CollectingSink::default());
        emitter.attach(sink.clone());
        emitter.publish(point(1_000));

        let payloads = sink.payloads.lock().unwrap();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0]["x"], 0.25);
        assert_eq!(payloads[0]["y"], 0.5);
        assert_eq!(payloads[0]["valid"], true);
        assert_eq!(payloads[0]["ts"], 1_000);
    }

    #[test]
    fn detach_stops_delivery() {
        let emitter = GazeEmitter::new();
        let sink = Arc::new(CollectingSink::default());
        emitter.attach(sink.clone());
        emitter.detach();
        emitter.publish(point(1));
        assert!(sink.payloads.lock().unwrap().is_empty());
    }

    #[test]
    fn timestamps_never_regress() {
        let emitter = GazeEmitter::new();
        let sink = Arc::new(CollectingSink::default());
        emitter.attach(sink.clone());

        emitter.publish(point(2_000));
        // Wall clock stepping backwards between frames must not produce a
        // regressing sequence.
        emitter.publish(point(1_500));
        emitter.publish(point(2_500));

        let payloads = sink.payloads.lock().unwrap();
        let ts: Vec<i64> = payloads.iter().map(|p| p["ts"].as_i64().unwrap()).collect();
        assert_eq!(ts, vec![2_000, 2_000, 2_500]);
    }
}
