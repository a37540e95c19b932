use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use tracing::warn;

pub(crate) const WATCHDOG_POLL_INTERVAL_MS: u64 = 500;
pub(crate) const WATCHDOG_STALE_THRESHOLD_MS: u64 = 2_000;
pub(crate) const WATCHDOG_STARTUP_GRACE_MS: u64 = 5_000;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum HealthComponent {
    Capture,
    Detection,
}

impl HealthComponent {
    pub(crate) fn label(self) -> &'static str {
        match self {
            HealthComponent::Capture => "capture",
            HealthComponent::Detection => "detection",
        }
    }
}

/// Heartbeats for the two asynchronous stages feeding the pipeline.
pub(crate) struct PipelineHealth {
    capture: AtomicU64,
    detection: AtomicU64,
}

impl PipelineHealth {
    pub(crate) fn new() -> Self {
        let grace_deadline = current_millis().saturating_add(WATCHDOG_STARTUP_GRACE_MS);
        Self {
            capture: AtomicU64::new(grace_deadline),
            detection: AtomicU64::new(grace_deadline),
        }
    }

    pub(crate) fn beat(&self, component: HealthComponent) {
        let now = current_millis();
        match component {
            HealthComponent::Capture => self.capture.store(now, Ordering::Relaxed),
            HealthComponent::Detection => self.detection.store(now, Ordering::Relaxed),
        }
    }

    pub(crate) fn stale_component(&self, now: u64) -> Option<HealthComponent> {
        if now.saturating_sub(self.capture.load(Ordering::Relaxed)) > WATCHDOG_STALE_THRESHOLD_MS {
            return Some(HealthComponent::Capture);
        }
        if now.saturating_sub(self.detection.load(Ordering::Relaxed))
            > WATCHDOG_STALE_THRESHOLD_MS
        {
            return Some(HealthComponent::Detection);
        }
        None
    }
}

/// Spawn the staleness monitor for a running pipeline.
///
/// The watchdog only observes: a stalled stage is logged and counted, never
/// restarted — the pipeline is designed to degrade to "no valid gaze" rather
/// than halt, and the detection service is trusted to eventually call back.
pub(crate) fn spawn_watchdog(
    health: Arc<PipelineHealth>,
    running: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::Builder::new()
        .name("gaze-watchdog".into())
        .spawn(move || {
            let mut reported: Option<HealthComponent> = None;
            while running.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(WATCHDOG_POLL_INTERVAL_MS));
                let stale = health.stale_component(current_millis());
                if let Some(component) = stale {
                    if reported != Some(component) {
                        warn!(
                            "{} stage silent for more than {}ms",
                            component.label(),
                            WATCHDOG_STALE_THRESHOLD_MS
                        );
                        metrics::counter!("gaze_watchdog_stale_total").increment(1);
                    }
                }
                reported = stale;
            }
        })
        .expect("failed to spawn watchdog thread")
}

fn current_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_health_is_within_grace() {
        let health = PipelineHealth::new();
        assert_eq!(health.stale_component(current_millis()), None);
    }

    #[test]
    fn stale_detection_stage_is_reported() {
        let health = PipelineHealth::new();
        let now = current_millis();
        health.capture.store(now, Ordering::Relaxed);
        health
            .detection
            .store(now - WATCHDOG_STALE_THRESHOLD_MS - 1, Ordering::Relaxed);
        assert_eq!(
            health.stale_component(now),
            Some(HealthComponent::Detection)
        );
    }

    #[test]
    fn fresh_beat_clears_staleness() {
        let health = PipelineHealth::new();
        let now = current_millis();
        health
            .capture
            .store(now - WATCHDOG_STALE_THRESHOLD_MS - 1, Ordering::Relaxed);
        health.detection.store(now, Ordering::Relaxed);
        assert_eq!(health.stale_component(now), Some(HealthComponent::Capture));

        health.beat(HealthComponent::Capture);
        assert_eq!(health.stale_component(current_millis()), None);
    }
}
