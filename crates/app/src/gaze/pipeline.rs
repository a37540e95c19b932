//! Pipeline state machine tying together frame admission, detection, and
//! event emission.
//!
//! One dedicated worker thread per pipeline instance services frame
//! admissions and detection completions through an event channel. Source and
//! detector callbacks only flip atomics and enqueue; the worker owns the
//! in-flight lease and runs the estimator. Admission is guarded by a
//! compare-and-swap on the in-flight flag, so at most one frame is admitted
//! and unreleased at any instant regardless of which threads the platform
//! callbacks arrive on.

use std::{
    sync::{
        Arc, Mutex, Once,
        atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{Result, bail};
use chrono::Utc;
use crossbeam_channel::{Receiver, Sender};
use face_detect::{DetectionOutcome, DetectionRequest, DetectionService, ScriptedDetector};
use frame_ingest::{FrameConsumer, FrameLease, FrameSource, SyntheticSource};
use tracing::{debug, error, info, warn};

use crate::gaze::{
    config::GazeConfig,
    data::GazePoint,
    emitter::{EventSink, GazeEmitter, JsonLineSink},
    estimator,
    watchdog::{HealthComponent, PipelineHealth, spawn_watchdog},
};

/// Lifecycle of a pipeline instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PipelineState {
    Idle = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
}

impl PipelineState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => PipelineState::Starting,
            2 => PipelineState::Running,
            3 => PipelineState::Stopping,
            _ => PipelineState::Idle,
        }
    }
}

/// Start completion callback. Invoked exactly once per `start` call.
pub type StartCallback = Box<dyn FnOnce(bool) + Send + 'static>;

enum WorkerEvent {
    Frame(FrameLease),
    DetectionDone {
        generation: u64,
        outcome: DetectionOutcome,
    },
    Shutdown,
}

/// State shared between the control surface, the worker thread, and the
/// platform callbacks.
struct PipelineShared {
    state: AtomicU8,
    /// Bumped on every stop; completions carrying an older value are stale.
    generation: AtomicU64,
    in_flight: AtomicBool,
    mirror: bool,
    emitter: GazeEmitter,
}

impl PipelineShared {
    fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: PipelineState) {
        self.state.store(state as u8, Ordering::SeqCst);
        metrics::gauge!("gaze_pipeline_state").set(f64::from(state as u8));
        debug!("pipeline state: {state:?}");
    }
}

struct WorkerSlot {
    tx: Option<Sender<WorkerEvent>>,
    handle: Option<thread::JoinHandle<()>>,
}

/// Per-frame gaze estimation pipeline.
///
/// Constructed once with its frame source and detection service; `start` and
/// `stop` are idempotent and may be called from any thread. Sink attachment
/// is independent of the lifecycle.
pub struct GazePipeline {
    shared: Arc<PipelineShared>,
    source: Arc<dyn FrameSource>,
    detector: Arc<dyn DetectionService>,
    control: Mutex<WorkerSlot>,
}

impl GazePipeline {
    pub fn new(
        config: &GazeConfig,
        source: Arc<dyn FrameSource>,
        detector: Arc<dyn DetectionService>,
    ) -> Self {
        Self {
            shared: Arc::new(PipelineShared {
                state: AtomicU8::new(PipelineState::Idle as u8),
                generation: AtomicU64::new(0),
                in_flight: AtomicBool::new(false),
                mirror: config.mirror,
                emitter: GazeEmitter::new(),
            }),
            source,
            detector,
            control: Mutex::new(WorkerSlot {
                tx: None,
                handle: None,
            }),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.shared.state()
    }

    pub fn attach_sink(&self, sink: Arc<dyn EventSink>) {
        self.shared.emitter.attach(sink);
    }

    pub fn detach_sink(&self) {
        self.shared.emitter.detach();
    }

    /// Begin asynchronous acquisition of the frame source and detection
    /// service. `on_started` fires exactly once with the outcome; a start
    /// while already `Starting`/`Running` reports `true` immediately without
    /// a second acquisition. The callback runs on the pipeline worker (or
    /// inline for the already-active case) and must not call back into
    /// `start`/`stop`.
    pub fn start(&self, headless: bool, on_started: StartCallback) {
        let mut slot = lock_control(&self.control);

        match self.shared.state() {
            PipelineState::Starting | PipelineState::Running => {
                debug!("start ignored, pipeline already active");
                on_started(true);
                return;
            }
            _ => {}
        }

        // A failed start leaves a finished worker behind; reap it.
        if let Some(handle) = slot.handle.take() {
            let _ = handle.join();
        }
        slot.tx = None;

        self.shared.set_state(PipelineState::Starting);

        let (tx, rx) = crossbeam_channel::unbounded::<WorkerEvent>();
        let shared = self.shared.clone();
        let source = self.source.clone();
        let detector = self.detector.clone();
        let health = Arc::new(PipelineHealth::new());
        let consumer = frame_consumer(shared.clone(), tx.clone(), health.clone());
        let worker_tx = tx.clone();

        let handle = thread::Builder::new()
            .name("gaze-pipeline".into())
            .spawn(move || {
                worker_loop(
                    shared, source, detector, health, rx, worker_tx, consumer, headless,
                    on_started,
                )
            })
            .expect("failed to spawn gaze pipeline worker");

        slot.tx = Some(tx);
        slot.handle = Some(handle);
    }

    /// Tear the pipeline down and return to `Idle`. A no-op when already
    /// idle. Safe to call concurrently with an in-flight detection: the
    /// generation bump makes any late completion stale, and teardown releases
    /// the parked frame itself.
    pub fn stop(&self) {
        let mut slot = lock_control(&self.control);

        match self.shared.state() {
            PipelineState::Idle => {
                if let Some(handle) = slot.handle.take() {
                    let _ = handle.join();
                }
                slot.tx = None;
                debug!("stop ignored, pipeline idle");
                return;
            }
            PipelineState::Stopping => return,
            _ => {}
        }

        self.shared.set_state(PipelineState::Stopping);
        self.shared.generation.fetch_add(1, Ordering::AcqRel);

        // Every teardown step runs even if an earlier one misbehaves.
        if let Some(tx) = slot.tx.take() {
            let _ = tx.send(WorkerEvent::Shutdown);
        }
        if let Some(handle) = slot.handle.take() {
            if handle.join().is_err() {
                error!("gaze pipeline worker panicked during shutdown");
            }
        }
        self.source.unsubscribe();
        self.detector.close();
        self.shared.in_flight.store(false, Ordering::Release);
        self.shared.set_state(PipelineState::Idle);
    }
}

impl Drop for GazePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock_control(control: &Mutex<WorkerSlot>) -> std::sync::MutexGuard<'_, WorkerSlot> {
    match control.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Build the delivery callback handed to the frame source.
///
/// Runs on the source's thread: it only checks state, claims the in-flight
/// slot, and enqueues. A frame that loses the compare-and-swap is dropped on
/// the spot, which releases its lease — keep-latest, never queued.
fn frame_consumer(
    shared: Arc<PipelineShared>,
    tx: Sender<WorkerEvent>,
    health: Arc<PipelineHealth>,
) -> FrameConsumer {
    Arc::new(move |lease: FrameLease| {
        if shared.state() != PipelineState::Running {
            return;
        }
        if shared
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            metrics::counter!("gaze_frames_dropped_total").increment(1);
            return;
        }
        metrics::counter!("gaze_frames_admitted_total").increment(1);
        health.beat(HealthComponent::Capture);
        if tx.send(WorkerEvent::Frame(lease)).is_err() {
            shared.in_flight.store(false, Ordering::Release);
        }
    })
}

fn worker_loop(
    shared: Arc<PipelineShared>,
    source: Arc<dyn FrameSource>,
    detector: Arc<dyn DetectionService>,
    health: Arc<PipelineHealth>,
    rx: Receiver<WorkerEvent>,
    tx: Sender<WorkerEvent>,
    consumer: FrameConsumer,
    headless: bool,
    on_started: StartCallback,
) {
    if let Err(err) = source.subscribe(consumer) {
        error!("failed to acquire frame source: {err}");
        shared.set_state(PipelineState::Idle);
        on_started(false);
        return;
    }
    if !headless {
        info!("preview surface attached alongside the analysis path");
    }

    // stop() may have raced the acquisition; in that case the subscription is
    // already being torn down and this start is reported as failed.
    if shared
        .state
        .compare_exchange(
            PipelineState::Starting as u8,
            PipelineState::Running as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        )
        .is_err()
    {
        debug!("pipeline stopped during acquisition");
        on_started(false);
        drain_until_shutdown(&rx);
        return;
    }
    metrics::gauge!("gaze_pipeline_state").set(f64::from(PipelineState::Running as u8));
    info!("gaze pipeline running");
    on_started(true);

    let watchdog_running = Arc::new(AtomicBool::new(true));
    let watchdog = spawn_watchdog(health.clone(), watchdog_running.clone());

    let mut parked: Option<FrameLease> = None;
    for event in rx.iter() {
        match event {
            WorkerEvent::Frame(lease) => {
                if shared.state() != PipelineState::Running || parked.is_some() {
                    drop(lease);
                    shared.in_flight.store(false, Ordering::Release);
                    continue;
                }
                let frame = lease.frame();
                let request = DetectionRequest {
                    pixels: frame.data.clone(),
                    width: frame.width,
                    height: frame.height,
                    rotation_degrees: frame.rotation.degrees(),
                };
                let generation = shared.generation.load(Ordering::Acquire);
                let done_tx = tx.clone();
                parked = Some(lease);
                detector.submit(
                    request,
                    Box::new(move |outcome| {
                        let _ = done_tx.send(WorkerEvent::DetectionDone {
                            generation,
                            outcome,
                        });
                    }),
                );
            }
            WorkerEvent::DetectionDone {
                generation,
                outcome,
            } => {
                let lease = parked.take();
                let fresh = generation == shared.generation.load(Ordering::Acquire)
                    && shared.state() == PipelineState::Running;
                if !fresh {
                    debug!("discarding stale detection completion");
                    drop(lease);
                    shared.in_flight.store(false, Ordering::Release);
                    continue;
                }
                let lease = match lease {
                    Some(lease) => lease,
                    None => {
                        shared.in_flight.store(false, Ordering::Release);
                        continue;
                    }
                };

                let frame = lease.frame();
                let timestamp_ms = Utc::now().timestamp_millis();
                let point = match outcome {
                    Ok(candidates) => estimator::estimate(
                        frame.width,
                        frame.height,
                        &candidates,
                        shared.mirror,
                        timestamp_ms,
                    ),
                    Err(err) => {
                        warn!("face detection failed: {err}");
                        metrics::counter!("gaze_detection_failures_total").increment(1);
                        GazePoint::no_gaze(timestamp_ms)
                    }
                };
                health.beat(HealthComponent::Detection);
                shared.emitter.publish(point);

                // Release before opening the in-flight slot so a new frame is
                // never admitted while this one is still owned.
                drop(lease);
                shared.in_flight.store(false, Ordering::Release);
            }
            WorkerEvent::Shutdown => break,
        }
    }

    // Anything still parked belongs to a cancelled cycle; release it here.
    parked.take();
    watchdog_running.store(false, Ordering::SeqCst);
    let _ = watchdog.join();
}

fn drain_until_shutdown(rx: &Receiver<WorkerEvent>) {
    for event in rx.iter() {
        if matches!(event, WorkerEvent::Shutdown) {
            break;
        }
    }
}

/// Run the demo pipeline until Ctrl+C or the configured duration elapses.
pub fn run(config: GazeConfig) -> Result<()> {
    static CTRL_HANDLER: Once = Once::new();

    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_shutdown = shutdown.clone();
    CTRL_HANDLER.call_once(move || {
        if let Err(err) = ctrlc::set_handler(move || {
            handler_shutdown.store(true, Ordering::SeqCst);
        }) {
            warn!("Failed to install Ctrl+C handler: {err}");
        }
    });

    debug!(
        "starting pipeline: {}x{} @ {} fps (mirror: {}, headless: {})",
        config.width, config.height, config.fps, config.mirror, config.headless
    );

    let source = Arc::new(SyntheticSource::new(
        config.width,
        config.height,
        config.fps,
    ));
    let detector = Arc::new(ScriptedDetector::new());
    let pipeline = GazePipeline::new(&config, source, detector);
    pipeline.attach_sink(Arc::new(JsonLineSink));

    let (ready_tx, ready_rx) = crossbeam_channel::bounded::<bool>(1);
    pipeline.start(
        config.headless,
        Box::new(move |ok| {
            let _ = ready_tx.send(ok);
        }),
    );
    match ready_rx.recv_timeout(Duration::from_secs(10)) {
        Ok(true) => {}
        Ok(false) => bail!("failed to acquire the frame source"),
        Err(_) => bail!("pipeline start did not report readiness"),
    }

    let started_at = Instant::now();
    while !shutdown.load(Ordering::SeqCst) {
        if let Some(limit) = config.duration {
            if started_at.elapsed() >= limit {
                break;
            }
        }
        thread::sleep(Duration::from_millis(50));
    }

    pipeline.stop();
    Ok(())
}
