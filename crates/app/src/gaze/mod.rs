//! Per-frame gaze estimation pipeline: camera frames in, normalized
//! mirror-corrected gaze points out.
//!
//! The module is split into focused submodules:
//! - `config`: CLI configuration parsing.
//! - `pipeline`: State machine orchestrating admission → detection → emit.
//! - `estimator`: Face selection and landmark-to-point reduction.
//! - `emitter`: Sink registry and wire-level payload encoding.
//! - `watchdog`: Heartbeat staleness monitoring for the running pipeline.
//! - `data`: Gaze point record shared between stages.

pub use config::GazeConfig;
pub use data::GazePoint;
pub use emitter::{EventSink, GazeEmitter, JsonLineSink};
pub use pipeline::{GazePipeline, PipelineState, StartCallback, run};

mod config;
mod data;
mod emitter;
mod estimator;
mod pipeline;
mod watchdog;

use anyhow::Result;

/// Parse `track` subcommand arguments and run the demo pipeline.
pub fn run_from_args(args: &[String]) -> Result<()> {
    let config = GazeConfig::from_args(args)?;
    run(config)
}
