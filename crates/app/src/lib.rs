//! Gaze estimation pipeline for accessibility frontends.
//!
//! Consumes camera frames one at a time, obtains face candidates from an
//! external detection service, reduces the best face to a normalized,
//! mirror-corrected on-screen point, and forwards validated points to an
//! attached event sink.

pub mod cli;
pub mod gaze;
