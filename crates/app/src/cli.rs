use anyhow::Result;

use crate::gaze;

/// Dispatch a recognised subcommand. Returns `false` when the arguments name
/// no known command so the caller can print usage.
pub fn handle_commands(args: &[String]) -> Result<bool> {
    match args.get(1).map(|s| s.as_str()) {
        Some("track") => {
            gaze::run_from_args(args)?;
            Ok(true)
        }
        Some("track-help") => {
            print_usage();
            Ok(true)
        }
        _ => Ok(false),
    }
}

pub fn print_usage() {
    println!("{}", gaze::GazeConfig::usage());
}
