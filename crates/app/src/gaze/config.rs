use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};

const TRACK_USAGE: &str = "Usage: gaze-app track [--source synthetic] [--width <px>] \
[--height <px>] [--fps <n>] [--no-mirror] [--preview] [--duration <secs>]\n\n\
Runs the gaze pipeline against the synthetic frame source and prints wire \
payloads as JSON lines. Camera capture is provided by the embedding platform \
and is not part of this binary.";

/// Runtime configuration for one pipeline instance.
#[derive(Clone, Debug)]
pub struct GazeConfig {
    pub source: String,
    pub width: i32,
    pub height: i32,
    /// Cadence of the synthetic source, frames per second.
    pub fps: u32,
    /// Horizontal flip for front-facing sources. On by default.
    pub mirror: bool,
    /// When false, a live preview surface is attached alongside the analysis
    /// path. Has no effect on estimator output.
    pub headless: bool,
    /// Stop the demo loop after this long; `None` runs until Ctrl+C.
    pub duration: Option<Duration>,
}

impl Default for GazeConfig {
    fn default() -> Self {
        Self {
            source: "synthetic".to_string(),
            width: 640,
            height: 480,
            fps: 30,
            mirror: true,
            headless: true,
            duration: None,
        }
    }
}

impl GazeConfig {
    pub fn usage() -> &'static str {
        TRACK_USAGE
    }

    pub fn from_args(args: &[String]) -> Result<Self> {
        let mut config = Self::default();

        let mut idx = 2;
        while idx < args.len() {
            match args[idx].as_str() {
                "--source" => {
                    idx += 1;
                    config.source = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--source requires a value"))?
                        .clone();
                    idx += 1;
                }
                "--width" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--width requires a value"))?
                        .parse::<i32>()
                        .with_context(|| "--width must be an integer".to_string())?;
                    if value <= 0 {
                        bail!("--width must be a positive integer");
                    }
                    config.width = value;
                    idx += 1;
                }
                "--height" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--height requires a value"))?
                        .parse::<i32>()
                        .with_context(|| "--height must be an integer".to_string())?;
                    if value <= 0 {
                        bail!("--height must be a positive integer");
                    }
                    config.height = value;
                    idx += 1;
                }
                "--fps" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--fps requires a value"))?
                        .parse::<u32>()
                        .with_context(|| "--fps must be a positive integer".to_string())?;
                    if value == 0 {
                        bail!("--fps must be at least 1");
                    }
                    config.fps = value;
                    idx += 1;
                }
                "--no-mirror" => {
                    config.mirror = false;
                    idx += 1;
                }
                "--preview" => {
                    config.headless = false;
                    idx += 1;
                }
                "--duration" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--duration requires a value"))?
                        .parse::<u64>()
                        .with_context(|| "--duration must be a number of seconds".to_string())?;
                    config.duration = Some(Duration::from_secs(value));
                    idx += 1;
                }
                arg => {
                    bail!("Unrecognised argument: {arg}\n\n{TRACK_USAGE}");
                }
            }
        }

        if config.source != "synthetic" {
            bail!(
                "unsupported source {:?}; only the synthetic source is built in",
                config.source
            );
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(parts: &[&str]) -> Vec<String> {
        let mut all = vec!["gaze-app".to_string(), "track".to_string()];
        all.extend(parts.iter().map(|s| s.to_string()));
        all
    }

    #[test]
    fn defaults_match_capture_contract() {
        let config = GazeConfig::from_args(&args(&[])).unwrap();
        assert_eq!(config.width, 640);
        assert_eq!(config.height, 480);
        assert!(config.mirror);
        assert!(config.headless);
        assert_eq!(config.duration, None);
    }

    #[test]
    fn parses_flags() {
        let config = GazeConfig::from_args(&args(&[
            "--width", "320", "--height", "240", "--fps", "15", "--no-mirror", "--preview",
            "--duration", "5",
        ]))
        .unwrap();
        assert_eq!(config.width, 320);
        assert_eq!(config.height, 240);
        assert_eq!(config.fps, 15);
        assert!(!config.mirror);
        assert!(!config.headless);
        assert_eq!(config.duration, Some(Duration::from_secs(5)));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(GazeConfig::from_args(&args(&["--width", "0"])).is_err());
        assert!(GazeConfig::from_args(&args(&["--fps", "0"])).is_err());
        assert!(GazeConfig::from_args(&args(&["--source", "rtsp://cam"])).is_err());
        assert!(GazeConfig::from_args(&args(&["--bogus"])).is_err());
    }
}
