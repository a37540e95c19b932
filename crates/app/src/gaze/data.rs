use serde::Serialize;

/// Normalized on-screen gaze point, origin top-left after mirror correction.
///
/// `x` and `y` are always clamped to [0, 1] before leaving the estimator; no
/// unclamped value ever reaches an event sink. The wire encoding renames
/// `timestamp_ms` to `ts`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct GazePoint {
    pub x: f64,
    pub y: f64,
    pub valid: bool,
    #[serde(rename = "ts")]
    pub timestamp_ms: i64,
}

impl GazePoint {
    /// The explicit no-gaze state: frame centre, marked invalid.
    pub fn no_gaze(timestamp_ms: i64) -> Self {
        Self {
            x: 0.5,
            y: 0.5,
            valid: false,
            timestamp_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_encoding_matches_contract() {
        let point = GazePoint {
            x: 0.25,
            y: 0.75,
            valid: true,
            timestamp_ms: 1_700_000_000_123,
        };
        let value = serde_json::to_value(point).unwrap();
        assert_eq!(value["x"], 0.25);
        assert_eq!(value["y"], 0.75);
        assert_eq!(value["valid"], true);
        assert_eq!(value["ts"], 1_700_000_000_123_i64);
        assert_eq!(value.as_object().unwrap().len(), 4);
    }

    #[test]
    fn no_gaze_is_centred_and_invalid() {
        let point = GazePoint::no_gaze(42);
        assert_eq!(point.x, 0.5);
        assert_eq!(point.y, 0.5);
        assert!(!point.valid);
        assert_eq!(point.timestamp_ms, 42);
    }
}
