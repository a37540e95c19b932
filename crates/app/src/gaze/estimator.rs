//! Face selection and landmark-to-point reduction.
//!
//! Pure per-frame arithmetic: pick the best face candidate, reduce it to a
//! pixel anchor, normalize against the frame dimensions, mirror-correct for
//! a front-facing camera, and clamp. Every degenerate input degrades to the
//! explicit no-gaze result rather than propagating bad numbers.

use face_detect::FaceCandidate;
use tracing::trace;

use crate::gaze::data::GazePoint;

/// Reduce one frame's candidates to a gaze point.
///
/// Selection picks the candidate with the largest bounding-box area, ties
/// resolved by first-seen order; candidates with unusable boxes are skipped.
/// The anchor is the midpoint of the two eye landmarks when both are
/// present, otherwise the bounding-box centre.
pub(crate) fn estimate(
    width: i32,
    height: i32,
    candidates: &[FaceCandidate],
    mirror: bool,
    timestamp_ms: i64,
) -> GazePoint {
    let selected = match select_candidate(candidates) {
        Some(candidate) => candidate,
        None => return GazePoint::no_gaze(timestamp_ms),
    };

    // Zero-sized frames would turn the division below into inf/NaN.
    if width <= 0 || height <= 0 {
        return GazePoint::no_gaze(timestamp_ms);
    }

    let (anchor_x, anchor_y) = anchor(selected);
    let mut nx = f64::from(anchor_x) / f64::from(width);
    let ny = f64::from(anchor_y) / f64::from(height);
    if !nx.is_finite() || !ny.is_finite() {
        return GazePoint::no_gaze(timestamp_ms);
    }

    if mirror {
        nx = 1.0 - nx;
    }

    trace!(
        track = selected.tracking_id,
        nx,
        ny,
        "anchored candidate at ({anchor_x:.1}, {anchor_y:.1})"
    );

    GazePoint {
        x: nx.clamp(0.0, 1.0),
        y: ny.clamp(0.0, 1.0),
        valid: true,
        timestamp_ms,
    }
}

/// Largest-area selection over usable candidates, first seen wins ties.
fn select_candidate(candidates: &[FaceCandidate]) -> Option<&FaceCandidate> {
    let mut best: Option<(&FaceCandidate, f32)> = None;
    for candidate in candidates {
        if !candidate.bounding_box.is_valid() {
            continue;
        }
        let area = candidate.bounding_box.area();
        match best {
            Some((_, best_area)) if area <= best_area => {}
            _ => best = Some((candidate, area)),
        }
    }
    best.map(|(candidate, _)| candidate)
}

fn anchor(candidate: &FaceCandidate) -> (f32, f32) {
    match (candidate.left_eye, candidate.right_eye) {
        (Some(left), Some(right)) => ((left.x + right.x) / 2.0, (left.y + right.y) / 2.0),
        _ => candidate.bounding_box.center(),
    }
}

#[cfg(test)]
mod tests {
    use face_detect::{BoundingBox, EyePosition, FaceCandidate};

    use super::*;

    fn face(bb: BoundingBox) -> FaceCandidate {
        FaceCandidate {
            bounding_box: bb,
            left_eye: None,
            right_eye: None,
            tracking_id: 0,
        }
    }

    fn face_with_eyes(bb: BoundingBox, left: (f32, f32), right: (f32, f32)) -> FaceCandidate {
        FaceCandidate {
            bounding_box: bb,
            left_eye: Some(EyePosition {
                x: left.0,
                y: left.1,
            }),
            right_eye: Some(EyePosition {
                x: right.0,
                y: right.1,
            }),
            tracking_id: 0,
        }
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn empty_candidate_list_is_no_gaze() {
        let point = estimate(640, 480, &[], true, 7);
        assert_eq!(point, GazePoint::no_gaze(7));
    }

    #[test]
    fn eye_midpoint_anchor_is_normalized_and_mirrored() {
        let candidate = face_with_eyes(
            BoundingBox::new(80.0, 20.0, 160.0, 90.0),
            (100.0, 50.0),
            (140.0, 50.0),
        );
        let point = estimate(200, 100, &[candidate], true, 0);
        assert!(point.valid);
        assert_close(point.x, 0.4);
        assert_close(point.y, 0.5);
    }

    #[test]
    fn bounding_box_centre_used_without_eye_landmarks() {
        let candidate = face(BoundingBox::new(40.0, 40.0, 80.0, 80.0));
        let point = estimate(100, 100, &[candidate], true, 0);
        assert!(point.valid);
        assert_close(point.x, 0.4);
        assert_close(point.y, 0.6);
    }

    #[test]
    fn single_eye_falls_back_to_box_centre() {
        let mut candidate = face(BoundingBox::new(40.0, 40.0, 80.0, 80.0));
        candidate.left_eye = Some(EyePosition { x: 0.0, y: 0.0 });
        let point = estimate(100, 100, &[candidate], true, 0);
        assert_close(point.x, 0.4);
        assert_close(point.y, 0.6);
    }

    #[test]
    fn mirror_disabled_keeps_raw_x() {
        let candidate = face(BoundingBox::new(40.0, 40.0, 80.0, 80.0));
        let point = estimate(100, 100, &[candidate], false, 0);
        assert_close(point.x, 0.6);
        assert_close(point.y, 0.6);
    }

    #[test]
    fn largest_area_wins_regardless_of_order() {
        // Areas 100 and 200.
        let small = face(BoundingBox::new(0.0, 0.0, 10.0, 10.0));
        let large = face(BoundingBox::new(50.0, 50.0, 70.0, 60.0));

        let forward = estimate(100, 100, &[small.clone(), large.clone()], false, 0);
        let reverse = estimate(100, 100, &[large, small], false, 0);

        // Large box centre is (60, 55).
        assert_close(forward.x, 0.6);
        assert_close(forward.y, 0.55);
        assert_eq!(forward, reverse);
    }

    #[test]
    fn equal_areas_resolve_to_first_seen() {
        let first = face(BoundingBox::new(0.0, 0.0, 10.0, 10.0));
        let second = face(BoundingBox::new(50.0, 50.0, 60.0, 60.0));
        let point = estimate(100, 100, &[first, second], false, 0);
        assert_close(point.x, 0.05);
        assert_close(point.y, 0.05);
    }

    #[test]
    fn malformed_boxes_are_skipped() {
        let inverted = face(BoundingBox::new(30.0, 30.0, 10.0, 10.0));
        let usable = face(BoundingBox::new(40.0, 40.0, 80.0, 80.0));
        let point = estimate(100, 100, &[inverted.clone(), usable], true, 0);
        assert!(point.valid);
        assert_close(point.x, 0.4);

        let point = estimate(100, 100, &[inverted], true, 3);
        assert_eq!(point, GazePoint::no_gaze(3));
    }

    #[test]
    fn zero_sized_frame_is_no_gaze() {
        let candidate = face(BoundingBox::new(40.0, 40.0, 80.0, 80.0));
        assert_eq!(
            estimate(0, 100, &[candidate.clone()], true, 1),
            GazePoint::no_gaze(1)
        );
        assert_eq!(
            estimate(100, -1, &[candidate], true, 2),
            GazePoint::no_gaze(2)
        );
    }

    #[test]
    fn non_finite_anchor_is_no_gaze() {
        let candidate = face_with_eyes(
            BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            (f32::NAN, 5.0),
            (5.0, 5.0),
        );
        assert_eq!(estimate(100, 100, &[candidate], true, 9), GazePoint::no_gaze(9));
    }

    #[test]
    fn output_always_clamped_to_unit_square() {
        // Eyes far outside the frame still produce coordinates in [0, 1].
        let outside = face_with_eyes(
            BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            (-500.0, 900.0),
            (-480.0, 920.0),
        );
        for mirror in [false, true] {
            let point = estimate(100, 100, &[outside.clone()], mirror, 0);
            assert!(point.valid);
            assert!((0.0..=1.0).contains(&point.x));
            assert!((0.0..=1.0).contains(&point.y));
        }
    }
}
