// Synthetic skeletons shared by the unit tests.

use crate::core_modules::landmark::landmark::*;
use crate::core_modules::pose_frame::pose_frame::{PoseFrame, build_frame};

pub const HIP_Y: f64 = 0.55;
const TORSO_LENGTH: f64 = 0.25;
const HALF_WIDTH: f64 = 0.05;

/// A 33-point skeleton with the nose at `head_y` and the torso leaning `tilt_deg`
/// from vertical around a fixed hip midpoint.
pub fn skeleton(head_y: f64, tilt_deg: f64) -> Vec<NormalizedLandmark> {
    let radians = tilt_deg.to_radians();
    let shoulder_x = 0.5 - TORSO_LENGTH * radians.sin();
    let shoulder_y = HIP_Y - TORSO_LENGTH * radians.cos();

    let mut landmarks = vec![NormalizedLandmark::new(0.5, 0.5); 33];
    landmarks[NOSE] = NormalizedLandmark::new(0.5, head_y);
    landmarks[LEFT_SHOULDER] = NormalizedLandmark::new(shoulder_x - HALF_WIDTH, shoulder_y);
    landmarks[RIGHT_SHOULDER] = NormalizedLandmark::new(shoulder_x + HALF_WIDTH, shoulder_y);
    landmarks[LEFT_HIP] = NormalizedLandmark::new(0.5 - HALF_WIDTH, HIP_Y);
    landmarks[RIGHT_HIP] = NormalizedLandmark::new(0.5 + HALF_WIDTH, HIP_Y);
    landmarks
}

pub fn frame_at(timestamp_ms: u64, head_y: f64, tilt_deg: f64) -> PoseFrame {
    build_frame(&skeleton(head_y, tilt_deg), timestamp_ms).expect("synthetic skeleton is complete")
}

/// Landmark ticks of a person standing, falling over `fall_ms`, then lying still.
///
/// Returns `(timestamp_ms, landmarks)` pairs spaced `step_ms` apart.
pub fn fall_sequence(
    standing_ms: u64,
    fall_ms: u64,
    lying_ms: u64,
    step_ms: u64,
) -> Vec<(u64, Vec<NormalizedLandmark>)> {
    let total = standing_ms + fall_ms + lying_ms;
    let mut ticks = Vec::new();
    let mut now = 0;
    while now <= total {
        let progress = if now <= standing_ms {
            0.0
        } else {
            ((now - standing_ms) as f64 / fall_ms as f64).min(1.0)
        };
        let head_y = 0.2 + 0.55 * progress;
        let tilt = 85.0 * progress;
        ticks.push((now, skeleton(head_y, tilt)));
        now += step_ms;
    }
    ticks
}
