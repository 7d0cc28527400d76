// THEORY:
// The `PoseFrame` module condenses a full landmark set into the handful of body
// measurements the fall engine actually reasons about. It is the bridge between the
// raw output of the pose model and the temporal analysis performed by the feature
// extractor.
//
// Key architectural principles:
// 1.  **Compaction**: Out of 33 keypoints we keep the head height, the hip height and
//     the torso tilt. Every later stage works on these three numbers, so they are
//     computed exactly once per tick.
// 2.  **All or Nothing**: A frame is only built from a complete core skeleton (nose,
//     both shoulders, both hips). A partial skeleton yields `None` and the tick must be
//     skipped entirely; a synthetic zero frame would poison the smoothing windows.
// 3.  **Pure Construction**: `build_frame` reads nothing but its arguments. The
//     timestamp is supplied by the caller and is never taken from a clock.

pub mod pose_frame {
    use crate::core_modules::landmark::landmark::{self, NormalizedLandmark, REQUIRED_LANDMARKS};

    /// Monotonic tick time in milliseconds, supplied by the capture loop.
    pub type Millis = u64;
    pub type Degrees = f64;
    /// Identifies one tracked person within a camera's view.
    pub type SubjectId = u32;

    /// A compact per-tick snapshot of the body.
    #[derive(Debug, Clone, PartialEq)]
    pub struct PoseFrame {
        /// Monotonic timestamp of the inference tick.
        pub timestamp_ms: Millis,
        /// The full landmark set the frame was built from.
        pub landmarks: Vec<NormalizedLandmark>,
        /// Vertical position of the nose.
        pub head_y: f64,
        /// Vertical position of the hip midpoint.
        pub hip_y: f64,
        /// Angle of the shoulder-to-hip vector from vertical. 0 is upright.
        pub torso_tilt_deg: Degrees,
    }

    impl PoseFrame {
        /// Frame-to-frame motion magnitude between `self` and an older frame.
        ///
        /// Head and hip displacement are already normalized; tilt is brought onto the
        /// same scale by dividing by 180 degrees.
        pub fn motion_since(&self, older: &PoseFrame) -> f64 {
            (self.head_y - older.head_y).abs()
                + (self.hip_y - older.hip_y).abs()
                + (self.torso_tilt_deg - older.torso_tilt_deg).abs() / 180.0
        }
    }

    /// Builds a frame from one landmark set, or `None` when the core skeleton is incomplete.
    pub fn build_frame(landmarks: &[NormalizedLandmark], timestamp_ms: Millis) -> Option<PoseFrame> {
        if landmarks.is_empty() {
            return None;
        }

        let [nose, left_shoulder, right_shoulder, left_hip, right_hip] =
            REQUIRED_LANDMARKS.map(|index| landmark::required(landmarks, index));
        let (nose, left_shoulder, right_shoulder, left_hip, right_hip) =
            (nose?, left_shoulder?, right_shoulder?, left_hip?, right_hip?);

        let (shoulder_x, shoulder_y) = left_shoulder.midpoint(right_shoulder);
        let (hip_x, hip_y) = left_hip.midpoint(right_hip);

        Some(PoseFrame {
            timestamp_ms,
            landmarks: landmarks.to_vec(),
            head_y: nose.y,
            hip_y,
            torso_tilt_deg: torso_tilt_degrees(shoulder_x, shoulder_y, hip_x, hip_y),
        })
    }

    /// Tilt of the shoulder-to-hip vector from vertical, always non-negative.
    pub fn torso_tilt_degrees(shoulder_x: f64, shoulder_y: f64, hip_x: f64, hip_y: f64) -> Degrees {
        (hip_x - shoulder_x)
            .abs()
            .atan2((hip_y - shoulder_y).abs())
            .to_degrees()
    }
}
