// THEORY:
// The `Landmark` module is the most fundamental unit of the fall engine. It is a
// "dumb" data container for a single tracked body keypoint as reported by the
// external pose-estimation model, plus the fixed anatomical index scheme that the
// model uses to lay those keypoints out.
//
// Key principles:
// 1) Frame-relative coordinates: `x` and `y` are normalized to [0, 1] with the
//    origin at the top-left of the image, so a larger `y` is closer to the floor.
// 2) Explicit optionality: `z` (depth) and `visibility` (confidence) are not always
//    produced by the model. They are modelled as `Option`s with a documented
//    default rather than as zeros that would silently skew averages.
// 3) Fixed indexing: the anatomical indices below are a hard contract with the
//    pose model (33-point body topology). They must never be renumbered.

pub mod landmark {
    use serde::{Deserialize, Serialize};

    pub type Coordinate = f64;
    pub type Visibility = f64;

    /// Visibility assumed for a landmark whose model did not report one.
    pub const DEFAULT_VISIBILITY: Visibility = 0.9;

    pub const NOSE: usize = 0;
    pub const LEFT_SHOULDER: usize = 11;
    pub const RIGHT_SHOULDER: usize = 12;
    pub const LEFT_HIP: usize = 23;
    pub const RIGHT_HIP: usize = 24;

    /// Indices that must all be present for a frame to be built.
    pub const REQUIRED_LANDMARKS: [usize; 5] =
        [NOSE, LEFT_SHOULDER, RIGHT_SHOULDER, LEFT_HIP, RIGHT_HIP];

    /// A single tracked body keypoint in frame-relative coordinates.
    #[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
    pub struct NormalizedLandmark {
        /// Horizontal position (0.0-1.0), left to right.
        pub x: Coordinate,
        /// Vertical position (0.0-1.0), top to bottom.
        pub y: Coordinate,
        /// Relative depth, when the model provides one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub z: Option<Coordinate>,
        /// Detection confidence (0.0-1.0), when the model provides one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub visibility: Option<Visibility>,
    }

    impl NormalizedLandmark {
        pub fn new(x: Coordinate, y: Coordinate) -> Self {
            Self {
                x,
                y,
                z: None,
                visibility: None,
            }
        }

        pub fn with_visibility(mut self, visibility: Visibility) -> Self {
            self.visibility = Some(visibility);
            self
        }

        /// Reported visibility, or `default` when the model gave none.
        pub fn visibility_or(&self, default: Visibility) -> Visibility {
            self.visibility.unwrap_or(default)
        }

        /// True when both planar coordinates are usable numbers.
        pub fn is_finite(&self) -> bool {
            self.x.is_finite() && self.y.is_finite()
        }

        /// Midpoint of two landmarks in the image plane.
        pub fn midpoint(&self, other: &NormalizedLandmark) -> (Coordinate, Coordinate) {
            ((self.x + other.x) * 0.5, (self.y + other.y) * 0.5)
        }
    }

    /// Looks up a required landmark, rejecting missing or non-finite entries.
    pub fn required(landmarks: &[NormalizedLandmark], index: usize) -> Option<&NormalizedLandmark> {
        landmarks.get(index).filter(|landmark| landmark.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::landmark::*;

    #[test]
    fn missing_visibility_uses_default() {
        let landmark = NormalizedLandmark::new(0.4, 0.6);
        assert_eq!(landmark.visibility_or(DEFAULT_VISIBILITY), 0.9);

        let seen = landmark.with_visibility(0.3);
        assert_eq!(seen.visibility_or(DEFAULT_VISIBILITY), 0.3);
    }

    #[test]
    fn midpoint_is_average_of_both_points() {
        let left = NormalizedLandmark::new(0.2, 0.4);
        let right = NormalizedLandmark::new(0.6, 0.8);
        let (x, y) = left.midpoint(&right);
        assert!((x - 0.4).abs() < 1e-12);
        assert!((y - 0.6).abs() < 1e-12);
    }

    #[test]
    fn required_rejects_absent_and_nan_entries() {
        let landmarks = vec![NormalizedLandmark::new(f64::NAN, 0.1), NormalizedLandmark::new(0.5, 0.5)];
        assert!(required(&landmarks, 0).is_none());
        assert!(required(&landmarks, 1).is_some());
        assert!(required(&landmarks, LEFT_HIP).is_none());
    }

    #[test]
    fn optional_fields_are_omitted_from_json() {
        let json = serde_json::to_string(&NormalizedLandmark::new(0.5, 0.25)).unwrap();
        assert_eq!(json, r#"{"x":0.5,"y":0.25}"#);

        let parsed: NormalizedLandmark =
            serde_json::from_str(r#"{"x":0.1,"y":0.2,"visibility":0.7}"#).unwrap();
        assert_eq!(parsed.visibility, Some(0.7));
        assert_eq!(parsed.z, None);
    }
}
