// THEORY:
// The `FeatureExtractor` is the heart of the temporal analysis layer. It looks at the
// current `PoseFrame` against the recent history and reduces the noisy per-frame
// landmarks into a small bundle of smoothed, normalized kinematic signals that the
// state machine can debounce.
//
// Key architectural principles:
// 1.  **Windowed Memory**: Head drop, descent velocity and tilt are all computed over a
//     short lookback window (about one second) so that a single jittery frame cannot
//     produce a fall on its own. Stillness uses a longer, separately bounded scan.
// 2.  **Smoothing Before Measuring**: Head height and tilt are passed through a
//     trailing moving average before their range or latest value is read. Drop is the
//     range of the smoothed head series, not of the raw one.
// 3.  **Normalized Outputs**: Every signal except stillness lands in a fixed range
//     ([0, 1] or [0, 180] degrees). Non-positive time steps count as zero velocity and
//     non-finite intermediates collapse to zero, so the state machine never sees NaN.
// 4.  **Evidence Counting**: The `score` is an unweighted tally of threshold hits
//     (drop and tilt count double). No single signal can carry a decision alone.
// 5.  **Purity**: The output is a function of `(history, current, config)` only. Two
//     calls with the same arguments give bit-identical results.

use crate::config::{DetectorConfig, VelocityMode};
use crate::core_modules::pose_frame::pose_frame::{Millis, PoseFrame};
use crate::core_modules::frame_history::FrameHistory;
use serde::{Deserialize, Serialize};

const DROP_WEIGHT: u32 = 2;
const TILT_WEIGHT: u32 = 2;
const VELOCITY_WEIGHT: u32 = 1;
const STILLNESS_WEIGHT: u32 = 1;

/// The per-tick signal bundle handed to the classifier and the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FallFeatures {
    /// Range of the smoothed head height over the lookback window (0-1).
    pub head_y_drop: f64,
    /// Normalized downward head speed (0-1).
    pub head_y_vel_peak: f64,
    /// Smoothed torso tilt from vertical (0-180 degrees).
    pub torso_tilt_deg: f64,
    /// Seconds since the last frame-to-frame motion.
    pub stillness_sec: f64,
    /// Mean landmark visibility of the current frame (0-1).
    pub confidence: f64,
    /// Weighted count of threshold hits.
    pub score: u32,
}

/// Which of the four indicators crossed their threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ThresholdHits {
    pub drop: bool,
    pub tilt: bool,
    pub velocity: bool,
    pub stillness: bool,
}

impl ThresholdHits {
    pub fn score(&self) -> u32 {
        u32::from(self.drop) * DROP_WEIGHT
            + u32::from(self.tilt) * TILT_WEIGHT
            + u32::from(self.velocity) * VELOCITY_WEIGHT
            + u32::from(self.stillness) * STILLNESS_WEIGHT
    }
}

impl FallFeatures {
    /// Assembles a feature bundle from raw signal values, clamping each into its
    /// documented range and scoring it against `config`.
    pub fn new(
        head_y_drop: f64,
        head_y_vel_peak: f64,
        torso_tilt_deg: f64,
        stillness_sec: f64,
        confidence: f64,
        config: &DetectorConfig,
    ) -> Self {
        let mut features = Self {
            head_y_drop: clamp_finite(head_y_drop, 0.0, 1.0),
            head_y_vel_peak: clamp_finite(head_y_vel_peak, 0.0, 1.0),
            torso_tilt_deg: clamp_finite(torso_tilt_deg, 0.0, 180.0),
            stillness_sec: clamp_finite(stillness_sec, 0.0, f64::MAX),
            confidence: clamp_finite(confidence, 0.0, 1.0),
            score: 0,
        };
        features.score = features.hits(config).score();
        features
    }

    pub fn hits(&self, config: &DetectorConfig) -> ThresholdHits {
        ThresholdHits {
            drop: self.head_y_drop >= config.drop_threshold,
            tilt: self.torso_tilt_deg >= config.tilt_threshold_deg,
            velocity: self.head_y_vel_peak >= config.vel_threshold,
            stillness: self.stillness_sec >= config.stillness_threshold_s,
        }
    }
}

/// Computes the feature bundle for `current` given the frames that preceded it.
///
/// `history` must not already contain `current`.
pub fn compute_features(
    history: &FrameHistory,
    current: &PoseFrame,
    config: &DetectorConfig,
) -> FallFeatures {
    let now = current.timestamp_ms;

    let mut window: Vec<&PoseFrame> = history
        .iter()
        .filter(|frame| within(frame.timestamp_ms, now, config.lookback_window_ms))
        .collect();
    window.push(current);

    let head_series: Vec<f64> = window.iter().map(|frame| frame.head_y).collect();
    let smoothed_head = moving_average(&head_series, config.head_smoothing_window);
    let head_drop = range(&smoothed_head);

    let velocity = head_velocity(&window, config);

    let tilt_series: Vec<f64> = window.iter().map(|frame| frame.torso_tilt_deg).collect();
    let tilt = moving_average(&tilt_series, config.tilt_smoothing_window)
        .last()
        .copied()
        .unwrap_or(current.torso_tilt_deg);

    let stillness = stillness_seconds(history, current, config);
    let confidence = mean_visibility(current, config.default_visibility);

    FallFeatures::new(head_drop, velocity, tilt, stillness, confidence, config)
}

/// Trailing simple moving average. Early samples average over what is available.
///
/// Each output averages offsets from the oldest sample in its window, so a constant
/// series smooths to exactly itself.
pub fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    (0..values.len())
        .map(|i| {
            let count = (i + 1).min(window);
            let slice = &values[i + 1 - count..=i];
            let base = slice[0];
            base + slice.iter().map(|value| value - base).sum::<f64>() / count as f64
        })
        .collect()
}

fn range(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    if values.is_empty() { 0.0 } else { max - min }
}

/// True when `timestamp` is not in the future and at most `span` before `now`.
fn within(timestamp: Millis, now: Millis, span: Millis) -> bool {
    timestamp <= now && now - timestamp <= span
}

/// Head velocity in y-units per second between two frames; zero for non-positive steps.
fn step_velocity(older: &PoseFrame, newer: &PoseFrame) -> f64 {
    if newer.timestamp_ms <= older.timestamp_ms {
        return 0.0;
    }
    let dt = (newer.timestamp_ms - older.timestamp_ms) as f64 / 1000.0;
    (newer.head_y - older.head_y) / dt
}

fn head_velocity(window: &[&PoseFrame], config: &DetectorConfig) -> f64 {
    let raw = match config.velocity_mode {
        VelocityMode::WindowMean => {
            let steps: Vec<f64> = window
                .windows(2)
                .map(|pair| step_velocity(pair[0], pair[1]))
                .collect();
            if steps.is_empty() {
                0.0
            } else {
                steps.iter().sum::<f64>() / steps.len() as f64
            }
        }
        VelocityMode::SingleStep => window
            .windows(2)
            .last()
            .map(|pair| step_velocity(pair[0], pair[1]))
            .unwrap_or(0.0),
    };
    clamp_finite(raw * config.velocity_gain, 0.0, 1.0)
}

/// Seconds since the last step whose motion exceeded `motion_epsilon`, scanning
/// backward from `current` for at most `stillness_lookback_ms`.
fn stillness_seconds(history: &FrameHistory, current: &PoseFrame, config: &DetectorConfig) -> f64 {
    let now = current.timestamp_ms;
    let mut newer = current;
    let mut oldest_scanned = now;

    for older in history.iter().rev() {
        if !within(older.timestamp_ms, now, config.stillness_lookback_ms) {
            break;
        }
        if newer.motion_since(older) > config.motion_epsilon {
            return millis_to_seconds(now - newer.timestamp_ms);
        }
        oldest_scanned = older.timestamp_ms;
        newer = older;
    }

    millis_to_seconds((now - oldest_scanned).min(config.stillness_lookback_ms))
}

fn mean_visibility(frame: &PoseFrame, default_visibility: f64) -> f64 {
    if frame.landmarks.is_empty() {
        return 0.0;
    }
    let total: f64 = frame
        .landmarks
        .iter()
        .map(|landmark| landmark.visibility_or(default_visibility))
        .sum();
    clamp_finite(total / frame.landmarks.len() as f64, 0.0, 1.0)
}

fn millis_to_seconds(ms: Millis) -> f64 {
    ms as f64 / 1000.0
}

/// Clamps into `[low, high]`, mapping NaN to `low`.
fn clamp_finite(value: f64, low: f64, high: f64) -> f64 {
    if value.is_nan() { low } else { value.clamp(low, high) }
}
