// THEORY:
// Every number that decides when a fall is suspected, confirmed or forgotten lives
// here. None of them is an invariant of the algorithm: they are field-tuned against
// recorded clips, and two materially different tunings are known to work. Both ship
// as named profiles; anything else is an override on top of one of them.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::warn;

/// How the vertical head velocity is estimated from the lookback window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VelocityMode {
    /// Mean of every consecutive-frame velocity in the lookback window.
    #[default]
    WindowMean,
    /// Velocity of the last step only. Faster to react, noisier.
    SingleStep,
}

/// How emitted events are identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventIdMode {
    /// Random v4 UUIDs.
    #[default]
    Uuid,
    /// `fall-<epoch millis>-<subject>-<seq>`, for targets without an entropy source.
    Timestamp,
}

/// A named, complete set of detector parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    #[default]
    Default,
    Sensitive,
}

impl Profile {
    pub const ALL: [Profile; 2] = [Profile::Default, Profile::Sensitive];

    pub fn name(&self) -> &'static str {
        match self {
            Profile::Default => "default",
            Profile::Sensitive => "sensitive",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Profile {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(Profile::Default),
            "sensitive" => Ok(Profile::Sensitive),
            _ => Err(ConfigError::UnknownProfile(s.to_string())),
        }
    }
}

/// Tunable parameters for the feature extractor and the fall state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectorConfig {
    /// Torso tilt from vertical, in degrees, that counts as "lying".
    pub tilt_threshold_deg: f64,
    /// Smoothed head-height range (0-1) that counts as a drop.
    pub drop_threshold: f64,
    /// Normalized descent speed (0-1) that counts as fast.
    pub vel_threshold: f64,
    /// Seconds without motion that count as "still".
    pub stillness_threshold_s: f64,
    /// How long alerts are suppressed after a confirmation.
    pub cooldown_ms: u64,
    /// How long a suspicion may wait for confirmation before it is dropped.
    pub suspect_window_ms: u64,
    /// How long the `confirmed` state is held before cooling down.
    pub confirmed_grace_ms: u64,
    /// History span used for head drop, velocity and tilt smoothing.
    pub lookback_window_ms: u64,
    /// Maximum history span scanned when measuring stillness.
    pub stillness_lookback_ms: u64,
    /// Per-step motion below this is treated as stillness.
    pub motion_epsilon: f64,
    /// Number of frames kept in the rolling history.
    pub history_cap: usize,
    /// Moving-average width applied to the head series.
    pub head_smoothing_window: usize,
    /// Moving-average width applied to the tilt series.
    pub tilt_smoothing_window: usize,
    /// Scale applied to raw head velocity (units/s) before clamping.
    pub velocity_gain: f64,
    pub velocity_mode: VelocityMode,
    /// Visibility assumed for landmarks that report none.
    pub default_visibility: f64,
    pub event_ids: EventIdMode,
    /// How long a subject may go unseen before its detector is dropped.
    pub subject_timeout_ms: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            tilt_threshold_deg: 60.0,
            drop_threshold: 0.30,
            vel_threshold: 0.45,
            stillness_threshold_s: 4.0,
            cooldown_ms: 10_000,
            suspect_window_ms: 800,
            confirmed_grace_ms: 1_500,
            lookback_window_ms: 1_000,
            stillness_lookback_ms: 5_000,
            motion_epsilon: 0.018,
            history_cap: 400,
            head_smoothing_window: 5,
            tilt_smoothing_window: 4,
            velocity_gain: 1.25,
            velocity_mode: VelocityMode::WindowMean,
            default_visibility: 0.9,
            event_ids: EventIdMode::Uuid,
            subject_timeout_ms: 30_000,
        }
    }
}

impl DetectorConfig {
    pub fn profile(profile: Profile) -> Self {
        match profile {
            Profile::Default => Self::default(),
            Profile::Sensitive => Self {
                tilt_threshold_deg: 68.0,
                drop_threshold: 0.38,
                stillness_threshold_s: 2.5,
                suspect_window_ms: 1_000,
                motion_epsilon: 0.015,
                ..Self::default()
            },
        }
    }

    /// Parses a TOML document. An optional top-level `profile = "<name>"` picks the
    /// base; every other key overrides one field of that base.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let mut overrides: toml::Table = text.parse()?;

        let base = match overrides.remove("profile") {
            None => Profile::Default,
            Some(toml::Value::String(name)) => name.parse()?,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    field: "profile",
                    reason: format!("expected a string, found {}", other.type_str()),
                });
            }
        };

        let mut merged = match toml::Value::try_from(Self::profile(base))? {
            toml::Value::Table(table) => table,
            _ => toml::Table::new(),
        };
        for (key, value) in overrides {
            merged.insert(key, value);
        }

        let config: Self = toml::Value::Table(merged).try_into()?;
        if let Err(err) = config.validate() {
            warn!(profile = %base, error = %err, "rejected detector config");
            return Err(err);
        }
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Rejects parameter values that would make the detector meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("tilt_threshold_deg", self.tilt_threshold_deg, 0.0, 180.0)?;
        check_range("drop_threshold", self.drop_threshold, 0.0, 1.0)?;
        check_range("vel_threshold", self.vel_threshold, 0.0, 1.0)?;
        check_positive("stillness_threshold_s", self.stillness_threshold_s)?;
        check_positive("motion_epsilon", self.motion_epsilon)?;
        check_positive("velocity_gain", self.velocity_gain)?;
        if !(0.0..=1.0).contains(&self.default_visibility) {
            return Err(invalid("default_visibility", "must be within [0, 1]"));
        }

        for (field, value) in [
            ("cooldown_ms", self.cooldown_ms),
            ("suspect_window_ms", self.suspect_window_ms),
            ("lookback_window_ms", self.lookback_window_ms),
            ("stillness_lookback_ms", self.stillness_lookback_ms),
            ("subject_timeout_ms", self.subject_timeout_ms),
        ] {
            if value == 0 {
                return Err(invalid(field, "must be greater than zero"));
            }
        }

        for (field, value) in [
            ("history_cap", self.history_cap),
            ("head_smoothing_window", self.head_smoothing_window),
            ("tilt_smoothing_window", self.tilt_smoothing_window),
        ] {
            if value == 0 {
                return Err(invalid(field, "must be at least 1"));
            }
        }

        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

fn check_range(field: &'static str, value: f64, low: f64, high: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > low && value <= high {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("{value} is outside ({low}, {high}]"),
        })
    }
}

fn check_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("{value} must be a positive number"),
        })
    }
}
