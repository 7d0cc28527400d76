// THEORY:
// A `FallEvent` is the only thing the engine ever hands to the outside world. It is
// an immutable, self-describing record: who (an id), when (wall-clock time), how bad
// (severity), why (the triggering features) and a human sentence. Once emitted it
// belongs to the consumer; the engine keeps no copy.
//
// Wall-clock time is never read during a tick. An `EventClock` anchors the monotonic
// tick milliseconds to a wall-clock instant captured when the pipeline is built, so a
// recorded clip replays to the same timestamps every time.

use crate::config::EventIdMode;
use crate::core_modules::feature_extractor::FallFeatures;
use crate::core_modules::pose_frame::pose_frame::{Millis, SubjectId};
use crate::core_modules::severity::Severity;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// A confirmed fall, ready for display or alerting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallEvent {
    pub id: String,
    /// The person who fell.
    #[serde(default)]
    pub subject: SubjectId,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub features: FallFeatures,
    pub description: String,
}

/// Renders a short human-readable summary of the features.
///
/// For display only; nothing parses it back.
pub fn describe(features: &FallFeatures) -> String {
    let drop_percent = (features.head_y_drop * 100.0).round() as i64;
    let tilt_degrees = features.torso_tilt_deg.round() as i64;
    format!(
        "Fall detected: head dropped {drop_percent}% of frame height, torso tilted {tilt_degrees}\u{b0}, still for {:.1}s",
        features.stillness_sec
    )
}

/// Maps monotonic tick milliseconds onto wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventClock {
    anchor_wall: DateTime<Utc>,
    anchor_ms: Millis,
}

impl EventClock {
    pub fn new(anchor_wall: DateTime<Utc>, anchor_ms: Millis) -> Self {
        Self {
            anchor_wall,
            anchor_ms,
        }
    }

    /// Anchors tick `anchor_ms` to the current system time.
    pub fn starting_now(anchor_ms: Millis) -> Self {
        Self::new(Utc::now(), anchor_ms)
    }

    pub fn wall_time(&self, now_ms: Millis) -> DateTime<Utc> {
        let delta = i128::from(now_ms) - i128::from(self.anchor_ms);
        let offset = i64::try_from(delta)
            .ok()
            .and_then(TimeDelta::try_milliseconds)
            .unwrap_or(TimeDelta::zero());
        self.anchor_wall
            .checked_add_signed(offset)
            .unwrap_or(self.anchor_wall)
    }
}

/// Source of event identifiers.
#[derive(Debug, Clone, PartialEq)]
pub enum EventIds {
    /// Random v4 UUIDs.
    Uuid,
    /// `fall-<epoch millis>-<subject>-<seq>`; `seq` disambiguates events of one subject
    /// within one millisecond.
    Timestamp { last_ms: i64, seq: u32 },
}

impl EventIds {
    pub fn from_mode(mode: EventIdMode) -> Self {
        match mode {
            EventIdMode::Uuid => EventIds::Uuid,
            EventIdMode::Timestamp => EventIds::Timestamp {
                last_ms: i64::MIN,
                seq: 0,
            },
        }
    }

    pub fn next_id(&mut self, subject: SubjectId, at: &DateTime<Utc>) -> String {
        match self {
            EventIds::Uuid => uuid::Uuid::new_v4().to_string(),
            EventIds::Timestamp { last_ms, seq } => {
                let ms = at.timestamp_millis();
                if ms == *last_ms {
                    *seq += 1;
                } else {
                    *last_ms = ms;
                    *seq = 0;
                }
                format!("fall-{ms}-{subject}-{seq}")
            }
        }
    }
}

/// Builds `FallEvent`s for one monitored subject.
#[derive(Debug, Clone)]
pub struct EventFactory {
    clock: EventClock,
    ids: EventIds,
    subject: SubjectId,
}

impl EventFactory {
    pub fn new(clock: EventClock, ids: EventIds) -> Self {
        Self {
            clock,
            ids,
            subject: 0,
        }
    }

    pub fn with_subject(mut self, subject: SubjectId) -> Self {
        self.subject = subject;
        self
    }

    pub fn build(&mut self, features: FallFeatures, now_ms: Millis) -> FallEvent {
        let timestamp = self.clock.wall_time(now_ms);
        FallEvent {
            id: self.ids.next_id(self.subject, &timestamp),
            subject: self.subject,
            timestamp,
            severity: Severity::classify(features.score),
            description: describe(&features),
            features,
        }
    }
}
