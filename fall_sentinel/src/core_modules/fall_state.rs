// THEORY:
// The `fall_state` module is the decision layer of the engine. The feature extractor
// produces a fresh, noisy verdict every tick; this automaton debounces those verdicts
// into at most one `FallEvent` per real-world fall.
//
// Key architectural principles:
// 1.  **Four States**: `Idle` -> `Suspected` -> `Confirmed` -> `Cooldown` -> `Idle`.
//     Suspicion is cheap and permissive; confirmation needs either three coinciding
//     kinematic signals or a high score backed by stillness.
// 2.  **Fixed Evaluation Order**: Each tick first expires the cooldown, then retires a
//     stale confirmation, then runs the logic of whatever state is current.
// 3.  **Caller-Supplied Time**: Every window (suspicion, grace, cooldown) is a
//     comparison against the `now` passed in. Nothing is scheduled and no clock is read.
// 4.  **Exclusive Ownership**: `DetectorState` is threaded through `update_fall_state`
//     by mutable reference. Its fields are private so no other component can write them.

use crate::config::DetectorConfig;
use crate::core_modules::fall_event::{EventFactory, FallEvent};
use crate::core_modules::feature_extractor::FallFeatures;
use crate::core_modules::pose_frame::pose_frame::Millis;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Minimum score that raises a suspicion without the drop-and-tilt coincidence.
pub const SUSPECT_SCORE: u32 = 3;
/// Minimum score that, together with stillness, confirms a suspicion.
pub const CONFIRM_SCORE: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallStatus {
    #[default]
    Idle,
    Suspected,
    Confirmed,
    Cooldown,
}

/// Persistent automaton state for one monitored stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectorState {
    status: FallStatus,
    suspect_since: Option<Millis>,
    last_confirmed: Option<Millis>,
    cooldown_until: Option<Millis>,
}

impl DetectorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> FallStatus {
        self.status
    }

    pub fn suspect_since(&self) -> Option<Millis> {
        self.suspect_since
    }

    pub fn last_confirmed(&self) -> Option<Millis> {
        self.last_confirmed
    }

    pub fn cooldown_until(&self) -> Option<Millis> {
        self.cooldown_until
    }

    /// Returns to `Idle` with every timestamp cleared.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Outcome of one tick of the automaton.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct Transition {
    /// Whether `status` differs from what it was before the tick.
    pub changed: bool,
    /// The event emitted by a transition into `Confirmed`, if any.
    pub event: Option<FallEvent>,
}

/// Advances the automaton by one tick.
pub fn update_fall_state(
    state: &mut DetectorState,
    features: &FallFeatures,
    now: Millis,
    config: &DetectorConfig,
    events: &mut EventFactory,
) -> Transition {
    let before = state.status;

    if state.status == FallStatus::Cooldown && state.cooldown_until.is_none_or(|until| now >= until) {
        state.status = FallStatus::Idle;
        state.cooldown_until = None;
    }

    if state.status == FallStatus::Confirmed
        && state
            .last_confirmed
            .is_none_or(|at| now.saturating_sub(at) > config.confirmed_grace_ms)
    {
        state.status = FallStatus::Cooldown;
    }

    let hits = features.hits(config);
    let mut event = None;

    match state.status {
        FallStatus::Idle => {
            if (hits.drop && hits.tilt) || features.score >= SUSPECT_SCORE {
                state.status = FallStatus::Suspected;
                state.suspect_since = Some(now);
            }
        }
        FallStatus::Suspected => {
            let expired = state
                .suspect_since
                .is_none_or(|since| now.saturating_sub(since) >= config.suspect_window_ms);
            let confirmed = (hits.drop && hits.tilt && hits.velocity)
                || (features.score >= CONFIRM_SCORE && hits.stillness);

            if confirmed {
                state.status = FallStatus::Confirmed;
                state.last_confirmed = Some(now);
                state.cooldown_until = Some(now.saturating_add(config.cooldown_ms));
                state.suspect_since = None;

                let fall = events.build(*features, now);
                info!(
                    id = %fall.id,
                    subject = fall.subject,
                    severity = %fall.severity,
                    score = features.score,
                    now,
                    "fall confirmed"
                );
                event = Some(fall);
            } else if expired {
                state.status = FallStatus::Idle;
                state.suspect_since = None;
            }
        }
        FallStatus::Confirmed | FallStatus::Cooldown => {}
    }

    let changed = state.status != before;
    if changed {
        debug!(from = ?before, to = ?state.status, now, score = features.score, "fall state transition");
    }

    Transition { changed, event }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EventIdMode;
    use crate::core_modules::fall_event::{EventClock, EventIds};
    use crate::core_modules::severity::Severity;
    use chrono::{TimeZone, Utc};

    fn factory() -> EventFactory {
        EventFactory::new(
            EventClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(), 0),
            EventIds::from_mode(EventIdMode::Timestamp),
        )
    }

    fn features(drop: f64, vel: f64, tilt: f64, stillness: f64) -> FallFeatures {
        FallFeatures::new(drop, vel, tilt, stillness, 0.9, &DetectorConfig::default())
    }

    fn quiet() -> FallFeatures {
        features(0.0, 0.0, 0.0, 0.0)
    }

    fn strong() -> FallFeatures {
        features(0.4, 0.6, 75.0, 0.0)
    }

    struct Harness {
        state: DetectorState,
        config: DetectorConfig,
        events: EventFactory,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                state: DetectorState::new(),
                config: DetectorConfig::default(),
                events: factory(),
            }
        }

        fn tick(&mut self, features: FallFeatures, now: Millis) -> Transition {
            update_fall_state(&mut self.state, &features, now, &self.config, &mut self.events)
        }

        fn confirm_at(&mut self, now: Millis) -> FallEvent {
            let _ = self.tick(strong(), now);
            self.tick(strong(), now + 33).event.expect("confirmation emits an event")
        }
    }

    #[test]
    fn starts_idle_with_nothing_set() {
        let state = DetectorState::new();
        assert_eq!(state.status(), FallStatus::Idle);
        assert_eq!(state.suspect_since(), None);
        assert_eq!(state.last_confirmed(), None);
        assert_eq!(state.cooldown_until(), None);
    }

    #[test]
    fn quiet_tick_changes_nothing() {
        let mut harness = Harness::new();
        let transition = harness.tick(quiet(), 100);
        assert!(!transition.changed);
        assert!(transition.event.is_none());
        assert_eq!(harness.state, DetectorState::new());
    }

    #[test]
    fn drop_and_tilt_raise_suspicion() {
        let mut harness = Harness::new();
        let transition = harness.tick(features(0.35, 0.0, 65.0, 0.0), 500);
        assert!(transition.changed);
        assert!(transition.event.is_none());
        assert_eq!(harness.state.status(), FallStatus::Suspected);
        assert_eq!(harness.state.suspect_since(), Some(500));
    }

    #[test]
    fn score_of_three_raises_suspicion_without_drop() {
        let mut harness = Harness::new();
        // Tilt (2) + velocity (1).
        let tilted = features(0.0, 0.5, 65.0, 0.0);
        assert_eq!(tilted.score, 3);
        let _ = harness.tick(tilted, 0);
        assert_eq!(harness.state.status(), FallStatus::Suspected);
    }

    #[test]
    fn drop_alone_is_not_suspicious() {
        let mut harness = Harness::new();
        let transition = harness.tick(features(0.5, 0.0, 10.0, 0.0), 0);
        assert!(!transition.changed);
        assert_eq!(harness.state.status(), FallStatus::Idle);
    }

    #[test]
    fn three_signals_confirm_and_emit_once() {
        let mut harness = Harness::new();
        let _ = harness.tick(features(0.35, 0.0, 65.0, 0.0), 0);
        let transition = harness.tick(strong(), 33);

        assert!(transition.changed);
        let event = transition.event.expect("event");
        assert_eq!(event.severity, Severity::Critical);
        assert_eq!(harness.state.status(), FallStatus::Confirmed);
        assert_eq!(harness.state.last_confirmed(), Some(33));
        assert_eq!(harness.state.cooldown_until(), Some(10_033));
        assert_eq!(harness.state.suspect_since(), None);

        let again = harness.tick(strong(), 66);
        assert!(!again.changed);
        assert!(again.event.is_none());
    }

    #[test]
    fn high_score_with_stillness_confirms_without_velocity() {
        let mut harness = Harness::new();
        let _ = harness.tick(features(0.35, 0.0, 65.0, 0.0), 0);
        let lying_still = features(0.35, 0.0, 80.0, 4.5);
        assert_eq!(lying_still.score, 5);

        let transition = harness.tick(lying_still, 200);
        assert!(transition.event.is_some());
        assert_eq!(harness.state.status(), FallStatus::Confirmed);
    }

    #[test]
    fn suspicion_expires_at_window_boundary() {
        let mut harness = Harness::new();
        let _ = harness.tick(features(0.35, 0.0, 65.0, 0.0), 1_000);

        let waiting = harness.tick(quiet(), 1_799);
        assert!(!waiting.changed);
        assert_eq!(harness.state.status(), FallStatus::Suspected);

        let expired = harness.tick(quiet(), 1_800);
        assert!(expired.changed);
        assert!(expired.event.is_none());
        assert_eq!(harness.state.status(), FallStatus::Idle);
        assert_eq!(harness.state.suspect_since(), None);
    }

    #[test]
    fn confirmation_wins_over_expiry_in_the_same_tick() {
        let mut harness = Harness::new();
        let _ = harness.tick(features(0.35, 0.0, 65.0, 0.0), 0);
        let transition = harness.tick(strong(), 5_000);
        assert!(transition.event.is_some());
        assert_eq!(harness.state.status(), FallStatus::Confirmed);
    }

    #[test]
    fn confirmed_moves_to_cooldown_after_grace() {
        let mut harness = Harness::new();
        let _ = harness.confirm_at(0);
        // Confirmed at 33; grace is 1500 ms and must be exceeded.
        let _ = harness.tick(quiet(), 1_533);
        assert_eq!(harness.state.status(), FallStatus::Confirmed);

        let transition = harness.tick(quiet(), 1_534);
        assert!(transition.changed);
        assert_eq!(harness.state.status(), FallStatus::Cooldown);
    }

    #[test]
    fn cooldown_ignores_signals_until_expiry() {
        let mut harness = Harness::new();
        let _ = harness.confirm_at(0);
        let _ = harness.tick(quiet(), 2_000);
        assert_eq!(harness.state.status(), FallStatus::Cooldown);

        for now in (2_033..10_033).step_by(100) {
            let transition = harness.tick(strong(), now);
            assert!(transition.event.is_none(), "event during cooldown at {now}");
            assert_eq!(harness.state.status(), FallStatus::Cooldown);
        }

        let transition = harness.tick(quiet(), 10_033);
        assert!(transition.changed);
        assert_eq!(harness.state.status(), FallStatus::Idle);
        assert_eq!(harness.state.cooldown_until(), None);
    }

    #[test]
    fn cooldown_expiry_can_resuspect_in_the_same_tick() {
        let mut harness = Harness::new();
        let _ = harness.confirm_at(0);
        let _ = harness.tick(quiet(), 2_000);

        let transition = harness.tick(strong(), 10_033);
        assert!(transition.changed);
        assert!(transition.event.is_none());
        assert_eq!(harness.state.status(), FallStatus::Suspected);
    }

    #[test]
    fn persistent_fall_signals_alert_at_most_once_per_cooldown() {
        let mut harness = Harness::new();
        let mut fired = Vec::new();

        for now in (0..25_000).step_by(33) {
            if let Some(event) = harness.tick(strong(), now).event {
                fired.push((now, event));
            }
        }

        assert_eq!(fired.len(), 3, "fired at {:?}", fired.iter().map(|(t, _)| t).collect::<Vec<_>>());
        for pair in fired.windows(2) {
            assert!(pair[1].0 - pair[0].0 >= harness.config.cooldown_ms);
        }
    }

    #[test]
    fn single_suspicious_tick_expires_without_event() {
        let mut harness = Harness::new();
        let _ = harness.tick(features(0.0, 0.5, 65.0, 0.0), 0);
        let suspect_since = harness.state.suspect_since().unwrap();

        let mut returned_to_idle_at = None;
        for now in (100..=2_000).step_by(100) {
            let transition = harness.tick(quiet(), now);
            assert!(transition.event.is_none());
            if returned_to_idle_at.is_none() && harness.state.status() == FallStatus::Idle {
                returned_to_idle_at = Some(now);
            }
        }

        let idle_at = returned_to_idle_at.expect("suspicion never expired");
        assert!(idle_at - suspect_since <= harness.config.suspect_window_ms);
    }

    #[test]
    fn ramp_scenario_confirms_once_then_cools_down() {
        let mut harness = Harness::new();
        let mut events = Vec::new();
        let mut suspected_at = None;
        let mut confirmed_at = None;

        for i in 0..20u64 {
            let now = i * 33;
            let drop = (0.04 * i as f64).min(0.4);
            let tilt = (7.5 * i as f64).min(75.0);
            let vel = if i == 10 { 0.6 } else { 0.0 };
            let transition = harness.tick(features(drop, vel, tilt, 0.0), now);

            if transition.changed && harness.state.status() == FallStatus::Suspected {
                suspected_at.get_or_insert(i);
            }
            if let Some(event) = transition.event {
                confirmed_at = Some(i);
                events.push(event);
            }
        }

        assert_eq!(suspected_at, Some(8));
        assert_eq!(confirmed_at, Some(10));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].features.score, 5);
        assert_eq!(events[0].severity, Severity::classify(5));

        let confirmed_ms = 10 * 33;
        let mut now = 19 * 33;
        for _ in 0..50 {
            now += 33;
            let transition = harness.tick(quiet(), now);
            assert!(transition.event.is_none());
            assert!(matches!(
                harness.state.status(),
                FallStatus::Confirmed | FallStatus::Cooldown
            ));
        }
        assert_eq!(harness.state.status(), FallStatus::Cooldown);

        loop {
            now += 33;
            let transition = harness.tick(quiet(), now);
            assert!(transition.event.is_none());
            if now < confirmed_ms + harness.config.cooldown_ms {
                assert_eq!(harness.state.status(), FallStatus::Cooldown, "at {now}");
            } else {
                assert_eq!(harness.state.status(), FallStatus::Idle, "at {now}");
                break;
            }
        }
    }

    #[test]
    fn reset_returns_to_idle() {
        let mut harness = Harness::new();
        let _ = harness.confirm_at(0);
        harness.state.reset();
        assert_eq!(harness.state, DetectorState::new());
    }
}
