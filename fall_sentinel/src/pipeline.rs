// THEORY:
// The `pipeline` module is the top-level API for the fall engine. It owns everything
// that persists between ticks for one monitored stream (the frame history, the
// detector state and the event factory) and turns one pose tick into one `Report`.
//
// Key architectural principles:
// 1.  **One Tick In, One Report Out**: `process` runs the full stack synchronously:
//     build frame, extract features, classify, advance the state machine, publish.
//     A tick without a usable pose is skipped wholesale and changes nothing.
// 2.  **Features Before Memory**: Features are computed against the history as it
//     stood before the tick; the new frame is appended last.
// 3.  **Anonymous Consumers**: Events fan out to any number of `EventSink`s. The
//     pipeline does not know whether a sink logs, broadcasts or pages a caregiver.

use crate::clip::{PoseSource, PoseTick};
use crate::config::DetectorConfig;
use crate::core_modules::fall_event::{EventClock, EventFactory, EventIds};
use crate::core_modules::fall_state::{DetectorState, update_fall_state};
use crate::core_modules::feature_extractor::compute_features;
use crate::core_modules::frame_history::FrameHistory;
use crate::core_modules::landmark::landmark::NormalizedLandmark;
use crate::core_modules::pose_frame::pose_frame::{Millis, SubjectId, build_frame};
use serde::Serialize;
use std::ops::AddAssign;
use tracing::{debug, info, trace};

// Re-export key data structures for the public API.
pub use crate::core_modules::fall_event::FallEvent;
pub use crate::core_modules::fall_state::FallStatus;
pub use crate::core_modules::feature_extractor::FallFeatures;
pub use crate::core_modules::severity::Severity;

/// A consumer of pipeline output.
pub trait EventSink: Send {
    /// Called once for every confirmed fall.
    fn publish(&mut self, event: &FallEvent);

    /// Called whenever a subject's detector status changes.
    fn status_changed(&mut self, _subject: SubjectId, _status: FallStatus) {}
}

/// Logs every event at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn publish(&mut self, event: &FallEvent) {
        info!(
            id = %event.id,
            subject = event.subject,
            timestamp = %event.timestamp,
            severity = %event.severity,
            "{}",
            event.description
        );
    }
}

/// What the engine concluded about one analyzed tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickAnalysis {
    pub timestamp_ms: Millis,
    pub features: FallFeatures,
    pub severity: Severity,
    /// Detector status after the tick.
    pub status: FallStatus,
    /// Whether the tick moved the detector to a different status.
    pub changed: bool,
}

/// The primary output of the pipeline for a single tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    /// No usable pose; the tick was skipped and nothing changed.
    NoPose,
    Analyzed(TickAnalysis),
    FallDetected {
        analysis: TickAnalysis,
        event: FallEvent,
    },
}

impl Report {
    pub fn analysis(&self) -> Option<&TickAnalysis> {
        match self {
            Report::NoPose => None,
            Report::Analyzed(analysis) | Report::FallDetected { analysis, .. } => Some(analysis),
        }
    }

    pub fn event(&self) -> Option<&FallEvent> {
        match self {
            Report::FallDetected { event, .. } => Some(event),
            _ => None,
        }
    }
}

/// Running counters for one pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub ticks: u64,
    /// Ticks dropped because no complete pose was present.
    pub skipped: u64,
    pub analyzed: u64,
    /// Ticks on which the detector status changed.
    pub transitions: u64,
    pub events: u64,
}

impl AddAssign for PipelineStats {
    fn add_assign(&mut self, other: Self) {
        self.ticks += other.ticks;
        self.skipped += other.skipped;
        self.analyzed += other.analyzed;
        self.transitions += other.transitions;
        self.events += other.events;
    }
}

/// The main, top-level struct for the fall engine.
pub struct FallPipeline {
    subject: SubjectId,
    config: DetectorConfig,
    history: FrameHistory,
    state: DetectorState,
    events: EventFactory,
    sinks: Vec<Box<dyn EventSink>>,
    stats: PipelineStats,
}

impl FallPipeline {
    pub fn new(config: DetectorConfig, clock: EventClock) -> Self {
        let history = FrameHistory::new(config.history_cap);
        let events = EventFactory::new(clock, EventIds::from_mode(config.event_ids));
        Self {
            subject: 0,
            config,
            history,
            state: DetectorState::new(),
            events,
            sinks: Vec::new(),
            stats: PipelineStats::default(),
        }
    }

    /// Tags this pipeline's events and status changes with `subject`.
    pub fn with_subject(mut self, subject: SubjectId) -> Self {
        self.subject = subject;
        self.events = self.events.with_subject(subject);
        self
    }

    pub fn add_sink(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn subject(&self) -> SubjectId {
        self.subject
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn state(&self) -> &DetectorState {
        &self.state
    }

    pub fn status(&self) -> FallStatus {
        self.state.status()
    }

    pub fn history(&self) -> &FrameHistory {
        &self.history
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Runs one tick.
    pub fn process(&mut self, landmarks: &[NormalizedLandmark], now_ms: Millis) -> Report {
        self.stats.ticks += 1;

        let Some(frame) = build_frame(landmarks, now_ms) else {
            self.stats.skipped += 1;
            trace!(now_ms, landmarks = landmarks.len(), "no usable pose, tick skipped");
            return Report::NoPose;
        };

        let features = compute_features(&self.history, &frame, &self.config);
        let severity = Severity::classify(features.score);
        let transition = update_fall_state(
            &mut self.state,
            &features,
            now_ms,
            &self.config,
            &mut self.events,
        );
        self.history.push(frame);
        self.stats.analyzed += 1;

        let analysis = TickAnalysis {
            timestamp_ms: now_ms,
            features,
            severity,
            status: self.state.status(),
            changed: transition.changed,
        };

        if transition.changed {
            self.stats.transitions += 1;
            for sink in &mut self.sinks {
                sink.status_changed(self.subject, analysis.status);
            }
        }

        match transition.event {
            Some(event) => {
                self.stats.events += 1;
                for sink in &mut self.sinks {
                    sink.publish(&event);
                }
                Report::FallDetected { analysis, event }
            }
            None => Report::Analyzed(analysis),
        }
    }

    pub fn process_tick(&mut self, tick: &PoseTick) -> Report {
        self.process(&tick.landmarks, tick.timestamp_ms)
    }

    pub fn fall_detected(&mut self, landmarks: &[NormalizedLandmark], now_ms: Millis) -> bool {
        matches!(self.process(landmarks, now_ms), Report::FallDetected { .. })
    }

    /// Drains `source`, returning the counters afterwards.
    pub fn run(&mut self, source: &mut impl PoseSource) -> PipelineStats {
        while let Some(tick) = source.next_tick() {
            let _ = self.process_tick(&tick);
        }
        self.stats
    }

    /// Returns to `Idle` and forgets all history. Counters are kept.
    pub fn reset(&mut self) {
        let was = self.state.status();
        self.state.reset();
        self.history.clear();
        debug!(subject = self.subject, from = ?was, "pipeline reset");
        if was != FallStatus::Idle {
            for sink in &mut self.sinks {
                sink.status_changed(self.subject, FallStatus::Idle);
            }
        }
    }
}
