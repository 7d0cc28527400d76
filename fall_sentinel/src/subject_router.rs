// THEORY:
// A camera in a shared room sees more than one person. Each of them can fall on their
// own, and one person's cooldown must never silence another person's alarm. The
// `SubjectRouter` gives every tracked subject a private `FallPipeline` and sends each
// tick to the pipeline its `subject` id names.
//
// Key architectural principles:
// 1.  **Lifecycle Management**: The router owns the whole life of a subject's detector:
//     - **Birth**: The first tick carrying an unknown id creates a fresh pipeline.
//     - **Tracking**: Every tick for that id, with or without a usable pose, refreshes
//       its `last_seen` time.
//     - **Death**: A subject unseen for `subject_timeout_ms` is dropped, but never
//       while its cooldown is still running. A person who fell and then walked out of
//       frame does not re-alert on re-entry within the cooldown.
// 2.  **One Set of Sinks**: Pipelines inside the router carry no sinks of their own.
//     The router forwards status changes and events from each `Report`, so every sink
//     hears about every subject exactly once.
// 3.  **Shared Clock**: Tick timestamps of all subjects come from the same capture
//     loop, so any tick is a valid "now" for expiring the others.

use crate::clip::{PoseSource, PoseTick};
use crate::config::DetectorConfig;
use crate::core_modules::fall_event::EventClock;
use crate::core_modules::pose_frame::pose_frame::{Millis, SubjectId};
use crate::pipeline::{EventSink, FallPipeline, FallStatus, PipelineStats, Report, TickAnalysis};
use std::collections::HashMap;
use tracing::{debug, info};

/// One tracked person and their private detector.
struct Subject {
    pipeline: FallPipeline,
    last_seen: Millis,
    latest: Option<TickAnalysis>,
}

impl Subject {
    fn is_expired(&self, now: Millis, timeout_ms: Millis) -> bool {
        let stale = now.saturating_sub(self.last_seen) >= timeout_ms;
        let cooled = self
            .pipeline
            .state()
            .cooldown_until()
            .is_none_or(|until| now >= until);
        stale && cooled
    }
}

/// Routes ticks to one `FallPipeline` per subject.
pub struct SubjectRouter {
    config: DetectorConfig,
    clock: EventClock,
    subjects: HashMap<SubjectId, Subject>,
    sinks: Vec<Box<dyn EventSink>>,
    /// Counters of subjects that have already been dropped.
    retired: PipelineStats,
}

impl SubjectRouter {
    pub fn new(config: DetectorConfig, clock: EventClock) -> Self {
        Self {
            config,
            clock,
            subjects: HashMap::new(),
            sinks: Vec::new(),
            retired: PipelineStats::default(),
        }
    }

    pub fn add_sink(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn subject_count(&self) -> usize {
        self.subjects.len()
    }

    /// Ids of every subject currently tracked, in ascending order.
    pub fn subjects(&self) -> Vec<SubjectId> {
        let mut ids: Vec<SubjectId> = self.subjects.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn pipeline(&self, subject: SubjectId) -> Option<&FallPipeline> {
        self.subjects.get(&subject).map(|entry| &entry.pipeline)
    }

    /// `Idle` for subjects that are not tracked.
    pub fn status_of(&self, subject: SubjectId) -> FallStatus {
        self.pipeline(subject).map_or(FallStatus::Idle, FallPipeline::status)
    }

    /// The most recent analyzed tick of `subject`.
    pub fn latest(&self, subject: SubjectId) -> Option<&TickAnalysis> {
        self.subjects.get(&subject)?.latest.as_ref()
    }

    /// Counters summed over every subject, including dropped ones.
    pub fn stats(&self) -> PipelineStats {
        let mut total = self.retired;
        for entry in self.subjects.values() {
            total += entry.pipeline.stats();
        }
        total
    }

    /// Runs one tick through its subject's pipeline, then drops subjects that expired.
    pub fn process(&mut self, tick: &PoseTick) -> Report {
        let id = tick.subject;
        let entry = self.subjects.entry(id).or_insert_with(|| {
            info!(subject = id, now = tick.timestamp_ms, "tracking new subject");
            Subject {
                pipeline: FallPipeline::new(self.config.clone(), self.clock).with_subject(id),
                last_seen: tick.timestamp_ms,
                latest: None,
            }
        });
        entry.last_seen = entry.last_seen.max(tick.timestamp_ms);

        let report = entry.pipeline.process_tick(tick);
        if let Some(analysis) = report.analysis() {
            if analysis.changed {
                for sink in &mut self.sinks {
                    sink.status_changed(id, analysis.status);
                }
            }
            entry.latest = Some(analysis.clone());
        }
        if let Some(event) = report.event() {
            for sink in &mut self.sinks {
                sink.publish(event);
            }
        }

        self.evict_expired(tick.timestamp_ms);
        report
    }

    /// Drains `source`, returning the summed counters afterwards.
    pub fn run(&mut self, source: &mut impl PoseSource) -> PipelineStats {
        while let Some(tick) = source.next_tick() {
            let _ = self.process(&tick);
        }
        self.stats()
    }

    fn evict_expired(&mut self, now: Millis) {
        let timeout_ms = self.config.subject_timeout_ms;
        let sinks = &mut self.sinks;
        let retired = &mut self.retired;

        self.subjects.retain(|id, entry| {
            if !entry.is_expired(now, timeout_ms) {
                return true;
            }
            let status = entry.pipeline.status();
            if status != FallStatus::Idle {
                for sink in sinks.iter_mut() {
                    sink.status_changed(*id, FallStatus::Idle);
                }
            }
            *retired += entry.pipeline.stats();
            debug!(
                subject = *id,
                from = ?status,
                last_seen = entry.last_seen,
                now,
                "subject lost, detector dropped"
            );
            false
        });
    }
}
