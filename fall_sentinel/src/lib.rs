// THEORY:
// This file is the main entry point for the `fall_sentinel` library crate. It defines
// the public API exposed to whatever drives the engine: a capture loop on a phone, a
// desktop replay tool, or a test.
//
// The primary export is `FallPipeline` with its `Report` for a single person, the
// `SubjectRouter` for rooms with several, plus the async `MonitorService` and
// `EventBus` for callers that want the engine on its own task.
// The `core_modules` are public for inspection and tuning, but a consumer should
// never need to call them directly.

pub mod clip;
pub mod config;
pub mod core_modules;
pub mod error;
pub mod event_bus;
pub mod monitor_service;
pub mod pipeline;
pub mod subject_router;

pub use clip::{ClipSource, PoseSource, PoseTick, VecSource, read_clip};
pub use config::{DetectorConfig, Profile};
pub use core_modules::fall_event::EventClock;
pub use core_modules::landmark::landmark::NormalizedLandmark;
pub use core_modules::pose_frame::pose_frame::SubjectId;
pub use error::{ClipError, ConfigError, ServiceError};
pub use event_bus::{EventBus, StatusMap};
pub use monitor_service::{MonitorHandle, MonitorService};
pub use pipeline::{
    EventSink, FallEvent, FallFeatures, FallPipeline, FallStatus, PipelineStats, Report,
    Severity, TickAnalysis, TracingSink,
};
pub use subject_router::SubjectRouter;
