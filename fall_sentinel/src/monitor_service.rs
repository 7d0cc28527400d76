// THEORY:
// The `MonitorService` is the async face of the engine. A capture loop runs at its
// own pace; the detectors must see ticks one at a time and in order. The service
// reconciles the two by moving a `SubjectRouter` into a single tokio task that owns
// it outright, and by refusing to queue.
//
// Key architectural principles:
// 1.  **Exclusive Ownership**: Exactly one task holds the router and every subject's
//     pipeline inside it. There are no locks because there is nothing shared.
// 2.  **Skip, Don't Queue**: `submit` uses `try_send` on a one-slot channel. When the
//     slot is taken the tick is dropped and the caller is told so. A stale tick is
//     worth less than the next fresh one.
// 3.  **Awaited Path for Replays**: `process` waits for room and for the resulting
//     `Report`, so recorded clips lose nothing.

use crate::clip::PoseTick;
use crate::error::ServiceError;
use crate::event_bus::EventBus;
use crate::pipeline::{PipelineStats, Report};
use crate::subject_router::SubjectRouter;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, trace};

const TICK_SLOTS: usize = 1;

struct TickJob {
    tick: PoseTick,
    reply: Option<oneshot::Sender<Report>>,
}

pub struct MonitorService;

impl MonitorService {
    /// Moves `router` into a new task that publishes to `bus`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(mut router: SubjectRouter, bus: EventBus) -> MonitorHandle {
        let (tick_tx, mut tick_rx) = mpsc::channel::<TickJob>(TICK_SLOTS);
        router.add_sink(Box::new(bus.clone()));

        let task = tokio::spawn(async move {
            info!(subjects = router.subject_count(), "fall monitor started");
            while let Some(job) = tick_rx.recv().await {
                let report = router.process(&job.tick);
                if let Some(reply) = job.reply {
                    let _ = reply.send(report);
                }
            }
            let stats = router.stats();
            info!(
                ticks = stats.ticks,
                skipped = stats.skipped,
                events = stats.events,
                "fall monitor stopped"
            );
            stats
        });

        MonitorHandle { tick_tx, task, bus }
    }
}

pub struct MonitorHandle {
    tick_tx: mpsc::Sender<TickJob>,
    task: JoinHandle<PipelineStats>,
    bus: EventBus,
}

impl MonitorHandle {
    /// Offers a tick without waiting.
    ///
    /// Returns `Ok(false)` when the monitor is still busy and the tick was dropped.
    pub fn submit(&self, tick: PoseTick) -> Result<bool, ServiceError> {
        let (timestamp_ms, subject) = (tick.timestamp_ms, tick.subject);
        match self.tick_tx.try_send(TickJob { tick, reply: None }) {
            Ok(()) => Ok(true),
            Err(mpsc::error::TrySendError::Full(_)) => {
                trace!(timestamp_ms, subject, "monitor busy, tick dropped");
                Ok(false)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(ServiceError::Stopped),
        }
    }

    /// Sends a tick and waits for its report.
    pub async fn process(&self, tick: PoseTick) -> Result<Report, ServiceError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tick_tx
            .send(TickJob {
                tick,
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| ServiceError::Stopped)?;
        reply_rx.await.map_err(|_| ServiceError::Stopped)
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Stops accepting ticks, lets the task finish what it holds, and returns the
    /// counters summed over every subject.
    pub async fn shutdown(self) -> Result<PipelineStats, ServiceError> {
        let MonitorHandle { tick_tx, task, .. } = self;
        drop(tick_tx);
        Ok(task.await?)
    }
}
