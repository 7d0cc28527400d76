use crate::core_modules::fall_event::FallEvent;
use crate::core_modules::fall_state::FallStatus;
use crate::core_modules::pose_frame::pose_frame::SubjectId;
use crate::pipeline::EventSink;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

pub const DEFAULT_EVENT_CAPACITY: usize = 16;

/// Status of every subject that is not idle.
pub type StatusMap = BTreeMap<SubjectId, FallStatus>;

/// In-process fan-out of pipeline output.
///
/// Every subscriber sees every event published after it subscribed. Statuses are a
/// `watch` so late subscribers still read the current values.
#[derive(Clone)]
pub struct EventBus {
    events_tx: broadcast::Sender<FallEvent>,
    status_tx: Arc<watch::Sender<StatusMap>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (events_tx, _) = broadcast::channel::<FallEvent>(capacity.max(1));
        let (status_tx, _) = watch::channel(StatusMap::new());
        Self {
            events_tx,
            status_tx: Arc::new(status_tx),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FallEvent> {
        self.events_tx.subscribe()
    }

    pub fn watch_status(&self) -> watch::Receiver<StatusMap> {
        self.status_tx.subscribe()
    }

    /// `Idle` for subjects the bus has never heard of.
    pub fn status_of(&self, subject: SubjectId) -> FallStatus {
        self.status_tx
            .borrow()
            .get(&subject)
            .copied()
            .unwrap_or_default()
    }

    /// Subjects whose fall is currently confirmed.
    pub fn alerting(&self) -> Vec<SubjectId> {
        self.status_tx
            .borrow()
            .iter()
            .filter(|(_, status)| **status == FallStatus::Confirmed)
            .map(|(subject, _)| *subject)
            .collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.events_tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventSink for EventBus {
    fn publish(&mut self, event: &FallEvent) {
        // No subscribers is fine.
        let _ = self.events_tx.send(event.clone());
    }

    fn status_changed(&mut self, subject: SubjectId, status: FallStatus) {
        self.status_tx.send_modify(|statuses| {
            if status == FallStatus::Idle {
                statuses.remove(&subject);
            } else {
                statuses.insert(subject, status);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::fall_event::{EventClock, EventFactory, EventIds};
    use crate::core_modules::feature_extractor::FallFeatures;
    use crate::config::DetectorConfig;
    use tokio::sync::broadcast::error::TryRecvError;

    fn event() -> FallEvent {
        let mut factory = EventFactory::new(EventClock::starting_now(0), EventIds::Uuid);
        let features = FallFeatures::new(0.4, 0.6, 75.0, 0.0, 0.9, &DetectorConfig::default());
        factory.build(features, 0)
    }

    #[test]
    fn publishing_without_subscribers_is_harmless() {
        let mut bus = EventBus::default();
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(&event());
    }

    #[tokio::test]
    async fn every_subscriber_receives_each_event() {
        let mut bus = EventBus::new(4);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        let fall = event();
        bus.publish(&fall);

        assert_eq!(first.recv().await.unwrap(), fall);
        assert_eq!(second.recv().await.unwrap(), fall);
        assert!(matches!(first.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn status_watch_tracks_latest_value() {
        let mut bus = EventBus::default();
        let mut status = bus.watch_status();
        assert!(status.borrow().is_empty());
        assert_eq!(bus.status_of(0), FallStatus::Idle);

        bus.status_changed(0, FallStatus::Suspected);
        bus.status_changed(0, FallStatus::Confirmed);
        status.changed().await.unwrap();
        assert_eq!(status.borrow_and_update().get(&0), Some(&FallStatus::Confirmed));
        assert_eq!(bus.status_of(0), FallStatus::Confirmed);

        let late = bus.watch_status();
        assert_eq!(late.borrow().get(&0), Some(&FallStatus::Confirmed));
    }

    #[test]
    fn statuses_are_kept_per_subject() {
        let mut bus = EventBus::default();
        bus.status_changed(1, FallStatus::Confirmed);
        bus.status_changed(2, FallStatus::Suspected);
        bus.status_changed(3, FallStatus::Confirmed);
        assert_eq!(bus.alerting(), vec![1, 3]);
        assert_eq!(bus.status_of(2), FallStatus::Suspected);

        bus.status_changed(1, FallStatus::Cooldown);
        bus.status_changed(2, FallStatus::Idle);
        assert_eq!(bus.alerting(), vec![3]);
        let statuses = bus.watch_status().borrow().clone();
        assert_eq!(statuses.keys().copied().collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn clones_share_channels() {
        let bus = EventBus::default();
        let mut publisher = bus.clone();
        let mut rx = bus.subscribe();
        publisher.publish(&event());
        assert!(rx.try_recv().is_ok());
    }
}
