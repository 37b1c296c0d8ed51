use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use pkg_constants::state::NOTIFICATION_CHANNEL_CAPACITY;
use pkg_types::event::{Event, EventType, Notification, ObjectReference};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

/// Append-only, time-windowed log of lifecycle events.
///
/// Every recorded event is also broadcast to subscribers, along with any
/// other [`Notification`] published through [`EventLog::publish`].
#[derive(Debug)]
pub struct EventLog {
    inner: Mutex<EventLogInner>,
    sender: broadcast::Sender<Notification>,
}

#[derive(Debug, Default)]
struct EventLogInner {
    seq: u64,
    /// Oldest first; timestamps are non-decreasing.
    events: VecDeque<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(NOTIFICATION_CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(EventLogInner::default()),
            sender,
        }
    }

    /// Append an event stamped `now`. A repeat of the most recent entry (same
    /// object, type, reason and message) bumps its count instead.
    pub fn record(
        &self,
        now: DateTime<Utc>,
        event_type: EventType,
        reason: &str,
        message: impl Into<String>,
        involved_object: ObjectReference,
    ) -> Event {
        let message = message.into();
        let mut inner = self.inner.lock();

        let folded = match inner.events.back_mut() {
            Some(last)
                if last.involved_object == involved_object
                    && last.event_type == event_type
                    && last.reason == reason
                    && last.message == message =>
            {
                last.count += 1;
                last.timestamp = now;
                Some(last.clone())
            }
            _ => None,
        };
        if let Some(event) = folded {
            drop(inner);
            let _ = self.sender.send(Notification::Event(event.clone()));
            return event;
        }

        inner.seq += 1;
        let event = Event {
            seq: inner.seq,
            event_type,
            reason: reason.to_string(),
            message,
            involved_object,
            timestamp: now,
            first_timestamp: now,
            count: 1,
        };
        inner.events.push_back(event.clone());
        drop(inner);

        debug!(
            "event {} {} {}/{}: {}",
            event.event_type,
            event.reason,
            event.involved_object.namespace,
            event.involved_object.name,
            event.message
        );
        // Broadcast to subscribers (ignore errors if no receivers)
        let _ = self.sender.send(Notification::Event(event.clone()));
        event
    }

    /// Events whose involved object lives in `namespace`, or all events.
    pub fn list(&self, namespace: Option<&str>) -> Vec<Event> {
        let inner = self.inner.lock();
        inner
            .events
            .iter()
            .filter(|e| namespace.is_none_or(|ns| e.involved_object.namespace == ns))
            .cloned()
            .collect()
    }

    /// Get all events since the given sequence number.
    pub fn events_since(&self, from_seq: u64) -> Vec<Event> {
        let inner = self.inner.lock();
        inner
            .events
            .iter()
            .filter(|e| e.seq > from_seq)
            .cloned()
            .collect()
    }

    /// Drop events last seen before `now - retention`. Returns how many went.
    pub fn prune(&self, now: DateTime<Utc>, retention: Duration) -> usize {
        let Ok(retention) = chrono::Duration::from_std(retention) else {
            return 0;
        };
        let cutoff = now - retention;
        let mut inner = self.inner.lock();
        let before = inner.events.len();
        inner.events.retain(|e| e.timestamp >= cutoff);
        before - inner.events.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every event. Sequence numbers keep growing.
    pub fn clear(&self) {
        self.inner.lock().events.clear();
    }

    /// Broadcast a notification that is not itself a logged event.
    pub fn publish(&self, notification: Notification) {
        let _ = self.sender.send(notification);
    }

    /// Subscribe to receive new notifications as they are emitted. Dropping
    /// the receiver ends the subscription.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_types::ResourceKind;

    fn pod_ref(ns: &str, name: &str) -> ObjectReference {
        ObjectReference {
            kind: ResourceKind::Pod,
            namespace: ns.to_string(),
            name: name.to_string(),
            uid: format!("{}-uid", name),
        }
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn list_filters_by_namespace() {
        let log = EventLog::new();
        log.record(t0(), EventType::Normal, "Created", "a", pod_ref("ns1", "a"));
        log.record(t0(), EventType::Normal, "Created", "b", pod_ref("ns2", "b"));
        assert_eq!(log.list(None).len(), 2);
        let ns1 = log.list(Some("ns1"));
        assert_eq!(ns1.len(), 1);
        assert_eq!(ns1[0].involved_object.name, "a");
    }

    #[test]
    fn repeats_fold_into_count() {
        let log = EventLog::new();
        let r = pod_ref("ns1", "a");
        log.record(t0(), EventType::Warning, "BackOff", "crash", r.clone());
        let later = t0() + chrono::Duration::seconds(5);
        let e = log.record(later, EventType::Warning, "BackOff", "crash", r);
        assert_eq!(e.count, 2);
        assert_eq!(e.first_timestamp, t0());
        assert_eq!(e.timestamp, later);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn prune_drops_events_outside_window() {
        let log = EventLog::new();
        log.record(t0(), EventType::Normal, "Created", "old", pod_ref("ns1", "a"));
        let later = t0() + chrono::Duration::minutes(50);
        log.record(later, EventType::Normal, "Created", "new", pod_ref("ns1", "b"));

        let now = t0() + chrono::Duration::minutes(61);
        let removed = log.prune(now, Duration::from_secs(3600));
        assert_eq!(removed, 1);
        let left = log.list(None);
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].message, "new");
    }

    #[test]
    fn sequence_numbers_increase() {
        let log = EventLog::new();
        log.record(t0(), EventType::Normal, "A", "1", pod_ref("ns1", "a"));
        log.record(t0(), EventType::Normal, "B", "2", pod_ref("ns1", "a"));
        log.record(t0(), EventType::Normal, "C", "3", pod_ref("ns1", "a"));
        let since = log.events_since(1);
        assert_eq!(since.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![2, 3]);
    }

    #[tokio::test]
    async fn subscribers_receive_events() {
        let log = EventLog::new();
        let mut rx = log.subscribe();
        log.record(t0(), EventType::Warning, "Failed", "boom", pod_ref("ns1", "p1"));
        match rx.recv().await.unwrap() {
            Notification::Event(e) => assert_eq!(e.reason, "Failed"),
            other => panic!("unexpected notification {:?}", other),
        }
    }
}
