//! In-process pub/sub for live record updates.
//!
//! Each group owns a tokio broadcast channel created on first subscription.
//! Publishing to a group nobody listens to is a no-op.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tokio::sync::broadcast;

use crate::domain::error::ScreenerError;
use crate::domain::notification::Notification;
use crate::ports::notify_port::NotifyPort;

pub struct BroadcastNotifier {
    capacity: usize,
    groups: Mutex<HashMap<String, broadcast::Sender<Notification>>>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            groups: Mutex::new(HashMap::new()),
        }
    }

    /// Join `group`. Messages published before this call are not replayed.
    pub fn subscribe(&self, group: &str) -> broadcast::Receiver<Notification> {
        let mut groups = self.groups.lock().unwrap_or_else(PoisonError::into_inner);
        groups
            .entry(group.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub fn subscriber_count(&self, group: &str) -> usize {
        let groups = self.groups.lock().unwrap_or_else(PoisonError::into_inner);
        groups.get(group).map_or(0, broadcast::Sender::receiver_count)
    }
}

impl NotifyPort for BroadcastNotifier {
    fn publish(&self, group: &str, notification: &Notification) -> Result<usize, ScreenerError> {
        let groups = self.groups.lock().map_err(|e| ScreenerError::Notify {
            reason: e.to_string(),
        })?;
        let Some(sender) = groups.get(group) else {
            return Ok(0);
        };
        // send only fails when every receiver is gone
        Ok(sender.send(notification.clone()).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ema_record::tests::sample_record;
    use crate::domain::notification::DEFAULT_GROUP;

    #[test]
    fn publish_without_subscribers_reaches_nobody() {
        let notifier = BroadcastNotifier::new(8);
        let notification = Notification::created(&sample_record());
        assert_eq!(notifier.publish(DEFAULT_GROUP, &notification).unwrap(), 0);
    }

    #[tokio::test]
    async fn subscribers_receive_in_order() {
        let notifier = BroadcastNotifier::new(8);
        let mut first = notifier.subscribe(DEFAULT_GROUP);
        let mut second = notifier.subscribe(DEFAULT_GROUP);

        let before = sample_record();
        let mut after = before.clone();
        after.trend = -1;
        let created = Notification::created(&before);
        let updated = Notification::updated(&before, &after).unwrap();

        assert_eq!(notifier.publish(DEFAULT_GROUP, &created).unwrap(), 2);
        assert_eq!(notifier.publish(DEFAULT_GROUP, &updated).unwrap(), 2);

        for rx in [&mut first, &mut second] {
            assert_eq!(rx.recv().await.unwrap(), created);
            assert_eq!(rx.recv().await.unwrap(), updated);
        }
    }

    #[tokio::test]
    async fn groups_are_isolated() {
        let notifier = BroadcastNotifier::new(8);
        let mut other = notifier.subscribe("other");
        let _ = notifier.subscribe(DEFAULT_GROUP);
        notifier
            .publish(DEFAULT_GROUP, &Notification::created(&sample_record()))
            .unwrap();
        assert!(other.try_recv().is_err());
    }

    #[test]
    fn dropped_receivers_are_not_counted() {
        let notifier = BroadcastNotifier::new(8);
        let rx = notifier.subscribe(DEFAULT_GROUP);
        assert_eq!(notifier.subscriber_count(DEFAULT_GROUP), 1);
        drop(rx);
        assert_eq!(notifier.subscriber_count(DEFAULT_GROUP), 0);
        let notification = Notification::created(&sample_record());
        assert_eq!(notifier.publish(DEFAULT_GROUP, &notification).unwrap(), 0);
    }
}
