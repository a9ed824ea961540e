//! In-process change feed for daily logs and group membership.

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::daily_log::DailyLog;
use crate::models::group::GroupMember;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A single row change. `old` holds the pre-change row for updates and
/// deletes; `new` holds the post-change row for inserts and updates.
#[derive(Debug, Clone)]
pub struct LogChange {
    pub kind: ChangeKind,
    pub new: Option<DailyLog>,
    pub old: Option<DailyLog>,
}

impl LogChange {
    pub fn inserted(log: DailyLog) -> Self {
        Self {
            kind: ChangeKind::Insert,
            new: Some(log),
            old: None,
        }
    }

    pub fn updated(old: DailyLog, new: DailyLog) -> Self {
        Self {
            kind: ChangeKind::Update,
            new: Some(new),
            old: Some(old),
        }
    }

    pub fn deleted(old: DailyLog) -> Self {
        Self {
            kind: ChangeKind::Delete,
            new: None,
            old: Some(old),
        }
    }

    /// The user whose log changed.
    pub fn user_id(&self) -> Option<Uuid> {
        self.new
            .as_ref()
            .or(self.old.as_ref())
            .map(|log| log.user_id)
    }
}

#[derive(Debug, Clone)]
pub enum FeedEvent {
    Log(LogChange),
    /// `logs` is the joiner's stored history, so open boards can rank them
    /// without going back to the store.
    MemberJoined {
        group_id: Uuid,
        member: GroupMember,
        logs: Vec<DailyLog>,
    },
}

pub type FeedSender = broadcast::Sender<FeedEvent>;

pub fn channel(capacity: usize) -> FeedSender {
    let (tx, _) = broadcast::channel(capacity.max(1));
    tx
}

/// Publishes to every live subscriber. Having none is not an error.
pub fn publish(feed: &FeedSender, event: FeedEvent) {
    match feed.send(event) {
        Ok(receivers) => tracing::debug!(receivers, "Feed event published"),
        Err(_) => tracing::trace!("Feed event dropped, no subscribers"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::daily_log::test_log;
    use chrono::NaiveDate;

    fn sample() -> DailyLog {
        test_log(Uuid::new_v4(), NaiveDate::from_ymd_opt(2026, 2, 11).unwrap(), true, false)
    }

    #[test]
    fn test_user_id_from_new_or_old() {
        let log = sample();
        assert_eq!(LogChange::inserted(log.clone()).user_id(), Some(log.user_id));
        assert_eq!(LogChange::deleted(log.clone()).user_id(), Some(log.user_id));
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let feed = channel(4);
        publish(&feed, FeedEvent::Log(LogChange::inserted(sample())));
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let feed = channel(4);
        let mut rx = feed.subscribe();
        let log = sample();
        publish(&feed, FeedEvent::Log(LogChange::inserted(log.clone())));

        match rx.recv().await.unwrap() {
            FeedEvent::Log(change) => {
                assert_eq!(change.kind, ChangeKind::Insert);
                assert_eq!(change.new.unwrap().id, log.id);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
