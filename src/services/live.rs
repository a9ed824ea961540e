//! Session-local cache of group logs kept in sync by the change feed.

use std::collections::HashMap;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::daily_log::DailyLog;
use crate::models::group::GroupMember;
use crate::models::stats::{LeaderboardEntry, Timeframe};
use crate::services::feed::{ChangeKind, FeedEvent, LogChange};
use crate::services::leaderboard;

/// Logs keyed by record identity. Holds at most one log per
/// `(user_id, log_date)`.
#[derive(Debug, Default, Clone)]
pub struct LogCollection {
    logs: HashMap<Uuid, DailyLog>,
}

impl LogCollection {
    pub fn from_logs(logs: impl IntoIterator<Item = DailyLog>) -> Self {
        let mut collection = Self::default();
        for log in logs {
            collection.insert(log);
        }
        collection
    }

    pub fn log_count(&self) -> usize {
        self.logs.len()
    }

    #[cfg(test)]
    pub fn get(&self, id: &Uuid) -> Option<&DailyLog> {
        self.logs.get(id)
    }

    pub fn to_vec(&self) -> Vec<DailyLog> {
        self.logs.values().cloned().collect()
    }

    /// Adds `log`, evicting any record with the same identity or the same
    /// user and date. A revision older than the one held is dropped, since
    /// feed events may arrive out of commit order. Returns whether `log`
    /// was stored.
    pub fn insert(&mut self, log: DailyLog) -> bool {
        let same_day: Vec<Uuid> = self
            .logs
            .values()
            .filter(|existing| {
                existing.id == log.id
                    || (existing.user_id == log.user_id && existing.log_date == log.log_date)
            })
            .map(|existing| existing.id)
            .collect();

        let stale = same_day
            .iter()
            .filter_map(|id| self.logs.get(id))
            .any(|existing| existing.updated_at > log.updated_at);
        if stale {
            return false;
        }

        for id in &same_day {
            self.logs.remove(id);
        }
        self.logs.insert(log.id, log);
        true
    }

    pub fn remove(&mut self, id: &Uuid) -> Option<DailyLog> {
        self.logs.remove(id)
    }

    /// Applies a feed change. Updates for unknown records become inserts.
    pub fn apply(&mut self, change: &LogChange) -> bool {
        match change.kind {
            ChangeKind::Insert | ChangeKind::Update => match &change.new {
                Some(log) => self.insert(log.clone()),
                None => false,
            },
            ChangeKind::Delete => {
                let id = change.old.as_ref().or(change.new.as_ref()).map(|log| log.id);
                match id {
                    Some(id) => self.remove(&id).is_some(),
                    None => false,
                }
            }
        }
    }
}

/// Live standings for one group, owned by a single session.
#[derive(Debug)]
pub struct LiveLeaderboard {
    group_id: Uuid,
    members: Vec<GroupMember>,
    logs: LogCollection,
    timeframe: Timeframe,
}

impl LiveLeaderboard {
    pub fn new(
        group_id: Uuid,
        members: Vec<GroupMember>,
        logs: Vec<DailyLog>,
        timeframe: Timeframe,
    ) -> Self {
        let mut board = Self {
            group_id,
            members: Vec::new(),
            logs: LogCollection::default(),
            timeframe,
        };
        board.load(members, logs);
        board
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn members(&self) -> &[GroupMember] {
        &self.members
    }

    pub fn cached_logs(&self) -> usize {
        self.logs.log_count()
    }

    pub fn member(&self, user_id: Uuid) -> Option<&GroupMember> {
        self.members.iter().find(|m| m.user_id == user_id)
    }

    pub fn standings(&self, today: NaiveDate) -> Vec<LeaderboardEntry> {
        leaderboard::rank_members(&self.members, &self.logs.to_vec(), self.timeframe, today)
    }

    /// Mutates the cache for `event` and returns fresh standings, or `None`
    /// when the event does not concern this group.
    pub fn apply(&mut self, event: &FeedEvent, today: NaiveDate) -> Option<Vec<LeaderboardEntry>> {
        match event {
            FeedEvent::Log(change) => {
                let user_id = change.user_id()?;
                self.member(user_id)?;
                self.logs.apply(change);
            }
            FeedEvent::MemberJoined {
                group_id,
                member,
                logs,
            } => {
                if *group_id != self.group_id || self.member(member.user_id).is_some() {
                    return None;
                }
                self.members.push(member.clone());
                for log in logs.iter().filter(|log| log.user_id == member.user_id) {
                    self.logs.insert(log.clone());
                }
            }
        }
        Some(self.standings(today))
    }

    pub fn set_timeframe(&mut self, timeframe: Timeframe, today: NaiveDate) -> Vec<LeaderboardEntry> {
        self.timeframe = timeframe;
        self.standings(today)
    }

    /// Replaces the cache wholesale, e.g. after missing feed events.
    pub fn reseed(
        &mut self,
        members: Vec<GroupMember>,
        logs: Vec<DailyLog>,
        today: NaiveDate,
    ) -> Vec<LeaderboardEntry> {
        self.load(members, logs);
        self.standings(today)
    }

    fn load(&mut self, members: Vec<GroupMember>, logs: Vec<DailyLog>) {
        let logs = logs
            .into_iter()
            .filter(|log| members.iter().any(|m| m.user_id == log.user_id));
        self.logs = LogCollection::from_logs(logs);
        self.members = members;
    }
}
