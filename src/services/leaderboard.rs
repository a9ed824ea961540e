use std::collections::HashMap;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::daily_log::DailyLog;
use crate::models::group::GroupMember;
use crate::models::stats::{LeaderboardEntry, Timeframe};
use crate::services::scoring;

/// Builds ranked standings for `members`. Points follow `timeframe`;
/// streaks always cover the member's full history. Logs belonging to
/// anyone outside `members` are ignored.
pub fn rank_members(
    members: &[GroupMember],
    logs: &[DailyLog],
    timeframe: Timeframe,
    today: NaiveDate,
) -> Vec<LeaderboardEntry> {
    let mut by_user: HashMap<Uuid, Vec<DailyLog>> = HashMap::with_capacity(members.len());
    for log in logs {
        by_user.entry(log.user_id).or_default().push(log.clone());
    }

    let entries = members
        .iter()
        .map(|member| {
            let member_logs = by_user
                .get(&member.user_id)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            LeaderboardEntry {
                rank: 0,
                user_id: member.user_id,
                username: member.username.clone(),
                avatar_url: member.avatar_url.clone(),
                points: scoring::points_for_timeframe(member_logs, timeframe, today),
                workout_streak: scoring::workout_streak(member_logs, today),
                clean_streak: scoring::clean_streak(member_logs, today),
            }
        })
        .collect();

    assign_ranks(entries)
}

/// Points descending, then username ascending ignoring case. `user_id`
/// settles anything left so the order is total.
pub fn assign_ranks(mut entries: Vec<LeaderboardEntry>) -> Vec<LeaderboardEntry> {
    entries.sort_by(|a, b| {
        b.points
            .cmp(&a.points)
            .then_with(|| a.username.to_lowercase().cmp(&b.username.to_lowercase()))
            .then_with(|| a.user_id.cmp(&b.user_id))
    });

    for (index, entry) in entries.iter_mut().enumerate() {
        entry.rank = index as u32 + 1;
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::daily_log::test_log;
    use chrono::{Duration, Utc};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 11).unwrap()
    }

    fn member(username: &str) -> GroupMember {
        GroupMember {
            user_id: Uuid::new_v4(),
            username: username.into(),
            avatar_url: None,
            joined_at: Utc::now(),
        }
    }

    fn entry(username: &str, points: i64) -> LeaderboardEntry {
        LeaderboardEntry {
            rank: 0,
            user_id: Uuid::new_v4(),
            username: username.into(),
            avatar_url: None,
            points,
            workout_streak: 0,
            clean_streak: 0,
        }
    }

    fn names(entries: &[LeaderboardEntry]) -> Vec<(&str, u32)> {
        entries.iter().map(|e| (e.username.as_str(), e.rank)).collect()
    }

    #[test]
    fn test_tie_broken_by_username() {
        let ranked = assign_ranks(vec![entry("Bob", 10), entry("Alice", 10), entry("Zed", 5)]);
        assert_eq!(names(&ranked), vec![("Alice", 1), ("Bob", 2), ("Zed", 3)]);
    }

    #[test]
    fn test_tie_break_ignores_case() {
        let ranked = assign_ranks(vec![entry("bob", 3), entry("Alice", 3), entry("carol", 3)]);
        assert_eq!(names(&ranked), vec![("Alice", 1), ("bob", 2), ("carol", 3)]);
    }

    #[test]
    fn test_ranks_are_contiguous() {
        let ranked = assign_ranks(vec![
            entry("a", -2),
            entry("b", 7),
            entry("c", 0),
            entry("d", 7),
            entry("e", 1),
        ]);
        let mut ranks: Vec<u32> = ranked.iter().map(|e| e.rank).collect();
        ranks.sort();
        assert_eq!(ranks, vec![1, 2, 3, 4, 5]);
        assert!(ranked.windows(2).all(|w| w[0].points >= w[1].points));
    }

    #[test]
    fn test_empty_group() {
        assert!(rank_members(&[], &[], Timeframe::Weekly, today()).is_empty());
    }

    #[test]
    fn test_member_without_logs_scores_zero() {
        let alice = member("alice");
        let ranked = rank_members(&[alice.clone()], &[], Timeframe::AllTime, today());
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].points, 0);
        assert_eq!(ranked[0].workout_streak, 0);
        assert_eq!(ranked[0].rank, 1);
    }

    #[test]
    fn test_timeframe_changes_points_not_streaks() {
        let alice = member("alice");
        let bob = member("bob");
        let logs = vec![
            // alice: strong last month, nothing this week
            test_log(alice.user_id, NaiveDate::from_ymd_opt(2026, 1, 10).unwrap(), true, false),
            test_log(alice.user_id, NaiveDate::from_ymd_opt(2026, 1, 11).unwrap(), true, false),
            test_log(alice.user_id, NaiveDate::from_ymd_opt(2026, 1, 12).unwrap(), true, false),
            // bob: two days running this week
            test_log(bob.user_id, today(), true, false),
            test_log(bob.user_id, today() - Duration::days(1), true, false),
        ];
        let members = vec![alice.clone(), bob.clone()];

        let weekly = rank_members(&members, &logs, Timeframe::Weekly, today());
        assert_eq!(weekly[0].user_id, bob.user_id);
        assert_eq!(weekly[0].points, 2);
        assert_eq!(weekly[0].workout_streak, 2);
        assert_eq!(weekly[1].points, 0);

        let all_time = rank_members(&members, &logs, Timeframe::AllTime, today());
        assert_eq!(all_time[0].user_id, alice.user_id);
        assert_eq!(all_time[0].points, 3);
        assert_eq!(all_time[0].workout_streak, 0);
        assert_eq!(all_time[1].workout_streak, 2);
    }

    #[test]
    fn test_non_member_logs_ignored() {
        let alice = member("alice");
        let logs = vec![
            test_log(alice.user_id, today(), true, false),
            test_log(Uuid::new_v4(), today(), true, false),
        ];
        let ranked = rank_members(&[alice], &logs, Timeframe::Weekly, today());
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].points, 1);
    }

    #[test]
    fn test_ranking_is_deterministic() {
        let members: Vec<GroupMember> = ["dee", "Cat", "abe", "Bo"].iter().map(|n| member(n)).collect();
        let logs: Vec<DailyLog> = members
            .iter()
            .map(|m| test_log(m.user_id, today(), true, false))
            .collect();
        let first = rank_members(&members, &logs, Timeframe::Monthly, today());
        let second = rank_members(&members, &logs, Timeframe::Monthly, today());
        assert_eq!(first, second);
        assert_eq!(names(&first), vec![("abe", 1), ("Bo", 2), ("Cat", 3), ("dee", 4)]);
    }
}
