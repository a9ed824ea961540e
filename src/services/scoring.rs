//! Points and streak aggregation over a single user's daily logs.
//!
//! Every function here is pure: `today` is passed in by the caller so the
//! same inputs always produce the same result. Callers must hand in at most
//! one log per date.

use chrono::{Datelike, Duration, NaiveDate};

use crate::models::daily_log::{DailyLog, HistoryDay};
use crate::models::stats::{Timeframe, UserStats};
use crate::models::user::User;

pub fn total_points(logs: &[DailyLog]) -> i64 {
    logs.iter().map(|log| i64::from(log.net_points())).sum()
}

/// First day (inclusive) counted by `timeframe`, or `None` when unbounded.
pub fn window_start(timeframe: Timeframe, today: NaiveDate) -> Option<NaiveDate> {
    match timeframe {
        Timeframe::Weekly => {
            let days_since_monday = today.weekday().num_days_from_monday();
            Some(today - Duration::days(days_since_monday as i64))
        }
        Timeframe::Monthly => today.with_day(1),
        Timeframe::AllTime => None,
    }
}

pub fn points_for_timeframe(logs: &[DailyLog], timeframe: Timeframe, today: NaiveDate) -> i64 {
    match window_start(timeframe, today) {
        Some(start) => logs
            .iter()
            .filter(|log| log.log_date >= start)
            .map(|log| i64::from(log.net_points()))
            .sum(),
        None => total_points(logs),
    }
}

/// Consecutive days with a workout, counting back from today.
pub fn workout_streak(logs: &[DailyLog], today: NaiveDate) -> u32 {
    streak(logs, today, |log| log.worked_out)
}

/// Consecutive days without alcohol, counting back from today.
pub fn clean_streak(logs: &[DailyLog], today: NaiveDate) -> u32 {
    streak(logs, today, |log| !log.drank_alcohol)
}

fn streak<F>(logs: &[DailyLog], today: NaiveDate, qualifies: F) -> u32
where
    F: Fn(&DailyLog) -> bool,
{
    let mut sorted: Vec<&DailyLog> = logs.iter().collect();
    sorted.sort_by(|a, b| b.log_date.cmp(&a.log_date));

    let mut count = 0u32;
    let mut expected = today;

    for log in sorted {
        if log.log_date == expected {
            if !qualifies(log) {
                break;
            }
            count += 1;
            expected = match expected.pred_opt() {
                Some(prev) => prev,
                None => break,
            };
        } else if log.log_date < expected {
            // Missing day
            break;
        }
    }

    count
}

pub fn today_log(logs: &[DailyLog], today: NaiveDate) -> Option<&DailyLog> {
    logs.iter().find(|log| log.log_date == today)
}

/// The last `days` calendar days ending today, oldest first.
pub fn history(logs: &[DailyLog], today: NaiveDate, days: u32) -> Vec<HistoryDay> {
    (0..days as i64)
        .rev()
        .map(|offset| {
            let date = today - Duration::days(offset);
            let log = logs.iter().find(|log| log.log_date == date).cloned();
            let net_points = log.as_ref().map(DailyLog::net_points).unwrap_or(0);
            HistoryDay {
                date,
                log,
                net_points,
            }
        })
        .collect()
}

pub fn user_stats(user: &User, logs: &[DailyLog], today: NaiveDate) -> UserStats {
    UserStats {
        user_id: user.id,
        username: user.username.clone(),
        avatar_url: user.avatar_url.clone(),
        total_points: total_points(logs),
        weekly_points: points_for_timeframe(logs, Timeframe::Weekly, today),
        monthly_points: points_for_timeframe(logs, Timeframe::Monthly, today),
        workout_streak: workout_streak(logs, today),
        clean_streak: clean_streak(logs, today),
    }
}
