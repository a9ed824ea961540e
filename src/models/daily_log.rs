use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// One user's entry for one calendar day. Only the behavior flags are
/// persisted; points are always derived from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct DailyLog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub log_date: NaiveDate,
    pub worked_out: bool,
    pub drank_alcohol: bool,
    pub smoked_weed: bool,
    pub ate_junk_food: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DailyLog {
    /// +1 for a workout, -1 for each negative behavior.
    pub fn net_points(&self) -> i32 {
        let mut points = 0;
        if self.worked_out {
            points += 1;
        }
        for negative in [self.drank_alcohol, self.smoked_weed, self.ate_junk_food] {
            if negative {
                points -= 1;
            }
        }
        points
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyLogResponse {
    #[serde(flatten)]
    pub log: DailyLog,
    pub net_points: i32,
}

impl From<DailyLog> for DailyLogResponse {
    fn from(log: DailyLog) -> Self {
        let net_points = log.net_points();
        Self { log, net_points }
    }
}

/// Omitted flags keep their stored value (or default to false on insert).
#[derive(Debug, Deserialize)]
pub struct UpsertDailyLogRequest {
    pub log_date: Option<NaiveDate>,
    pub worked_out: Option<bool>,
    pub drank_alcohol: Option<bool>,
    pub smoked_weed: Option<bool>,
    pub ate_junk_food: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct DailyLogQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryDay {
    pub date: NaiveDate,
    pub log: Option<DailyLog>,
    pub net_points: i32,
}

pub fn parse_log_date(raw: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::Validation(format!("Invalid date '{}', expected YYYY-MM-DD", raw)))
}

#[cfg(test)]
pub(crate) fn test_log(user_id: Uuid, log_date: NaiveDate, worked_out: bool, drank_alcohol: bool) -> DailyLog {
    let now = Utc::now();
    DailyLog {
        id: Uuid::new_v4(),
        user_id,
        log_date,
        worked_out,
        drank_alcohol,
        smoked_weed: false,
        ate_junk_food: false,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_net_points_workout_only() {
        let log = test_log(Uuid::new_v4(), date(2026, 2, 10), true, false);
        assert_eq!(log.net_points(), 1);
    }

    #[test]
    fn test_net_points_workout_and_drink_cancel_out() {
        let log = test_log(Uuid::new_v4(), date(2026, 2, 10), true, true);
        assert_eq!(log.net_points(), 0);
    }

    #[test]
    fn test_net_points_all_negative_flags() {
        let mut log = test_log(Uuid::new_v4(), date(2026, 2, 10), false, true);
        log.smoked_weed = true;
        log.ate_junk_food = true;
        assert_eq!(log.net_points(), -3);
    }

    #[test]
    fn test_response_carries_derived_points() {
        let log = test_log(Uuid::new_v4(), date(2026, 2, 10), true, false);
        let json = serde_json::to_value(DailyLogResponse::from(log)).unwrap();
        assert_eq!(json["net_points"], 1);
        assert_eq!(json["log_date"], "2026-02-10");
        assert_eq!(json["worked_out"], true);
    }

    #[test]
    fn test_upsert_request_flags_are_optional() {
        let req: UpsertDailyLogRequest = serde_json::from_str(r#"{"worked_out":true}"#).unwrap();
        assert_eq!(req.worked_out, Some(true));
        assert!(req.drank_alcohol.is_none());
        assert!(req.log_date.is_none());
    }

    #[test]
    fn test_parse_log_date() {
        assert_eq!(parse_log_date("2026-02-10").unwrap(), date(2026, 2, 10));
        assert!(matches!(parse_log_date("2026-13-01"), Err(AppError::Validation(_))));
        assert!(matches!(parse_log_date("yesterday"), Err(AppError::Validation(_))));
    }
}
