use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Aggregation window for leaderboard points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timeframe {
    /// Since the most recent Monday.
    #[default]
    #[serde(rename = "weekly")]
    Weekly,
    /// Since the first of the current month.
    #[serde(rename = "monthly")]
    Monthly,
    #[serde(rename = "all-time")]
    AllTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserStats {
    pub user_id: Uuid,
    pub username: String,
    pub avatar_url: Option<String>,
    pub total_points: i64,
    pub weekly_points: i64,
    pub monthly_points: i64,
    pub workout_streak: u32,
    pub clean_streak: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub user_id: Uuid,
    pub username: String,
    pub avatar_url: Option<String>,
    pub points: i64,
    pub workout_streak: u32,
    pub clean_streak: u32,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardResponse {
    pub group_id: Uuid,
    pub timeframe: Timeframe,
    pub entries: Vec<LeaderboardEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeframe_wire_names() {
        assert_eq!(serde_json::to_string(&Timeframe::AllTime).unwrap(), "\"all-time\"");
        assert_eq!(serde_json::to_string(&Timeframe::Weekly).unwrap(), "\"weekly\"");
        let parsed: Timeframe = serde_json::from_str("\"monthly\"").unwrap();
        assert_eq!(parsed, Timeframe::Monthly);
    }

    #[test]
    fn test_timeframe_rejects_unknown() {
        assert!(serde_json::from_str::<Timeframe>("\"yearly\"").is_err());
    }
}
