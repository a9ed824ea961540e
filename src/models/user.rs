use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub avatar_url: Option<String>,
    #[serde(skip_serializing)]
    pub notification_prompt_shown: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 3, max = 30, message = "Username must be 3-30 characters"))]
    pub username: String,

    #[validate(url(message = "Avatar must be a valid URL"))]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UsernameQuery {
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct UsernameAvailability {
    pub username: String,
    pub available: bool,
}

/// Usernames are letters, digits and underscores. Uniqueness is
/// case-insensitive and enforced by the store.
pub fn validate_username(raw: &str) -> AppResult<String> {
    let username = raw.trim();
    if username.len() < 3 || username.len() > 30 {
        return Err(AppError::Validation(
            "Username must be 3-30 characters".into(),
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(AppError::Validation(
            "Username may only contain letters, numbers and underscores".into(),
        ));
    }
    Ok(username.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_username_trims() {
        assert_eq!(validate_username("  gym_rat ").unwrap(), "gym_rat");
    }

    #[test]
    fn test_validate_username_rejects_symbols() {
        assert!(validate_username("no spaces").is_err());
        assert!(validate_username("emoji💪").is_err());
    }

    #[test]
    fn test_validate_username_length() {
        assert!(validate_username("ab").is_err());
        assert!(validate_username(&"a".repeat(31)).is_err());
        assert!(validate_username("abc").is_ok());
    }

    #[test]
    fn test_profile_request_validation() {
        let ok = UpdateProfileRequest {
            username: "alice".into(),
            avatar_url: Some("https://example.com/a.png".into()),
        };
        assert!(ok.validate().is_ok());

        let bad = UpdateProfileRequest {
            username: "alice".into(),
            avatar_url: Some("not a url".into()),
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_prompt_marker_not_serialized() {
        let user = User {
            id: Uuid::new_v4(),
            username: "alice".into(),
            avatar_url: None,
            notification_prompt_shown: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("notification_prompt_shown").is_none());
        assert_eq!(json["username"], "alice");
    }
}
