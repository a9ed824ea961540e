use jsonwebtoken::{decode, DecodingKey, TokenData, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};

/// Access-token claims issued by the identity provider. `sub` is the user id.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

pub fn verify_token(token: &str, config: &Config) -> AppResult<TokenData<Claims>> {
    let mut validation = Validation::default();
    validation.validate_exp = true;
    match &config.jwt_audience {
        Some(aud) => validation.set_audience(&[aud]),
        None => validation.validate_aud = false,
    }

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )
    .map_err(|e| {
        tracing::debug!(error = %e, "Token rejected");
        AppError::Unauthorized
    })
}

#[cfg(test)]
pub(crate) fn issue_test_token(user_id: Uuid, ttl_secs: i64, config: &Config) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: user_id,
        exp: now + ttl_secs,
        iat: Some(now),
        email: Some("test@example.com".into()),
        aud: config.jwt_audience.clone(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .unwrap()
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        database_url: "postgres://localhost/streakboard_test".into(),
        host: "127.0.0.1".into(),
        port: 0,
        frontend_url: "http://localhost:3000".into(),
        cors_extra_origins: vec![],
        jwt_secret: "test-secret".into(),
        jwt_audience: None,
        invite_code_attempts: 5,
        feed_capacity: 16,
        join_rate_limit: 10,
        join_rate_window_secs: 600,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_token_round_trip() {
        let config = test_config();
        let user_id = Uuid::new_v4();
        let token = issue_test_token(user_id, 300, &config);
        let data = verify_token(&token, &config).unwrap();
        assert_eq!(data.claims.sub, user_id);
    }

    #[test]
    fn test_expired_token_rejected() {
        let config = test_config();
        let token = issue_test_token(Uuid::new_v4(), -3600, &config);
        assert!(matches!(verify_token(&token, &config), Err(AppError::Unauthorized)));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let config = test_config();
        let token = issue_test_token(Uuid::new_v4(), 300, &config);
        let mut other = test_config();
        other.jwt_secret = "another-secret".into();
        assert!(verify_token(&token, &other).is_err());
    }

    #[test]
    fn test_audience_enforced_when_configured() {
        let mut config = test_config();
        config.jwt_audience = Some("authenticated".into());
        let token = issue_test_token(Uuid::new_v4(), 300, &config);
        assert!(verify_token(&token, &config).is_ok());

        let mut strict = config.clone();
        strict.jwt_audience = Some("service_role".into());
        assert!(verify_token(&token, &strict).is_err());
    }
}
