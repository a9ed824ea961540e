use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::Utc;
use validator::Validate;

use crate::auth::middleware::AuthUser;
use crate::db::queries;
use crate::error::{is_unique_violation, AppError, AppResult};
use crate::models::stats::UserStats;
use crate::models::user::{
    validate_username, UpdateProfileRequest, User, UsernameAvailability, UsernameQuery,
};
use crate::services::scoring;
use crate::AppState;

const USERNAME_CONSTRAINT: &str = "users_username_key";

/// An omitted avatar keeps the stored one.
const UPSERT_PROFILE: &str = r#"
    INSERT INTO users (id, username, avatar_url)
    VALUES ($1, $2, $3)
    ON CONFLICT (id) DO UPDATE SET
        username = EXCLUDED.username,
        avatar_url = COALESCE(EXCLUDED.avatar_url, users.avatar_url),
        updated_at = NOW()
    RETURNING *
"#;

pub async fn me(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<User>> {
    let user = queries::fetch_profile(&state.db, auth_user.id)
        .await?
        .ok_or(AppError::NotFound("Profile not found".into()))?;

    Ok(Json(user))
}

/// Creates the caller's profile on first use, updates it afterwards.
pub async fn upsert_profile(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<UpdateProfileRequest>,
) -> AppResult<Json<User>> {
    body.validate()?;
    let username = validate_username(&body.username)?;

    let result = sqlx::query_as::<_, User>(UPSERT_PROFILE)
        .bind(auth_user.id)
        .bind(&username)
        .bind(&body.avatar_url)
        .fetch_one(&state.db)
        .await;

    match result {
        Ok(user) => {
            tracing::info!(user_id = %user.id, username = %user.username, "Profile saved");
            Ok(Json(user))
        }
        Err(e) if is_unique_violation(&e, USERNAME_CONSTRAINT) => {
            Err(AppError::Validation("Username is already taken".into()))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn username_available(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<UsernameQuery>,
) -> AppResult<Json<UsernameAvailability>> {
    let username = validate_username(&query.username)?;

    // Keeping your own name counts as available
    let taken = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM users WHERE LOWER(username) = LOWER($1) AND id <> $2)",
    )
    .bind(&username)
    .bind(auth_user.id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(UsernameAvailability {
        username,
        available: !taken,
    }))
}

pub async fn my_stats(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<UserStats>> {
    let user = queries::fetch_profile(&state.db, auth_user.id)
        .await?
        .ok_or(AppError::NotFound("Profile not found".into()))?;
    let logs = queries::fetch_user_logs(&state.db, auth_user.id, None, None).await?;

    Ok(Json(scoring::user_stats(&user, &logs, Utc::now().date_naive())))
}
