use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::Utc;
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::db::queries;
use crate::error::{AppError, AppResult};
use crate::models::daily_log::{
    parse_log_date, DailyLog, DailyLogQuery, DailyLogResponse, HistoryDay, HistoryQuery,
    UpsertDailyLogRequest,
};
use crate::services::feed::{self, FeedEvent, LogChange};
use crate::services::scoring;
use crate::AppState;

const DEFAULT_HISTORY_DAYS: i64 = 30;
const MAX_HISTORY_DAYS: i64 = 366;

/// Serializes writers of one (user, date) until commit, so the second of
/// two concurrent first saves sees the first one's row.
const LOCK_LOG_DAY: &str =
    "SELECT pg_advisory_xact_lock(hashtextextended($1::text || '/' || $2::text, 0))";

/// `updated_at` is read after the lock is held, so revisions order the
/// same way as commits.
const UPSERT_LOG: &str = r#"
    INSERT INTO daily_logs (id, user_id, log_date, worked_out, drank_alcohol, smoked_weed, ate_junk_food, updated_at)
    VALUES ($1, $2, $3, COALESCE($4, FALSE), COALESCE($5, FALSE), COALESCE($6, FALSE), COALESCE($7, FALSE), clock_timestamp())
    ON CONFLICT (user_id, log_date) DO UPDATE SET
        worked_out = COALESCE($4, daily_logs.worked_out),
        drank_alcohol = COALESCE($5, daily_logs.drank_alcohol),
        smoked_weed = COALESCE($6, daily_logs.smoked_weed),
        ate_junk_food = COALESCE($7, daily_logs.ate_junk_food),
        updated_at = clock_timestamp()
    RETURNING *
"#;

pub async fn upsert_daily_log(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<UpsertDailyLogRequest>,
) -> AppResult<Json<DailyLogResponse>> {
    let today = Utc::now().date_naive();
    let log_date = body.log_date.unwrap_or(today);

    if log_date > today {
        return Err(AppError::Validation("log_date cannot be in the future".into()));
    }

    queries::require_profile(&state.db, auth_user.id).await?;

    let mut tx = state.db.begin().await?;

    sqlx::query(LOCK_LOG_DAY)
        .bind(auth_user.id)
        .bind(log_date)
        .execute(&mut *tx)
        .await?;

    // Pre-change row, so subscribers can tell a real transition from a re-save
    let previous = sqlx::query_as::<_, DailyLog>(
        "SELECT * FROM daily_logs WHERE user_id = $1 AND log_date = $2 FOR UPDATE",
    )
    .bind(auth_user.id)
    .bind(log_date)
    .fetch_optional(&mut *tx)
    .await?;

    let log = sqlx::query_as::<_, DailyLog>(UPSERT_LOG)
        .bind(Uuid::new_v4())
        .bind(auth_user.id)
        .bind(log_date)
        .bind(body.worked_out)
        .bind(body.drank_alcohol)
        .bind(body.smoked_weed)
        .bind(body.ate_junk_food)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(
        user_id = %auth_user.id,
        log_date = %log.log_date,
        net_points = log.net_points(),
        created = previous.is_none(),
        "Daily log saved"
    );

    let change = match previous {
        Some(old) => LogChange::updated(old, log.clone()),
        None => LogChange::inserted(log.clone()),
    };
    feed::publish(&state.feed, FeedEvent::Log(change));

    Ok(Json(log.into()))
}

pub async fn list_daily_logs(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<DailyLogQuery>,
) -> AppResult<Json<Vec<DailyLogResponse>>> {
    if let (Some(start), Some(end)) = (query.start_date, query.end_date) {
        if start > end {
            return Err(AppError::Validation("start_date must not be after end_date".into()));
        }
    }

    let logs =
        queries::fetch_user_logs(&state.db, auth_user.id, query.start_date, query.end_date).await?;

    Ok(Json(logs.into_iter().map(DailyLogResponse::from).collect()))
}

pub async fn get_today_log(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<Option<DailyLogResponse>>> {
    let today = Utc::now().date_naive();
    let logs = queries::fetch_user_logs(&state.db, auth_user.id, Some(today), Some(today)).await?;

    Ok(Json(
        scoring::today_log(&logs, today)
            .cloned()
            .map(DailyLogResponse::from),
    ))
}

/// Calendar of the most recent days, one slot per date.
pub async fn get_history(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<Vec<HistoryDay>>> {
    let days = query.days.unwrap_or(DEFAULT_HISTORY_DAYS);
    if !(1..=MAX_HISTORY_DAYS).contains(&days) {
        return Err(AppError::Validation(format!(
            "days must be between 1 and {}",
            MAX_HISTORY_DAYS
        )));
    }

    let today = Utc::now().date_naive();
    let since = today - chrono::Duration::days(days - 1);
    let logs = queries::fetch_user_logs(&state.db, auth_user.id, Some(since), Some(today)).await?;

    Ok(Json(scoring::history(&logs, today, days as u32)))
}

/// Removes the caller's log for one date. Used for corrections only.
pub async fn delete_daily_log(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(date): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let log_date = parse_log_date(&date)?;

    let removed = sqlx::query_as::<_, DailyLog>(
        "DELETE FROM daily_logs WHERE user_id = $1 AND log_date = $2 RETURNING *",
    )
    .bind(auth_user.id)
    .bind(log_date)
    .fetch_optional(&state.db)
    .await?;

    let deleted = match removed {
        Some(old) => {
            tracing::info!(user_id = %auth_user.id, log_date = %log_date, "Daily log deleted");
            feed::publish(&state.feed, FeedEvent::Log(LogChange::deleted(old)));
            true
        }
        None => false,
    };

    Ok(Json(serde_json::json!({ "deleted": deleted, "log_date": log_date })))
}
