use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::daily_log::DailyLog;
use crate::models::group::{Group, GroupMember};
use crate::models::user::User;

pub async fn fetch_profile(db: &PgPool, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(db)
        .await
}

/// Logs and groups reference the profile row, so writes need one first.
pub async fn require_profile(db: &PgPool, user_id: Uuid) -> AppResult<User> {
    fetch_profile(db, user_id).await?.ok_or_else(|| {
        AppError::Validation("Choose a username before logging or joining groups".into())
    })
}

/// Caller's logs, newest first, optionally bounded on either side.
pub async fn fetch_user_logs(
    db: &PgPool,
    user_id: Uuid,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<Vec<DailyLog>, sqlx::Error> {
    sqlx::query_as::<_, DailyLog>(
        r#"
        SELECT * FROM daily_logs
        WHERE user_id = $1
          AND ($2::date IS NULL OR log_date >= $2)
          AND ($3::date IS NULL OR log_date <= $3)
        ORDER BY log_date DESC
        "#,
    )
    .bind(user_id)
    .bind(start)
    .bind(end)
    .fetch_all(db)
    .await
}

pub async fn fetch_logs_for_users(
    db: &PgPool,
    user_ids: &[Uuid],
) -> Result<Vec<DailyLog>, sqlx::Error> {
    sqlx::query_as::<_, DailyLog>(
        r#"
        SELECT * FROM daily_logs
        WHERE user_id = ANY($1)
        ORDER BY log_date DESC
        "#,
    )
    .bind(user_ids)
    .fetch_all(db)
    .await
}

pub async fn fetch_members(db: &PgPool, group_id: Uuid) -> Result<Vec<GroupMember>, sqlx::Error> {
    sqlx::query_as::<_, GroupMember>(
        r#"
        SELECT gm.user_id, u.username, u.avatar_url, gm.joined_at
        FROM group_memberships gm
        JOIN users u ON u.id = gm.user_id
        WHERE gm.group_id = $1
        ORDER BY gm.joined_at ASC
        "#,
    )
    .bind(group_id)
    .fetch_all(db)
    .await
}

/// The group, provided `user_id` belongs to it.
pub async fn require_membership(db: &PgPool, group_id: Uuid, user_id: Uuid) -> AppResult<Group> {
    let group = sqlx::query_as::<_, Group>("SELECT * FROM groups WHERE id = $1")
        .bind(group_id)
        .fetch_optional(db)
        .await?
        .ok_or(AppError::NotFound("Group not found".into()))?;

    let is_member = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM group_memberships WHERE group_id = $1 AND user_id = $2)",
    )
    .bind(group_id)
    .bind(user_id)
    .fetch_one(db)
    .await?;

    if !is_member {
        return Err(AppError::Forbidden);
    }
    Ok(group)
}

/// Members plus every log they own: the seed for a leaderboard.
pub async fn fetch_group_snapshot(
    db: &PgPool,
    group_id: Uuid,
) -> Result<(Vec<GroupMember>, Vec<DailyLog>), sqlx::Error> {
    let members = fetch_members(db, group_id).await?;
    let ids: Vec<Uuid> = members.iter().map(|m| m.user_id).collect();
    let logs = fetch_logs_for_users(db, &ids).await?;
    Ok((members, logs))
}

pub async fn mark_prompt_shown(db: &PgPool, user_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE users SET notification_prompt_shown = true, updated_at = NOW() WHERE id = $1",
    )
    .bind(user_id)
    .execute(db)
    .await?;
    Ok(())
}
