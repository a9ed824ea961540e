use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::auth::middleware::AuthUser;
use crate::db::queries;
use crate::error::{is_unique_violation, AppError, AppResult};
use crate::models::group::{
    CreateGroupRequest, CreatedGroup, Group, GroupDetail, GroupMember, GroupSummary,
    JoinGroupRequest, LeaderboardQuery,
};
use crate::models::stats::LeaderboardResponse;
use crate::services::feed::{self, FeedEvent};
use crate::services::{invite, leaderboard};
use crate::AppState;

const GROUP_NAME_CONSTRAINT: &str = "groups_name_key";
const INVITE_CODE_CONSTRAINT: &str = "groups_invite_code_key";
const MEMBERSHIP_CONSTRAINT: &str = "group_memberships_group_user_key";

pub async fn create_group(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<CreateGroupRequest>,
) -> AppResult<Json<CreatedGroup>> {
    let name = body.name.trim().to_string();
    CreateGroupRequest { name: name.clone() }.validate()?;

    queries::require_profile(&state.db, auth_user.id).await?;

    let group = insert_group(&state.db, &name, auth_user.id, state.config.invite_code_attempts).await?;

    tracing::info!(group_id = %group.id, created_by = %auth_user.id, "Group created");

    // The group stands even if the creator's membership can't be written
    let joined = match insert_membership(&state.db, group.id, auth_user.id).await {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!(
                group_id = %group.id,
                user_id = %auth_user.id,
                error = %e,
                "Auto-join after group creation failed"
            );
            false
        }
    };

    Ok(Json(CreatedGroup { group, joined }))
}

/// Inserts the group, drawing a fresh invite code on each collision.
async fn insert_group(db: &PgPool, name: &str, created_by: Uuid, attempts: u32) -> AppResult<Group> {
    for attempt in 1..=attempts.max(1) {
        let code = invite::generate_invite_code(&mut rand::thread_rng());

        let result = sqlx::query_as::<_, Group>(
            r#"
            INSERT INTO groups (id, name, invite_code, created_by)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(&code)
        .bind(created_by)
        .fetch_one(db)
        .await;

        match result {
            Ok(group) => return Ok(group),
            Err(e) if is_unique_violation(&e, INVITE_CODE_CONSTRAINT) => {
                tracing::debug!(attempt, "Invite code collision, retrying");
            }
            Err(e) if is_unique_violation(&e, GROUP_NAME_CONSTRAINT) => {
                return Err(AppError::Conflict("Group name is already taken".into()));
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(AppError::Internal(anyhow::anyhow!(
        "No unique invite code after {} attempts",
        attempts
    )))
}

async fn insert_membership(db: &PgPool, group_id: Uuid, user_id: Uuid) -> Result<GroupMember, sqlx::Error> {
    sqlx::query_as::<_, GroupMember>(
        r#"
        WITH inserted AS (
            INSERT INTO group_memberships (id, group_id, user_id)
            VALUES ($1, $2, $3)
            RETURNING user_id, joined_at
        )
        SELECT i.user_id, u.username, u.avatar_url, i.joined_at
        FROM inserted i
        JOIN users u ON u.id = i.user_id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(group_id)
    .bind(user_id)
    .fetch_one(db)
    .await
}

pub async fn join_group(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<JoinGroupRequest>,
) -> AppResult<Json<Group>> {
    let code = invite::normalize_invite_code(&body.invite_code)?;

    queries::require_profile(&state.db, auth_user.id).await?;

    let group = sqlx::query_as::<_, Group>("SELECT * FROM groups WHERE invite_code = $1")
        .bind(&code)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::Validation("Invalid invite code".into()))?;

    let member = match insert_membership(&state.db, group.id, auth_user.id).await {
        Ok(member) => member,
        Err(e) if is_unique_violation(&e, MEMBERSHIP_CONSTRAINT) => {
            return Err(AppError::Conflict("You are already a member of this group".into()));
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!(group_id = %group.id, user_id = %auth_user.id, "Joined group");

    // Open boards never loaded the joiner's history
    let logs = queries::fetch_user_logs(&state.db, auth_user.id, None, None).await?;
    feed::publish(
        &state.feed,
        FeedEvent::MemberJoined {
            group_id: group.id,
            member,
            logs,
        },
    );

    Ok(Json(group))
}

pub async fn list_groups(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<Vec<GroupSummary>>> {
    let groups = sqlx::query_as::<_, GroupSummary>(
        r#"
        SELECT g.id, g.name, g.invite_code, g.created_by, g.created_at, gm.joined_at,
               (SELECT COUNT(*) FROM group_memberships c WHERE c.group_id = g.id) AS member_count
        FROM group_memberships gm
        JOIN groups g ON g.id = gm.group_id
        WHERE gm.user_id = $1
        ORDER BY gm.joined_at DESC
        "#,
    )
    .bind(auth_user.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(groups))
}

pub async fn get_group(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(group_id): Path<Uuid>,
) -> AppResult<Json<GroupDetail>> {
    let group = queries::require_membership(&state.db, group_id, auth_user.id).await?;
    let members = queries::fetch_members(&state.db, group_id).await?;

    Ok(Json(GroupDetail { group, members }))
}

pub async fn get_leaderboard(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(group_id): Path<Uuid>,
    Query(query): Query<LeaderboardQuery>,
) -> AppResult<Json<LeaderboardResponse>> {
    queries::require_membership(&state.db, group_id, auth_user.id).await?;
    let (members, logs) = queries::fetch_group_snapshot(&state.db, group_id).await?;

    let entries = leaderboard::rank_members(&members, &logs, query.timeframe, Utc::now().date_naive());

    Ok(Json(LeaderboardResponse {
        group_id,
        timeframe: query.timeframe,
        entries,
    }))
}
