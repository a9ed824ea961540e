use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{NaiveDate, Utc};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::auth::jwt::verify_token;
use crate::db::queries;
use crate::error::AppError;
use crate::models::stats::{LeaderboardEntry, Timeframe};
use crate::services::feed::FeedEvent;
use crate::services::live::LiveLeaderboard;
use crate::services::notify::{
    self, NotificationCapability, PermissionState, SessionPermissions, WorkoutNotice,
};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: Option<String>,
    group_id: Uuid,
    #[serde(default)]
    timeframe: Timeframe,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerFrame<'a> {
    Leaderboard {
        timeframe: Timeframe,
        entries: &'a [LeaderboardEntry],
    },
    WorkoutNotice(&'a WorkoutNotice),
    PromptNotifications,
    /// Ask the browser for notification permission and report back.
    RequestPermission,
    Permission {
        state: PermissionState,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    SetTimeframe { timeframe: Timeframe },
    Permission { state: PermissionState },
    EnableNotifications,
}

type Sender = SplitSink<WebSocket, Message>;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Response {
    // Browsers cannot set headers on upgrade requests, so the token rides in the query
    let user_id = match query.token.as_deref().map(|t| verify_token(t, &state.config)) {
        Some(Ok(data)) => data.claims.sub,
        Some(Err(_)) | None => {
            tracing::warn!("WebSocket auth failed");
            return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
        }
    };

    if let Err(e) = queries::require_membership(&state.db, query.group_id, user_id).await {
        return e.into_response();
    }

    let prompt_shown = match queries::fetch_profile(&state.db, user_id).await {
        Ok(profile) => profile.map(|p| p.notification_prompt_shown).unwrap_or(false),
        Err(e) => return AppError::from(e).into_response(),
    };

    ws.on_upgrade(move |socket| {
        handle_socket(socket, state, user_id, query.group_id, query.timeframe, prompt_shown)
    })
}

async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    user_id: Uuid,
    group_id: Uuid,
    timeframe: Timeframe,
    prompt_shown: bool,
) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before seeding so nothing published in between is lost
    let mut feed = state.feed.subscribe();

    let (members, logs) = match queries::fetch_group_snapshot(&state.db, group_id).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::error!(error = %e, group_id = %group_id, "Failed to seed live leaderboard");
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };

    let mut board = LiveLeaderboard::new(group_id, members, logs, timeframe);
    let mut permissions = SessionPermissions::new(prompt_shown);

    tracing::debug!(
        user_id = %user_id,
        group_id = %group_id,
        cached_logs = board.cached_logs(),
        "Live leaderboard session started"
    );

    if !send_standings(&mut sender, &board, &board.standings(today())).await {
        return;
    }

    if notify::should_prompt(&permissions) {
        if !send_frame(&mut sender, &ServerFrame::PromptNotifications).await {
            return;
        }
        permissions.mark_prompt_shown();
        if let Err(e) = queries::mark_prompt_shown(&state.db, user_id).await {
            tracing::warn!(error = %e, user_id = %user_id, "Failed to persist prompt marker");
        }
    }

    loop {
        tokio::select! {
            event = feed.recv() => {
                let delivered = match event {
                    Ok(event) => {
                        on_feed_event(&mut sender, &mut board, &permissions, user_id, &event).await
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(group_id = %group_id, skipped, "Live session lagged, reseeding");
                        match queries::fetch_group_snapshot(&state.db, group_id).await {
                            Ok((members, logs)) => {
                                let standings = board.reseed(members, logs, today());
                                send_standings(&mut sender, &board, &standings).await
                            }
                            Err(e) => {
                                tracing::error!(error = %e, "Reseed failed");
                                false
                            }
                        }
                    }
                    Err(RecvError::Closed) => false,
                };
                if !delivered {
                    break;
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if !on_client_frame(&mut sender, &mut board, &mut permissions, &text).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    // Dropping the receiver here ends the subscription
    tracing::debug!(user_id = %user_id, group_id = %group_id, "Live leaderboard session closed");
}

async fn on_feed_event(
    sender: &mut Sender,
    board: &mut LiveLeaderboard,
    permissions: &SessionPermissions,
    viewer: Uuid,
    event: &FeedEvent,
) -> bool {
    // Looked up before applying so a notice never waits on recomputation
    let notice = match event {
        FeedEvent::Log(change) if permissions.has_permission() => {
            notify::workout_notice(change, viewer, board.members())
        }
        _ => None,
    };

    if let Some(notice) = notice {
        if !send_frame(sender, &ServerFrame::WorkoutNotice(&notice)).await {
            return false;
        }
    }

    match board.apply(event, today()) {
        Some(standings) => send_standings(sender, board, &standings).await,
        None => true,
    }
}

async fn on_client_frame(
    sender: &mut Sender,
    board: &mut LiveLeaderboard,
    permissions: &mut SessionPermissions,
    text: &str,
) -> bool {
    match serde_json::from_str::<ClientFrame>(text) {
        Ok(ClientFrame::SetTimeframe { timeframe }) => {
            let standings = board.set_timeframe(timeframe, today());
            send_standings(sender, board, &standings).await
        }
        Ok(ClientFrame::Permission { state }) => {
            permissions.set_permission(state);
            true
        }
        Ok(ClientFrame::EnableNotifications) => {
            send_frame(sender, &enable_notifications(permissions)).await
        }
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring malformed client frame");
            true
        }
    }
}

/// A still-undecided permission is forwarded to the client as a request;
/// anything already settled is echoed back.
fn enable_notifications(permissions: &mut SessionPermissions) -> ServerFrame<'static> {
    let state = permissions.request_permission();
    if permissions.request_pending() {
        ServerFrame::RequestPermission
    } else {
        ServerFrame::Permission { state }
    }
}

async fn send_standings(sender: &mut Sender, board: &LiveLeaderboard, entries: &[LeaderboardEntry]) -> bool {
    send_frame(
        sender,
        &ServerFrame::Leaderboard {
            timeframe: board.timeframe(),
            entries,
        },
    )
    .await
}

async fn send_frame(sender: &mut Sender, frame: &ServerFrame<'_>) -> bool {
    let payload = match serde_json::to_string(frame) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode frame");
            return true;
        }
    };
    sender.send(Message::Text(payload)).await.is_ok()
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}
