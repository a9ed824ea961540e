use anyhow::Context;
use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{delete, get, post},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

mod auth;
mod config;
mod db;
mod error;
mod handlers;
mod models;
mod services;

use auth::rate_limit::RateLimitState;
use config::Config;
use services::feed::{self, FeedSender};

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub feed: FeedSender,
    pub rate_limiter: RateLimitState,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "streakboard_api=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    let config = Arc::new(Config::from_env().context("Invalid configuration")?);

    let db = db::create_pool(&config.database_url)
        .await
        .context("Failed to create database pool")?;

    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .context("Failed to run database migrations")?;

    tracing::info!("Database migrations applied");

    let state = AppState {
        db,
        config: config.clone(),
        feed: feed::channel(config.feed_capacity),
        rate_limiter: RateLimitState::new(),
    };

    auth::rate_limit::spawn_cleanup_worker(state.rate_limiter.clone());

    let app = build_router(state);

    let addr = config.listen_addr();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    // Connect info feeds the per-IP join limiter
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/readyz", get(handlers::health::readyz))
        .route("/ws", get(handlers::ws::ws_handler));

    let join_routes = Router::new()
        .route("/api/groups/join", post(handlers::groups::join_group))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::rate_limit::rate_limit_join,
        ));

    let protected_routes = Router::new()
        // Profile & stats
        .route(
            "/api/me",
            get(handlers::users::me).put(handlers::users::upsert_profile),
        )
        .route("/api/me/stats", get(handlers::users::my_stats))
        .route(
            "/api/users/username-available",
            get(handlers::users::username_available),
        )
        // Daily logs
        .route(
            "/api/daily-logs",
            post(handlers::daily_logs::upsert_daily_log).get(handlers::daily_logs::list_daily_logs),
        )
        .route("/api/daily-logs/today", get(handlers::daily_logs::get_today_log))
        .route("/api/daily-logs/history", get(handlers::daily_logs::get_history))
        .route(
            "/api/daily-logs/:date",
            delete(handlers::daily_logs::delete_daily_log),
        )
        // Groups
        .route(
            "/api/groups",
            post(handlers::groups::create_group).get(handlers::groups::list_groups),
        )
        .route("/api/groups/:id", get(handlers::groups::get_group))
        .route(
            "/api/groups/:id/leaderboard",
            get(handlers::groups::get_leaderboard),
        )
        .merge(join_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::middleware::require_auth,
        ));

    let cors = cors_layer(&state.config);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = std::iter::once(&config.frontend_url)
        .chain(config.cors_extra_origins.iter())
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
        ])
        .allow_credentials(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::Value;
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::auth::jwt::{issue_test_token, test_config};

    /// State whose pool never connects unless a handler reaches the store.
    fn test_state() -> AppState {
        let config = test_config();
        AppState {
            db: PgPoolOptions::new()
                .connect_lazy(&config.database_url)
                .unwrap(),
            config: Arc::new(config),
            feed: feed::channel(16),
            rate_limiter: RateLimitState::new(),
        }
    }

    fn bearer(state: &AppState) -> String {
        format!(
            "Bearer {}",
            issue_test_token(Uuid::new_v4(), 300, &state.config)
        )
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = build_router(test_state());
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "streakboard-api");
    }

    #[tokio::test]
    async fn test_protected_route_requires_token() {
        let app = build_router(test_state());
        let response = app
            .oneshot(Request::get("/api/me/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], 401);
    }

    #[tokio::test]
    async fn test_invalid_token_rejected() {
        let app = build_router(test_state());
        let response = app
            .oneshot(
                Request::get("/api/daily-logs")
                    .header(header::AUTHORIZATION, "Bearer not-a-jwt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_future_log_date_rejected() {
        let state = test_state();
        let auth = bearer(&state);
        let tomorrow = chrono::Utc::now().date_naive() + chrono::Duration::days(1);
        let app = build_router(state);

        let response = app
            .oneshot(
                Request::post("/api/daily-logs")
                    .header(header::AUTHORIZATION, auth)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        serde_json::json!({ "log_date": tomorrow, "worked_out": true }).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(response).await;
        assert_eq!(body["error"]["message"], "log_date cannot be in the future");
    }

    #[tokio::test]
    async fn test_malformed_delete_date_rejected() {
        let state = test_state();
        let auth = bearer(&state);
        let app = build_router(state);

        let response = app
            .oneshot(
                Request::delete("/api/daily-logs/last-tuesday")
                    .header(header::AUTHORIZATION, auth)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_history_range_validated() {
        let state = test_state();
        let auth = bearer(&state);
        let app = build_router(state);

        let response = app
            .oneshot(
                Request::get("/api/daily-logs/history?days=0")
                    .header(header::AUTHORIZATION, auth)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_blank_group_name_rejected() {
        let state = test_state();
        let auth = bearer(&state);
        let app = build_router(state);

        let response = app
            .oneshot(
                Request::post("/api/groups")
                    .header(header::AUTHORIZATION, auth)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"name":"   "}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
