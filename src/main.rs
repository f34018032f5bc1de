mod application;
mod config;
mod domain;
mod infrastructure;
mod persistence;
mod rate_limit;
mod secrets;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::NaiveDate;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::application::services::journal_service::JournalService;
use crate::config::SyncConfig;
use crate::domain::errors::SyncError;
use crate::infrastructure::env_account_registry::EnvAccountRegistry;
use crate::infrastructure::provider_client_factory::ProviderClientFactory;
use crate::rate_limit::{
    create_sync_rate_limiter, sync_rate_limit_middleware, SyncRateLimitConfig,
};
use crate::secrets::EnvCredentialResolver;

#[derive(Clone)]
struct AppState {
    journal: Arc<JournalService>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "traderlog=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("traderlog sync engine starting...");

    let db_config = persistence::DatabaseConfig::from_env();
    let pool = persistence::init_database(&db_config.url).await?;

    let sync_config = SyncConfig::from_env();
    info!(
        "Sync config: lookback {}d, batch size {}, batch delay {}ms",
        sync_config.first_sync_lookback_days, sync_config.batch_size, sync_config.batch_delay_ms
    );

    let journal = Arc::new(JournalService::new(
        pool,
        sync_config,
        Arc::new(EnvAccountRegistry::from_env()),
        Arc::new(EnvCredentialResolver),
        Arc::new(ProviderClientFactory),
    ));
    let state = AppState { journal };

    let limiter = create_sync_rate_limiter(SyncRateLimitConfig::from_env());
    let sync_routes = Router::new()
        .route("/accounts/:account_ref/sync/:coin", post(sync_account))
        .layer(axum::middleware::from_fn(move |req, next| {
            sync_rate_limit_middleware(limiter.clone(), req, next)
        }));

    let app = Router::new()
        .route("/health", get(health))
        .merge(sync_routes)
        .route("/accounts/:account_ref/statistics", get(statistics))
        .route("/accounts/:account_ref/statistics/daily", get(statistics_by_day))
        .route(
            "/accounts/:account_ref/statistics/symbols",
            get(statistics_by_symbol),
        )
        .route("/accounts/:account_ref/day-logs", get(day_logs))
        .route("/accounts/:account_ref/positions", get(open_positions))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3001);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Deserialize)]
struct RangeQuery {
    coin: String,
    start_ms: i64,
    end_ms: i64,
}

#[derive(Deserialize)]
struct DateRangeQuery {
    coin: String,
    from: NaiveDate,
    to: NaiveDate,
}

#[derive(Deserialize)]
struct CoinQuery {
    coin: String,
}

async fn sync_account(
    State(state): State<AppState>,
    Path((account_ref, coin)): Path<(String, String)>,
) -> Response {
    match state.journal.sync_account(&account_ref, &coin).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => sync_error_response(e),
    }
}

async fn statistics(
    State(state): State<AppState>,
    Path(account_ref): Path<String>,
    Query(query): Query<RangeQuery>,
) -> Response {
    match state
        .journal
        .statistics(&account_ref, &query.coin, query.start_ms, query.end_ms)
        .await
    {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => sync_error_response(e),
    }
}

async fn statistics_by_day(
    State(state): State<AppState>,
    Path(account_ref): Path<String>,
    Query(query): Query<RangeQuery>,
) -> Response {
    match state
        .journal
        .statistics_by_day(&account_ref, &query.coin, query.start_ms, query.end_ms)
        .await
    {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => sync_error_response(e),
    }
}

async fn statistics_by_symbol(
    State(state): State<AppState>,
    Path(account_ref): Path<String>,
    Query(query): Query<RangeQuery>,
) -> Response {
    match state
        .journal
        .statistics_by_symbol(&account_ref, &query.coin, query.start_ms, query.end_ms)
        .await
    {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => sync_error_response(e),
    }
}

async fn day_logs(
    State(state): State<AppState>,
    Path(account_ref): Path<String>,
    Query(query): Query<DateRangeQuery>,
) -> Response {
    match state
        .journal
        .day_logs(&account_ref, &query.coin, query.from, query.to)
        .await
    {
        Ok(logs) => Json(logs).into_response(),
        Err(e) => sync_error_response(e),
    }
}

async fn open_positions(
    State(state): State<AppState>,
    Path(account_ref): Path<String>,
    Query(query): Query<CoinQuery>,
) -> Response {
    match state.journal.open_positions(&account_ref, &query.coin).await {
        Ok(positions) => Json(positions).into_response(),
        Err(e) => sync_error_response(e),
    }
}

/// Map engine errors onto user-visible responses. Credential problems get
/// a distinct message; everything retryable reads as "try again".
fn sync_error_response(err: SyncError) -> Response {
    let (status, message) = match &err {
        SyncError::InvalidCredentials { .. } => (StatusCode::UNAUTHORIZED, err.to_string()),
        SyncError::UnknownAccount(_) => (StatusCode::NOT_FOUND, err.to_string()),
        SyncError::UnknownProvider(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        SyncError::SyncInProgress { .. } => (StatusCode::CONFLICT, err.to_string()),
        _ => {
            error!("Sync request failed: {}", err);
            (
                StatusCode::BAD_GATEWAY,
                "could not sync, please try again".to_string(),
            )
        }
    };
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}
