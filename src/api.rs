//! Read API over the killmail store
//!
//! Thin axum plumbing around `KillmailRepository`: listing, single-kill
//! lookup, and aggregate stats. No business logic lives here.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use crate::models::KillmailListResponse;
use crate::repository::{KillmailRepository, ListParams, RepositoryError};

/// Create the axum router with all endpoints
pub fn create_router(repository: Arc<KillmailRepository>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/kills", get(list_kills))
        .route("/kills/:killmail_id", get(get_kill))
        .route("/stats", get(get_stats))
        .layer(cors)
        .with_state(repository)
}

/// Query parameters for the kill listing
#[derive(Debug, Deserialize)]
pub struct ListKillsParams {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub solar_system_id: Option<i64>,
    pub ship_type_id: Option<i64>,
    pub character_id: Option<i64>,
    pub corporation_id: Option<i64>,
    pub alliance_id: Option<i64>,
    pub npc: Option<bool>,
    pub solo: Option<bool>,
    pub awox: Option<bool>,
}

fn default_limit() -> i64 {
    50
}

fn internal_error(e: RepositoryError) -> (StatusCode, Json<serde_json::Value>) {
    log::error!("❌ Query failed: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"detail": "Internal server error"})),
    )
}

/// GET /health - database liveness probe
async fn health(State(repository): State<Arc<KillmailRepository>>) -> impl IntoResponse {
    match repository.health() {
        Ok(()) => (StatusCode::OK, Json(json!({"status": "ok"}))),
        Err(e) => {
            log::error!("❌ Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"detail": "Database unavailable"})),
            )
        }
    }
}

/// GET /kills - filtered, paginated listing
async fn list_kills(
    State(repository): State<Arc<KillmailRepository>>,
    Query(params): Query<ListKillsParams>,
) -> impl IntoResponse {
    let list_params = ListParams {
        limit: params.limit.clamp(1, 1000),
        offset: params.offset.max(0),
        min_value: params.min_value,
        max_value: params.max_value,
        solar_system_id: params.solar_system_id,
        ship_type_id: params.ship_type_id,
        character_id: params.character_id,
        corporation_id: params.corporation_id,
        alliance_id: params.alliance_id,
        npc: params.npc,
        solo: params.solo,
        awox: params.awox,
    };

    match repository.list_kills(&list_params) {
        Ok((kills, total)) => {
            (StatusCode::OK, Json(KillmailListResponse { total, kills })).into_response()
        }
        Err(e) => internal_error(e).into_response(),
    }
}

/// GET /kills/:killmail_id - single killmail with children
async fn get_kill(
    State(repository): State<Arc<KillmailRepository>>,
    Path(killmail_id): Path<i64>,
) -> impl IntoResponse {
    match repository.get_kill(killmail_id) {
        Ok(Some(detail)) => (StatusCode::OK, Json(detail)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({"detail": "Killmail not found"})),
        )
            .into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

/// GET /stats - aggregate statistics
async fn get_stats(State(repository): State<Arc<KillmailRepository>>) -> impl IntoResponse {
    match repository.stats() {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    fn test_router() -> Router {
        let repository = Arc::new(KillmailRepository::open_in_memory().unwrap());
        create_router(repository)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = test_router();
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_kill_returns_404() {
        let app = test_router();
        let response = app
            .oneshot(Request::builder().uri("/kills/12345").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_empty_listing() {
        let app = test_router();
        let response = app
            .oneshot(Request::builder().uri("/kills?limit=10").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
