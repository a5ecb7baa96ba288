//! HTTP route definitions

use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::app::AppState;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(state.config.client_origin.as_deref());

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Restrict to the configured origins (comma-separated), or allow any when unset
fn cors_layer(client_origin: Option<&str>) -> CorsLayer {
    let Some(origins) = client_origin else {
        return CorsLayer::permissive();
    };

    let allowed_origins: Vec<HeaderValue> = origins
        .split(',')
        .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    world: String,
    uptime_secs: u64,
    connections: usize,
    players: usize,
    bots: usize,
    latest_seq: u64,
    events_in_memory: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.arena.stats();

    Json(HealthResponse {
        status: "ok",
        world: state.config.world_name.clone(),
        uptime_secs: uptime_secs(),
        connections: stats.connections(),
        players: stats.players(),
        bots: stats.bots(),
        latest_seq: stats.latest_seq(),
        events_in_memory: stats.events_in_memory(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::game::{ArenaSettings, ArenaState, GameArena};
    use crate::store::LoggedKills;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(config: Config, bots: usize) -> Router {
        let arena = GameArena::spawn(
            ArenaState::new(ArenaSettings::default(), Arc::new(LoggedKills)),
            bots,
        );
        build_router(AppState::new(config, arena))
    }

    #[tokio::test]
    async fn test_health_reports_arena_counters() {
        let response = app(Config::default(), 2)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["world"], "global");
        assert_eq!(json["bots"], 2);
        assert_eq!(json["players"], 2);
        assert_eq!(json["connections"], 0);
        assert_eq!(json["latestSeq"], 0);
    }

    #[tokio::test]
    async fn test_ws_requires_upgrade() {
        let response = app(Config::default(), 0)
            .oneshot(Request::builder().uri("/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_cors_permissive_without_origin_config() {
        let response = app(Config::default(), 0)
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header(header::ORIGIN, "https://game.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*"
        );
    }

    #[tokio::test]
    async fn test_cors_restricted_to_configured_origin() {
        let config = Config {
            client_origin: Some("https://game.example, https://beta.example".to_string()),
            ..Config::default()
        };
        let response = app(config, 0)
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header(header::ORIGIN, "https://beta.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "https://beta.example"
        );
    }
}
