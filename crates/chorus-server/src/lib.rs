//! Chorus gateway library logic.
//!
//! The gateway relays live microphone audio from WebSocket clients to a
//! streaming speech-to-text provider, hands finalized utterances to the reply
//! orchestrator, synthesizes replies to speech, and pushes the audio back to
//! active sessions.

pub mod api_voice;
pub mod api_ws;
pub mod config;
pub mod registry;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chorus_voice::{ReplyOrchestrator, SynthesisClient};
use config::{Config, ConfigError};
use registry::SessionRegistry;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

/// Maximum request body size (2 MiB). Protects against OOM from oversized
/// payloads; playback audio is the largest expected body.
const MAX_REQUEST_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Gateway configuration.
    pub config: Arc<Config>,
    /// Registry of active sessions, shared by the transport and the playback
    /// fan-out.
    pub registry: SessionRegistry,
    /// Reply orchestrator: primary backend plus ordered fallbacks.
    pub orchestrator: Arc<ReplyOrchestrator>,
    /// Speech-synthesis client.
    pub synthesizer: Arc<SynthesisClient>,
}

impl AppState {
    /// Builds the gateway state. One shared HTTP client, carrying the
    /// configured per-call deadline, backs both the generation chain and the
    /// synthesis backend.
    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.server.backend_timeout_secs))
            .build()?;

        let orchestrator = Arc::new(ReplyOrchestrator::new(
            config.generation.clone(),
            client.clone(),
        ));
        let synthesizer = Arc::new(SynthesisClient::new(config.synthesis.clone(), client));

        Ok(Self {
            config: Arc::new(config),
            registry: SessionRegistry::new(),
            orchestrator,
            synthesizer,
        })
    }
}

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/respond", post(api_voice::respond_handler))
        .route("/api/playback", post(api_voice::playback_handler))
        .route("/ws", get(api_ws::ws_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_check_returns_ok() {
        let state = AppState::from_config(Config::default()).unwrap();
        let app = app(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn playback_without_audio_is_a_client_error() {
        let state = AppState::from_config(Config::default()).unwrap();
        let app = app(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/playback")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"conversation_id": "c-1"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert!(json["error"]
            .as_str()
            .unwrap()
            .contains("audio_base64"));
    }

    #[tokio::test]
    async fn respond_with_empty_text_is_a_client_error() {
        let state = AppState::from_config(Config::default()).unwrap();
        let app = app(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/respond")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"conversation_id": "c-1", "text": "   "}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
