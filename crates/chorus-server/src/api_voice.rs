//! Service-facing HTTP boundary: the orchestration trigger and the playback
//! delivery endpoint, plus the shared reply pipeline both the endpoints and
//! the recognition bridge run.

use crate::AppState;
use axum::extract::Extension;
use axum::http::StatusCode;
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chorus_types::{ConversationRef, ReplyRequest, ReplyResult, SynthesizedAudio};
use chorus_voice::VoiceError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

type ApiError = (StatusCode, Json<serde_json::Value>);

fn error_response(status: StatusCode, message: &str) -> ApiError {
    (status, Json(serde_json::json!({ "error": message })))
}

/// Runs the orchestrate → synthesize → deliver pipeline for one finalized
/// utterance. A synthesis failure abandons delivery for this utterance only
/// (logged, no audio, no retry); the produced reply is still returned so the
/// HTTP trigger can echo it.
pub(crate) async fn respond_and_deliver(
    state: Arc<AppState>,
    request: ReplyRequest,
) -> Result<ReplyResult, VoiceError> {
    let reply = state.orchestrator.reply(&request).await?;
    tracing::info!(
        conversation = %request.conversation,
        source = %reply.source,
        "reply produced"
    );

    match state.synthesizer.synthesize(&reply.text).await {
        Ok(bytes) => {
            state
                .registry
                .deliver(SynthesizedAudio {
                    conversation: request.conversation,
                    bytes,
                })
                .await;
        }
        Err(e) => {
            tracing::warn!(
                conversation = %request.conversation,
                "speech synthesis failed, dropping reply audio: {}",
                e
            );
        }
    }

    Ok(reply)
}

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub conversation_id: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct RespondResponse {
    pub ok: bool,
    pub reply: String,
}

/// `POST /api/respond` — triggers reply orchestration for an utterance.
pub async fn respond_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(body): Json<RespondRequest>,
) -> Result<Json<RespondResponse>, ApiError> {
    if body.text.trim().is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "text must be non-empty",
        ));
    }

    let request = ReplyRequest {
        text: body.text,
        conversation: ConversationRef::new(body.conversation_id),
    };

    match respond_and_deliver(state, request).await {
        Ok(reply) => Ok(Json(RespondResponse {
            ok: true,
            reply: reply.text,
        })),
        // Only validation faults surface here; backend faults degrade inside
        // the orchestrator.
        Err(e) => Err(error_response(StatusCode::BAD_REQUEST, &e.to_string())),
    }
}

#[derive(Debug, Deserialize)]
pub struct PlaybackRequest {
    #[serde(default)]
    pub audio_base64: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// `POST /api/playback` — delivers a pre-synthesized audio buffer to active
/// sessions. Missing or undecodable `audio_base64` is a client error.
pub async fn playback_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(body): Json<PlaybackRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Some(encoded) = body.audio_base64 else {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "audio_base64 is required",
        ));
    };

    let bytes = BASE64.decode(encoded.as_bytes()).map_err(|_| {
        error_response(StatusCode::BAD_REQUEST, "audio_base64 is not valid base64")
    })?;

    let conversation = ConversationRef::new(
        body.conversation_id
            .unwrap_or_else(|| state.config.server.default_conversation.clone()),
    );

    let active_sessions = state.registry.active_count().await;
    tracing::debug!(
        conversation = %conversation,
        bytes = bytes.len(),
        active_sessions,
        "delivering playback audio"
    );
    state
        .registry
        .deliver(SynthesizedAudio {
            conversation,
            bytes,
        })
        .await;

    Ok(Json(serde_json::json!({ "ok": true })))
}
