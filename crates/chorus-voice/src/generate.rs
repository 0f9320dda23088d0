//! Reply orchestration over an ordered chain of text-generation backends.
//!
//! The chain is a flat list: the primary backend first, then the configured
//! fallbacks in listed order. Each backend gets a single attempt; the first
//! non-empty reply wins and short-circuits the rest. When the whole chain
//! fails the orchestrator produces a fixed apology instead — that path never
//! fails, so a session always gets exactly one reply per accepted request.

use crate::config::{BackendConfig, GenerationConfig};
use crate::error::VoiceError;
use chorus_types::{ReplyRequest, ReplyResult, ReplySource};
use serde::{Deserialize, Serialize};

/// One message in a chat-completions exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// A single text-generation backend: an OpenAI-compatible chat-completions
/// endpoint. Every backend in the chain has this uniform shape.
#[derive(Debug, Clone)]
pub struct ChatBackend {
    config: BackendConfig,
    client: reqwest::Client,
}

impl ChatBackend {
    pub fn new(config: BackendConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    /// Identifier used when logging a failed attempt.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// One attempt, no retry. A transport error, non-success status, or
    /// malformed payload is an explicit failure carrying the backend name.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String, VoiceError> {
        let mut request = self.client.post(&self.config.url).json(&ChatRequest {
            model: &self.config.model,
            messages,
        });
        if !self.config.api_key.is_empty() {
            request = request.bearer_auth(&self.config.api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.failure(format!("request failed: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(self.failure(format!("non-success status {}", status)));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| self.failure(format!("malformed payload: {}", e)))?;
        Ok(body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }

    fn failure(&self, message: String) -> VoiceError {
        VoiceError::Generation {
            backend: self.config.name.clone(),
            message,
        }
    }
}

/// Turns one finalized transcript into reply text with bounded latency and
/// graceful degradation.
pub struct ReplyOrchestrator {
    /// Primary first, then fallbacks in configured order.
    backends: Vec<ChatBackend>,
    system_prompt: String,
    apology: String,
}

impl ReplyOrchestrator {
    pub fn new(config: GenerationConfig, client: reqwest::Client) -> Self {
        let mut backends = Vec::with_capacity(1 + config.fallbacks.len());
        backends.push(ChatBackend::new(config.primary, client.clone()));
        backends.extend(
            config
                .fallbacks
                .into_iter()
                .map(|backend| ChatBackend::new(backend, client.clone())),
        );
        Self {
            backends,
            system_prompt: config.system_prompt,
            apology: config.apology,
        }
    }

    /// Produces exactly one [`ReplyResult`] per accepted request and never
    /// fails past this boundary. Empty input (after trimming) is rejected
    /// before any backend is called.
    pub async fn reply(&self, request: &ReplyRequest) -> Result<ReplyResult, VoiceError> {
        let utterance = request.text.trim();
        if utterance.is_empty() {
            return Err(VoiceError::EmptyUtterance);
        }

        let messages = [
            ChatMessage::system(self.system_prompt.clone()),
            ChatMessage::user(utterance),
        ];

        for (index, backend) in self.backends.iter().enumerate() {
            match backend.complete(&messages).await {
                Ok(text) if !text.trim().is_empty() => {
                    let source = match index {
                        0 => ReplySource::Primary,
                        n => ReplySource::Fallback(n - 1),
                    };
                    tracing::debug!(
                        backend = backend.name(),
                        source = %source,
                        "reply produced"
                    );
                    return Ok(ReplyResult { text, source });
                }
                Ok(_) => {
                    tracing::warn!(backend = backend.name(), "backend returned empty reply text");
                }
                Err(e) => {
                    tracing::warn!(backend = backend.name(), "backend attempt failed: {}", e);
                }
            }
        }

        tracing::warn!(
            conversation = %request.conversation,
            "all generation backends failed, falling back to static reply"
        );
        Ok(ReplyResult {
            text: self.apology.clone(),
            source: ReplySource::Static,
        })
    }
}
