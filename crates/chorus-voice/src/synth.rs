//! Speech synthesis over HTTP.

use crate::config::SynthesisConfig;
use crate::error::VoiceError;

/// Maximum text input size for synthesis (64 KiB). Prevents resource
/// exhaustion from oversized synthesis requests.
const MAX_SYNTHESIS_INPUT_BYTES: usize = 64 * 1024;

/// Client for the speech-synthesis backend.
///
/// A failed synthesis is terminal for the utterance that produced it: the
/// caller logs it and drops the reply audio, never retries.
#[derive(Debug, Clone)]
pub struct SynthesisClient {
    config: SynthesisConfig,
    client: reqwest::Client,
}

impl SynthesisClient {
    pub fn new(config: SynthesisConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    /// Renders reply text to an audio buffer. The response body is the raw
    /// encoded audio, returned as-is.
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>, VoiceError> {
        if text.len() > MAX_SYNTHESIS_INPUT_BYTES {
            return Err(VoiceError::Synthesis(format!(
                "text exceeds maximum size: {} bytes (limit: {} bytes)",
                text.len(),
                MAX_SYNTHESIS_INPUT_BYTES
            )));
        }

        let mut body = serde_json::json!({ "text": text });
        if let Some(voice) = &self.config.voice {
            body["voice"] = serde_json::Value::String(voice.clone());
        }

        let mut request = self.client.post(&self.config.url).json(&body);
        if !self.config.api_key.is_empty() {
            request = request.bearer_auth(&self.config.api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| VoiceError::Synthesis(format!("request failed: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(VoiceError::Synthesis(format!(
                "non-success status {}",
                status
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| VoiceError::Synthesis(format!("failed to read audio body: {}", e)))?;
        Ok(bytes.to_vec())
    }
}
