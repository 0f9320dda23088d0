use serde::Deserialize;
use std::fmt;

fn default_sample_rate() -> u32 {
    chorus_types::SAMPLE_RATE_HZ
}

fn default_system_prompt() -> String {
    "You are a friendly study tutor. Answer the student's question in at most two sentences."
        .to_string()
}

fn default_apology() -> String {
    "Sorry, I'm having trouble answering right now. Please ask me again in a moment.".to_string()
}

/// Connection settings for the streaming speech-to-text provider.
#[derive(Clone, Deserialize)]
pub struct SttConfig {
    /// Provider WebSocket URL (`ws://` or `wss://`).
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    /// Sample rate advertised to the provider. Defaults to the gateway's
    /// client frame format (16 kHz).
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            sample_rate: default_sample_rate(),
        }
    }
}

impl fmt::Debug for SttConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SttConfig")
            .field("url", &self.url)
            .field("api_key", &"[REDACTED]")
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

/// One text-generation endpoint: a named OpenAI-compatible chat-completions
/// URL plus the model served there. Primary and fallback backends all have
/// this same shape.
#[derive(Clone, Default, Deserialize)]
pub struct BackendConfig {
    /// Identifier used in logs when this backend fails.
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub model: String,
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .finish()
    }
}

/// Reply-orchestration settings: the backend chain and the fixed strings.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationConfig {
    /// Primary fast backend, tried first, single attempt.
    #[serde(default)]
    pub primary: BackendConfig,
    /// Secondary backends, tried in listed order after the primary.
    #[serde(default)]
    pub fallbacks: Vec<BackendConfig>,
    /// System instruction prepended to every exchange.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Static reply used when the whole chain fails. This path never fails.
    #[serde(default = "default_apology")]
    pub apology: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            primary: BackendConfig::default(),
            fallbacks: Vec::new(),
            system_prompt: default_system_prompt(),
            apology: default_apology(),
        }
    }
}

/// Connection settings for the speech-synthesis backend.
#[derive(Clone, Default, Deserialize)]
pub struct SynthesisConfig {
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    /// Optional voice identifier passed through to the backend.
    #[serde(default)]
    pub voice: Option<String>,
}

impl fmt::Debug for SynthesisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SynthesisConfig")
            .field("url", &self.url)
            .field("api_key", &"[REDACTED]")
            .field("voice", &self.voice)
            .finish()
    }
}
