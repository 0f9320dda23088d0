//! Shared types and constants for the Chorus voice gateway.
//!
//! This crate provides the domain types used across the workspace: transcript
//! events from the speech-to-text stream, reply requests/results produced by
//! the orchestrator, synthesized-audio envelopes, and the per-session
//! lifecycle state machine.
//!
//! No crate in the workspace depends on anything *except* `chorus-types` for
//! cross-cutting type definitions. This keeps the dependency graph clean and
//! prevents circular dependencies.

pub mod session;

pub use session::SessionState;

use serde::{Deserialize, Serialize};

/// Sample rate of client audio frames, in Hz.
pub const SAMPLE_RATE_HZ: u32 = 16_000;

/// Number of audio channels in a client frame (mono).
pub const AUDIO_CHANNELS: u32 = 1;

/// Bytes per PCM sample (16-bit little-endian).
pub const BYTES_PER_SAMPLE: usize = 2;

/// A correlation identifier linking an orchestration request to the intended
/// destination of its eventual audio reply.
///
/// Opaque and caller-supplied; the gateway never validates it against session
/// identity. When no per-session conversation tracking exists, a fixed
/// per-deployment identifier is used instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationRef(String);

impl ConversationRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConversationRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationRef {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A transcript event decoded from the speech-to-text provider.
///
/// Partial events may be superseded by later Partial or Final events for the
/// same utterance; a Final event closes the utterance and is the only trigger
/// for reply orchestration. The raw provider payload rides along for
/// diagnostics and is never interpreted past decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptEvent {
    Partial {
        text: String,
        raw: serde_json::Value,
    },
    Final {
        text: String,
        raw: serde_json::Value,
    },
}

impl TranscriptEvent {
    /// The utterance text carried by this event.
    pub fn text(&self) -> &str {
        match self {
            Self::Partial { text, .. } | Self::Final { text, .. } => text,
        }
    }

    /// Whether this event closes the utterance.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Final { .. })
    }
}

/// A request to produce a spoken reply for one finalized utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyRequest {
    /// The finalized utterance text.
    pub text: String,
    /// Destination correlation for the eventual audio.
    pub conversation: ConversationRef,
}

/// Which backend produced a reply, for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplySource {
    /// The primary fast backend.
    Primary,
    /// The Nth secondary backend (0-indexed into the fallback list).
    Fallback(usize),
    /// The fixed apology string; no backend produced usable text.
    Static,
}

impl std::fmt::Display for ReplySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Fallback(i) => write!(f, "fallback[{}]", i),
            Self::Static => f.write_str("static"),
        }
    }
}

/// The outcome of one orchestration pass: exactly one per accepted
/// [`ReplyRequest`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyResult {
    /// The reply text to synthesize.
    pub text: String,
    /// Which backend produced it.
    pub source: ReplySource,
}

/// A synthesized-speech byte buffer tagged with its destination.
///
/// Ephemeral: never persisted, discarded after delivery.
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    pub conversation: ConversationRef,
    pub bytes: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_ref_serializes_transparent() {
        let conv = ConversationRef::new("lesson-42");
        let json = serde_json::to_string(&conv).unwrap();
        assert_eq!(json, "\"lesson-42\"");

        let back: ConversationRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, conv);
    }

    #[test]
    fn transcript_event_accessors() {
        let partial = TranscriptEvent::Partial {
            text: "hel".to_string(),
            raw: serde_json::json!({"is_final": false}),
        };
        assert!(!partial.is_final());
        assert_eq!(partial.text(), "hel");

        let fin = TranscriptEvent::Final {
            text: "hello".to_string(),
            raw: serde_json::json!({"is_final": true}),
        };
        assert!(fin.is_final());
        assert_eq!(fin.text(), "hello");
    }

    #[test]
    fn reply_source_display_labels() {
        assert_eq!(ReplySource::Primary.to_string(), "primary");
        assert_eq!(ReplySource::Fallback(2).to_string(), "fallback[2]");
        assert_eq!(ReplySource::Static.to_string(), "static");
    }
}
