//! Upstream voice services for the Chorus gateway.
//!
//! Three clients, one per external service: a streaming speech-to-text
//! connection that mirrors the lifetime of a client session, a reply
//! orchestrator that walks an ordered chain of text-generation backends, and
//! a speech-synthesis client that renders reply text to an audio buffer.
//!
//! Every failure is classified locally: speech-to-text faults pause
//! transcripts without killing the session, generation faults degrade through
//! the fallback chain down to a static reply, and synthesis faults abandon a
//! single utterance's audio. Nothing in this crate propagates a backend
//! failure as a session-fatal error.

pub mod config;
pub mod error;
pub mod generate;
pub mod stt;
pub mod synth;

pub use config::{BackendConfig, GenerationConfig, SttConfig, SynthesisConfig};
pub use error::VoiceError;
pub use generate::{ChatBackend, ChatMessage, ReplyOrchestrator};
pub use stt::SttStream;
pub use synth::SynthesisClient;
