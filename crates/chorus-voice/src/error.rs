use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("speech-to-text error: {0}")]
    Stt(String),

    #[error("text generation backend '{backend}' failed: {message}")]
    Generation { backend: String, message: String },

    #[error("speech synthesis error: {0}")]
    Synthesis(String),

    #[error("utterance text is empty")]
    EmptyUtterance,

    #[error("invalid configuration: {0}")]
    Config(String),
}
