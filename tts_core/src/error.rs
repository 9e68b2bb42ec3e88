use thiserror::Error;

/// Errors raised while turning text into a WAV payload.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("TTS not configured. Set PIPER_MODEL_CONFIG, PIPER_PATH and PIPER_VOICE, or PIPER_HTTP_URL/TTS_SERVER_URL.")]
    NotConfigured,

    #[error("{engine}: {message}")]
    Engine { engine: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("engine produced no output file")]
    MissingOutput,

    #[error("invalid WAV output: {0}")]
    InvalidWav(String),

    #[error("synthesis worker failed: {0}")]
    Worker(String),
}

impl SynthesisError {
    pub fn engine(engine: impl Into<String>, message: impl std::fmt::Display) -> Self {
        SynthesisError::Engine {
            engine: engine.into(),
            message: message.to_string(),
        }
    }
}
