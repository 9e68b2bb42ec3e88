// Configuration constants for the server

use std::str::FromStr;
use std::time::Duration;

/// What `/tts` does with text that is empty after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyTextPolicy {
    /// 400 with an error body
    #[default]
    Reject,
    /// 200 with a short silent WAV, engine not called
    Silence,
}

impl FromStr for EmptyTextPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" | "error" => Ok(EmptyTextPolicy::Reject),
            "silence" | "silent" => Ok(EmptyTextPolicy::Silence),
            other => Err(format!("unknown TTS_EMPTY_TEXT policy '{other}' (expected reject or silence)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// 0 disables rate limiting
    pub rate_limit_per_minute: u32,
    pub request_timeout_secs: u64,
    pub max_body_bytes: usize,
    pub cors_allowed_origins: Option<Vec<String>>,
    pub empty_text: EmptyTextPolicy,
    /// 0 disables the length check
    pub max_text_chars: usize,
    pub silence_ms: u32,
    pub silence_sample_rate: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            rate_limit_per_minute: 60,
            request_timeout_secs: 120,
            max_body_bytes: 1024 * 1024,
            cors_allowed_origins: None,
            empty_text: EmptyTextPolicy::Reject,
            max_text_chars: 5000,
            silence_ms: 250,
            silence_sample_rate: 22_050,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        fn parsed<T: FromStr>(value: Option<String>) -> Option<T> {
            value.and_then(|v| v.trim().parse().ok())
        }

        let empty_text = match lookup("TTS_EMPTY_TEXT").filter(|v| !v.trim().is_empty()) {
            Some(v) => v.parse().unwrap_or_else(|e| {
                tracing::warn!("{e}; using reject");
                EmptyTextPolicy::Reject
            }),
            None => defaults.empty_text,
        };

        let cors_allowed_origins = lookup("CORS_ALLOWED_ORIGINS").map(|origins| {
            origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });

        Self {
            port: parsed(lookup("PORT")).unwrap_or(defaults.port),
            rate_limit_per_minute: parsed(lookup("RATE_LIMIT_PER_MINUTE"))
                .unwrap_or(defaults.rate_limit_per_minute),
            request_timeout_secs: parsed(lookup("REQUEST_TIMEOUT_SECS"))
                .unwrap_or(defaults.request_timeout_secs),
            max_body_bytes: parsed(lookup("MAX_BODY_BYTES")).unwrap_or(defaults.max_body_bytes),
            cors_allowed_origins,
            empty_text,
            max_text_chars: parsed(lookup("TTS_MAX_TEXT_CHARS")).unwrap_or(defaults.max_text_chars),
            silence_ms: parsed(lookup("TTS_SILENCE_MS")).unwrap_or(defaults.silence_ms),
            silence_sample_rate: parsed(lookup("TTS_SILENCE_SAMPLE_RATE"))
                .filter(|rate: &u32| *rate > 0)
                .unwrap_or(defaults.silence_sample_rate),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
