// Engine configuration, read from the environment at startup

use std::path::PathBuf;
use std::time::Duration;

/// Settings for the piper command line binary.
#[derive(Debug, Clone, Default)]
pub struct PiperCliConfig {
    pub binary: PathBuf,
    pub voice: PathBuf,
    pub voice_json: Option<PathBuf>,
    pub speaker: Option<String>,
    pub length_scale: Option<String>,
    pub noise_scale: Option<String>,
    pub noise_w: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// `*.onnx.json` model config for the in-process piper engine
    pub model_config: Option<PathBuf>,
    pub piper_cli: Option<PiperCliConfig>,
    pub http_url: Option<String>,
    pub http_timeout_ms: u64,
    pub max_concurrent: usize,
    pub cache_max: usize,
    pub cache_ttl_ms: u64,
    pub tmp_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_config: None,
            piper_cli: None,
            http_url: None,
            http_timeout_ms: 60_000,
            max_concurrent: 1,
            cache_max: 100,
            cache_ttl_ms: 24 * 60 * 60 * 1000,
            tmp_dir: std::env::temp_dir(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let path = |key: &str| var(key).map(|v| PathBuf::from(strip_quotes(&v)));

        let piper_cli = match (path("PIPER_PATH"), path("PIPER_VOICE")) {
            (Some(binary), Some(voice)) => Some(PiperCliConfig {
                binary,
                voice,
                voice_json: path("PIPER_VOICE_JSON"),
                speaker: var("PIPER_SPEAKER"),
                length_scale: var("PIPER_LENGTH_SCALE"),
                noise_scale: var("PIPER_NOISE_SCALE"),
                noise_w: var("PIPER_NOISE_W"),
            }),
            _ => None,
        };

        let http_url = var("PIPER_HTTP_URL").or_else(|| var("TTS_SERVER_URL"));

        let http_timeout_ms = var("TTS_TIMEOUT_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.http_timeout_ms);

        let max_concurrent = var("TTS_MAX_CONCURRENT")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults.max_concurrent)
            .max(1);

        let cache_max = var("TTS_CACHE_MAX")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.cache_max);

        let cache_ttl_ms = var("TTS_CACHE_TTL_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.cache_ttl_ms);

        Self {
            model_config: path("PIPER_MODEL_CONFIG"),
            piper_cli,
            http_url,
            http_timeout_ms,
            max_concurrent,
            cache_max,
            cache_ttl_ms,
            tmp_dir: path("TTS_TMP_DIR").unwrap_or(defaults.tmp_dir),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache_max > 0 && self.cache_ttl_ms > 0
    }
}

fn strip_quotes(value: &str) -> &str {
    let value = value.strip_prefix(['"', '\'']).unwrap_or(value);
    value.strip_suffix(['"', '\'']).unwrap_or(value)
}
