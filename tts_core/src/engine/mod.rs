//! Synthesis engines.
//!
//! An engine is the opaque capability that turns text into a WAV file at a
//! given path. Engines block: callers run them on a blocking worker.

mod command;
mod http;
mod piper;

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::SynthesisError;

pub use command::CommandEngine;
pub use http::HttpEngine;
pub use piper::PiperEngine;

pub trait SynthesisEngine: Send + Sync {
    /// Short label used in logs and error messages.
    fn name(&self) -> &str;

    /// Write speech for `text` as WAV to `destination`.
    fn synthesize(&self, text: &str, destination: &Path) -> Result<(), SynthesisError>;
}

/// Tries each engine in order and returns the first success.
pub struct EngineChain {
    engines: Vec<Arc<dyn SynthesisEngine>>,
    label: String,
}

impl EngineChain {
    pub fn new(engines: Vec<Arc<dyn SynthesisEngine>>) -> Self {
        let label = engines
            .iter()
            .map(|e| e.name().to_string())
            .collect::<Vec<_>>()
            .join(" -> ");
        Self { engines, label }
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }
}

impl SynthesisEngine for EngineChain {
    fn name(&self) -> &str {
        &self.label
    }

    fn synthesize(&self, text: &str, destination: &Path) -> Result<(), SynthesisError> {
        let mut last_err = SynthesisError::NotConfigured;
        for (i, engine) in self.engines.iter().enumerate() {
            match engine.synthesize(text, destination) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    if i + 1 < self.engines.len() {
                        warn!("{} failed, falling back: {e}", engine.name());
                    }
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }
}

/// Build the engine chain described by `config`.
///
/// Order: in-process piper model, piper binary, remote TTS server. An empty
/// chain is valid and fails every call with [`SynthesisError::NotConfigured`].
pub fn build_engine(config: &EngineConfig) -> anyhow::Result<EngineChain> {
    let mut engines: Vec<Arc<dyn SynthesisEngine>> = Vec::new();

    if let Some(cfg_path) = &config.model_config {
        info!("Loading piper model from {}", cfg_path.display());
        engines.push(Arc::new(PiperEngine::load(cfg_path)?));
    }
    if let Some(cli) = &config.piper_cli {
        if !cli.binary.exists() {
            warn!("PIPER_PATH {} does not exist", cli.binary.display());
        }
        if !cli.voice.exists() {
            warn!("PIPER_VOICE {} does not exist", cli.voice.display());
        }
        engines.push(Arc::new(CommandEngine::new(cli.clone())));
    }
    if let Some(url) = &config.http_url {
        engines.push(Arc::new(HttpEngine::new(url.clone(), config.http_timeout())?));
    }

    Ok(EngineChain::new(engines))
}
