use std::fs;
use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use piper_rs::synth::{PiperSpeechStreamParallel, PiperSpeechSynthesizer};
use tracing::info;

use super::SynthesisEngine;
use crate::error::SynthesisError;
use crate::wav;

/// In-process piper voice, loaded once from its `*.onnx.json` config.
pub struct PiperEngine {
    // The synthesizer makes no promise about concurrent use, so calls take turns.
    synth: Mutex<PiperSpeechSynthesizer>,
    sample_rate: u32,
}

impl PiperEngine {
    pub fn load<P: AsRef<Path>>(cfg_path: P) -> anyhow::Result<Self> {
        let sample_rate = read_sample_rate(&cfg_path)?;
        let model = piper_rs::from_config_path(cfg_path.as_ref())
            .map_err(|e| anyhow::anyhow!("piper load error: {e}"))?;
        let synth = PiperSpeechSynthesizer::new(model)
            .map_err(|e| anyhow::anyhow!("piper init error: {e}"))?;
        info!("Piper voice loaded ({} Hz)", sample_rate);
        Ok(Self {
            synth: Mutex::new(synth),
            sample_rate,
        })
    }
}

/// Read `audio.sample_rate` from a piper model config.
fn read_sample_rate<P: AsRef<Path>>(cfg_path: P) -> anyhow::Result<u32> {
    let text = fs::read_to_string(cfg_path.as_ref())
        .with_context(|| format!("Failed to read config file: {}", cfg_path.as_ref().display()))?;
    let json: serde_json::Value =
        serde_json::from_str(&text).with_context(|| "Config file is not valid JSON")?;

    let sample_rate = json
        .get("audio")
        .and_then(|a| a.get("sample_rate"))
        .and_then(|sr| sr.as_u64())
        .ok_or_else(|| anyhow::anyhow!("Missing or invalid 'audio.sample_rate' in config"))?;

    Ok(sample_rate as u32)
}

impl SynthesisEngine for PiperEngine {
    fn name(&self) -> &str {
        "piper"
    }

    fn synthesize(&self, text: &str, destination: &Path) -> Result<(), SynthesisError> {
        let synth = self
            .synth
            .lock()
            .map_err(|_| SynthesisError::engine("piper", "synthesizer lock poisoned by an earlier panic"))?;

        let iter: PiperSpeechStreamParallel = synth
            .synthesize_parallel(text.to_string(), None)
            .map_err(|e| SynthesisError::engine("piper", format!("synth error: {e}")))?;

        let mut samples: Vec<f32> = Vec::new();
        for part in iter {
            samples.extend(
                part.map_err(|e| SynthesisError::engine("piper", format!("chunk error: {e}")))?
                    .into_vec(),
            );
        }
        drop(synth);

        wav::write_samples(destination, &samples, self.sample_rate)
    }
}
