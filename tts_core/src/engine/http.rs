use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Serialize;

use super::SynthesisEngine;
use crate::error::SynthesisError;

const BODY_SNIPPET: usize = 200;

#[derive(Serialize)]
struct UpstreamRequest<'a> {
    text: &'a str,
}

/// Forwards text to another TTS server speaking the same `POST {"text"}` contract.
pub struct HttpEngine {
    url: String,
    client: reqwest::blocking::Client,
}

impl HttpEngine {
    pub fn new(url: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {e}"))?;
        Ok(Self { url, client })
    }
}

impl SynthesisEngine for HttpEngine {
    fn name(&self) -> &str {
        "http"
    }

    fn synthesize(&self, text: &str, destination: &Path) -> Result<(), SynthesisError> {
        let response = self
            .client
            .post(&self.url)
            .json(&UpstreamRequest { text })
            .send()
            .map_err(|e| SynthesisError::engine("http", e))?;

        let status = response.status();
        let body = response
            .bytes()
            .map_err(|e| SynthesisError::engine("http", e))?;

        if !status.is_success() {
            let msg: String = String::from_utf8_lossy(&body).chars().take(BODY_SNIPPET).collect();
            return Err(SynthesisError::engine(
                "http",
                format!("TTS server HTTP {}: {}", status.as_u16(), msg),
            ));
        }

        fs::write(destination, &body)?;
        Ok(())
    }
}
