//! Common utilities for integration tests
#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Request, Response},
    Router,
};
use server::config::ServerConfig;
use server::{build_app, AppState};
use tempfile::TempDir;
use tower::ServiceExt;
use tts_core::{EngineChain, EngineConfig, SpeechService, SynthesisEngine, SynthesisError};

pub const SAMPLE_RATE: u32 = 16_000;
pub const FRAMES_PER_CHAR: usize = 100;

/// Stand-in for a voice model: writes FRAMES_PER_CHAR frames per input
/// character, so every response can be traced back to its text.
pub struct FakeEngine {
    pub calls: AtomicUsize,
    pub delay: Duration,
    pub fail: bool,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
            fail: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            fail: true,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SynthesisEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    fn synthesize(&self, text: &str, destination: &Path) -> Result<(), SynthesisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        if self.fail {
            return Err(SynthesisError::engine("fake", "internal model error"));
        }

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(destination, spec)
            .map_err(|e| SynthesisError::engine("fake", e))?;
        for i in 0..text.chars().count() * FRAMES_PER_CHAR {
            let sample = ((i % 50) as i16 - 25) * 400;
            writer
                .write_sample(sample)
                .map_err(|e| SynthesisError::engine("fake", e))?;
        }
        writer.finalize().map_err(|e| SynthesisError::engine("fake", e))
    }
}

pub struct TestApp {
    pub router: Router,
    pub tmp_dir: TempDir,
}

impl TestApp {
    /// Transient files currently sitting in the engine's temp dir.
    pub fn leftover_files(&self) -> usize {
        std::fs::read_dir(self.tmp_dir.path()).unwrap().count()
    }
}

/// Server config for tests: no rate limit, everything else default.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        rate_limit_per_minute: 0,
        ..ServerConfig::default()
    }
}

pub fn create_test_app_with(
    engine: Arc<dyn SynthesisEngine>,
    config: ServerConfig,
    cache_max: usize,
) -> TestApp {
    let tmp_dir = tempfile::tempdir().unwrap();
    let engine_config = EngineConfig {
        cache_max,
        max_concurrent: 4,
        tmp_dir: tmp_dir.path().to_path_buf(),
        ..EngineConfig::default()
    };
    let speech = Arc::new(SpeechService::new(engine, &engine_config));
    TestApp {
        router: build_app(AppState::new(speech, config)),
        tmp_dir,
    }
}

/// Create a test app instance backed by `engine`, cache disabled.
pub fn create_test_app(engine: Arc<dyn SynthesisEngine>) -> TestApp {
    create_test_app_with(engine, test_config(), 0)
}

pub fn unconfigured_engine() -> Arc<dyn SynthesisEngine> {
    Arc::new(EngineChain::new(Vec::new()))
}

pub fn post_tts(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Parse a WAV body, returning (sample rate, frames).
pub fn wav_shape(bytes: &[u8]) -> (u32, u32) {
    let reader = hound::WavReader::new(std::io::Cursor::new(bytes)).unwrap();
    (reader.spec().sample_rate, reader.duration())
}
