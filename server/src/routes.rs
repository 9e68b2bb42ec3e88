use std::sync::atomic::Ordering;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use tracing::info;
use tts_core::{normalize_text, wav};

use crate::error::ApiError;
use crate::metrics::{DetailedMetricsResponse, EndpointMetricsResponse, SystemMetrics};
use crate::validation::{text_from_body, validate_tts_text, TextDecision};
use crate::AppState;

#[derive(Deserialize)]
pub struct TtsQuery {
    text: Option<String>,
}

pub async fn health_check() -> &'static str {
    "ok"
}

/// `POST /tts` with `{"text": "..."}`. The body is parsed leniently.
pub async fn tts_post(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    speak(&state, text_from_body(&body)).await
}

/// `GET /tts?text=...`
pub async fn tts_get(
    State(state): State<AppState>,
    Query(query): Query<TtsQuery>,
) -> Result<Response, ApiError> {
    speak(&state, query.text.unwrap_or_default()).await
}

async fn speak(state: &AppState, raw_text: String) -> Result<Response, ApiError> {
    let started = Instant::now();

    let text = normalize_text(&raw_text);
    let result = synthesize_response(state, &text).await;

    let metrics = &state.metrics.tts;
    metrics.record_request(started.elapsed().as_millis() as u64);
    if result.is_err() {
        metrics.record_error();
    }
    result
}

async fn synthesize_response(state: &AppState, text: &str) -> Result<Response, ApiError> {
    if validate_tts_text(text, &state.config)? == TextDecision::Silence {
        let silent = wav::silence(state.config.silence_ms, state.config.silence_sample_rate)
            .map_err(|e| ApiError::InternalError(e.to_string()))?;
        state.metrics.synthesis.record_silence(silent.len());
        return Ok(wav_response(Bytes::from(silent)));
    }

    let out = state.speech.synthesize(text).await?;

    state.metrics.synthesis.record_synthesis(
        out.synthesis_time.as_millis() as u64,
        out.wav.len(),
        out.cache_hit,
    );
    info!(
        chars = text.chars().count(),
        bytes = out.wav.len(),
        audio_ms = out.summary.duration_ms(),
        synthesis_ms = out.synthesis_time.as_millis() as u64,
        cache_hit = out.cache_hit,
        "Synthesized speech"
    );

    Ok(wav_response(out.wav))
}

fn wav_response(wav: Bytes) -> Response {
    (
        [
            (header::CONTENT_TYPE, "audio/wav"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        wav,
    )
        .into_response()
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> Json<DetailedMetricsResponse> {
    let mut system = sysinfo::System::new();
    system.refresh_memory();

    let memory_used = system.used_memory();
    let memory_total = system.total_memory();
    let memory_usage_percent = if memory_total > 0 {
        (memory_used as f64 / memory_total as f64 * 100.0) as f32
    } else {
        0.0
    };

    Json(DetailedMetricsResponse {
        timestamp: chrono::Utc::now(),
        system: SystemMetrics {
            memory_used_mb: memory_used / 1024 / 1024,
            memory_total_mb: memory_total / 1024 / 1024,
            memory_usage_percent,
            request_count: state.request_count.load(Ordering::Relaxed),
            uptime_seconds: state.started_at.elapsed().as_secs(),
            engine: state.speech.engine_name().to_string(),
        },
        endpoints: EndpointMetricsResponse {
            tts: state.metrics.tts.snapshot(),
        },
        synthesis: state.metrics.synthesis.snapshot(),
    })
}
