pub mod config;
pub mod error;
pub mod metrics;
pub mod routes;
pub mod validation;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Request, State},
    http::{HeaderValue, Method},
    middleware::Next,
    response::Response,
    routing::get,
    Router,
};
use tower::ServiceBuilder;
use tower_governor::{governor::GovernorConfigBuilder, key_extractor::GlobalKeyExtractor, GovernorLayer};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tts_core::SpeechService;

use crate::config::ServerConfig;
use crate::metrics::AppMetrics;

#[derive(Clone)]
pub struct AppState {
    pub speech: Arc<SpeechService>,
    pub metrics: AppMetrics,
    /// Every routed request, not only `/tts`
    pub request_count: Arc<AtomicU64>,
    pub config: Arc<ServerConfig>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(speech: Arc<SpeechService>, config: ServerConfig) -> Self {
        Self {
            speech,
            metrics: AppMetrics::default(),
            request_count: Arc::new(AtomicU64::new(0)),
            config: Arc::new(config),
            started_at: Instant::now(),
        }
    }
}

/// Build the full router: routes at the root and again under `/api`.
pub fn build_app(state: AppState) -> Router {
    let config = Arc::clone(&state.config);

    let api = Router::new()
        .route("/health", get(routes::health_check))
        .route("/healthz", get(routes::health_check))
        .route("/tts", get(routes::tts_get).post(routes::tts_post))
        .route("/metrics", get(routes::metrics_endpoint));

    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .layer(cors_layer(&config))
        .into_inner();

    let mut app = Router::new()
        .merge(api.clone()) // root paths
        .nest("/api", api) // /api prefix
        .layer(axum::middleware::from_fn_with_state(state.clone(), add_request_id));

    // Global limit: every client shares one bucket, which also behaves behind proxies.
    if config.rate_limit_per_minute > 0 {
        let per_request_ms = (60_000 / config.rate_limit_per_minute as u64).max(1);
        match GovernorConfigBuilder::default()
            .per_millisecond(per_request_ms)
            .burst_size(config.rate_limit_per_minute)
            .key_extractor(GlobalKeyExtractor)
            .finish()
        {
            Some(governor_conf) => {
                info!("Rate limiting: {} requests per minute", config.rate_limit_per_minute);
                app = app.layer(GovernorLayer::new(governor_conf));
            }
            None => warn!("Invalid rate limit configuration, rate limiting disabled"),
        }
    }

    app.layer(middleware_stack).with_state(state)
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(false);

    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .flatten()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();

    if origins.is_empty() {
        if config.cors_allowed_origins.is_some() {
            warn!("CORS_ALLOWED_ORIGINS has no usable origin, falling back to permissive CORS");
        }
        base.allow_origin(Any)
    } else {
        info!("CORS configured for {} origin(s)", origins.len());
        base.allow_origin(AllowOrigin::list(origins))
    }
}

// Request ID middleware for tracing; also counts requests
async fn add_request_id(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    let request_id = uuid::Uuid::new_v4().to_string();
    let header = HeaderValue::from_str(&request_id).ok();
    if let Some(value) = &header {
        request.headers_mut().insert("x-request-id", value.clone());
    }
    let mut response = next.run(request).await;
    if let Some(value) = header {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}
