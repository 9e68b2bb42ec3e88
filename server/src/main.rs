use std::{net::SocketAddr, sync::Arc};

use tokio::net::TcpListener;
use tracing::{info, warn};

use server::config::ServerConfig;
use server::{build_app, AppState};
use tts_core::{EngineConfig, SpeechService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    async_main().await
}

async fn async_main() -> anyhow::Result<()> {
    info!("Starting TTS server...");

    let config = ServerConfig::from_env();
    let engine_config = EngineConfig::from_env();
    info!(
        "Server configuration loaded: port={}, rate_limit={}/min, request_timeout={}s, empty_text={:?}",
        config.port, config.rate_limit_per_minute, config.request_timeout_secs, config.empty_text
    );
    info!(
        "Engine configuration: max_concurrent={}, cache_max={}, tmp_dir={}",
        engine_config.max_concurrent,
        engine_config.cache_max,
        engine_config.tmp_dir.display()
    );

    // Model loading blocks; keep it off the async workers.
    let speech = tokio::task::spawn_blocking(move || SpeechService::from_config(&engine_config))
        .await
        .map_err(|e| anyhow::anyhow!("engine loader panicked: {e}"))??;
    let speech = Arc::new(speech);

    let app = build_app(AppState::new(Arc::clone(&speech), config.clone()));

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!("Failed to bind {addr}: {e}. Try a different PORT.")
    })?;

    info!("Server listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router (and its state) is gone; release the engine off the runtime.
    match Arc::try_unwrap(speech) {
        Ok(speech) => {
            let _ = tokio::task::spawn_blocking(move || drop(speech)).await;
            info!("TTS engine released");
        }
        Err(_) => warn!("TTS engine still referenced at shutdown"),
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping server...");
}
