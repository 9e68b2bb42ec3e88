pub mod config;
pub mod engine;
pub mod error;
pub mod text;
pub mod transient;
pub mod wav;

use std::{
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use bytes::Bytes;
use dashmap::DashMap;
use lru::LruCache;
use tokio::sync::{Mutex as TokioMutex, OnceCell, Semaphore};
use tracing::{debug, info};

pub use config::{EngineConfig, PiperCliConfig};
pub use engine::{build_engine, EngineChain, SynthesisEngine};
pub use error::SynthesisError;
pub use text::normalize_text;
pub use transient::TransientAudioFile;
pub use wav::WavSummary;

/// A validated WAV payload.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub wav: Bytes,
    pub summary: WavSummary,
}

/// Result of [`SpeechService::synthesize`].
#[derive(Debug, Clone)]
pub struct Synthesized {
    pub wav: Bytes,
    pub summary: WavSummary,
    /// Served from the response cache or from another request's synthesis.
    pub cache_hit: bool,
    /// Time spent in the engine; zero for cache hits.
    pub synthesis_time: Duration,
}

pub type SharedError = Arc<SynthesisError>;

type Shared = Result<(Rendered, Duration), SharedError>;

// Cached audio response
struct CachedAudio {
    rendered: Rendered,
    cached_at: Instant,
}

/// Run one synthesis end to end on the current (blocking) thread.
///
/// The transient file lives exactly as long as this call.
pub fn render_to_wav(
    engine: &dyn SynthesisEngine,
    text: &str,
    tmp_dir: &Path,
) -> Result<Rendered, SynthesisError> {
    let file = TransientAudioFile::acquire_in(tmp_dir)?;
    engine.synthesize(text, file.path())?;
    let bytes = file.read_all()?;
    if bytes.is_empty() {
        return Err(SynthesisError::MissingOutput);
    }
    let summary = wav::inspect(&bytes)?;
    Ok(Rendered {
        wav: Bytes::from(bytes),
        summary,
    })
}

/// Shared handle to the synthesis engine.
///
/// Built once at startup and passed to request handlers. Synthesis runs on
/// tokio's blocking pool, bounded by `max_concurrent` permits; identical
/// concurrent requests share one synthesis and finished results are cached.
pub struct SpeechService {
    engine: Arc<dyn SynthesisEngine>,
    permits: Arc<Semaphore>,
    tmp_dir: PathBuf,
    cache: Option<TokioMutex<LruCache<String, CachedAudio>>>,
    cache_ttl: Duration,
    inflight: DashMap<String, Arc<OnceCell<Shared>>>,
}

impl SpeechService {
    pub fn new(engine: Arc<dyn SynthesisEngine>, config: &EngineConfig) -> Self {
        let cache = if config.cache_enabled() {
            NonZeroUsize::new(config.cache_max).map(|cap| TokioMutex::new(LruCache::new(cap)))
        } else {
            None
        };
        Self {
            engine,
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            tmp_dir: config.tmp_dir.clone(),
            cache,
            cache_ttl: config.cache_ttl(),
            inflight: DashMap::new(),
        }
    }

    /// Load the engines named in `config`. Blocks while models load.
    pub fn from_config(config: &EngineConfig) -> anyhow::Result<Self> {
        let chain = build_engine(config)?;
        if chain.is_empty() {
            info!("No TTS engine configured; /tts will answer 501");
        } else {
            info!("TTS engine chain: {}", chain.name());
        }
        Ok(Self::new(Arc::new(chain), config))
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Turn `text` into WAV bytes.
    pub async fn synthesize(&self, text: &str) -> Result<Synthesized, SharedError> {
        if let Some(rendered) = self.cache_get(text).await {
            debug!("TTS cache hit ({} chars)", text.chars().count());
            return Ok(Synthesized {
                wav: rendered.wav,
                summary: rendered.summary,
                cache_hit: true,
                synthesis_time: Duration::ZERO,
            });
        }

        let cell = self
            .inflight
            .entry(text.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .value()
            .clone();
        let _guard = InflightGuard {
            map: &self.inflight,
            key: text,
            cell: &cell,
        };

        let mut leader = false;
        let (rendered, synthesis_time) = cell
            .get_or_init(|| {
                leader = true;
                self.render(text.to_string())
            })
            .await
            .clone()?;

        if leader {
            self.cache_put(text, &rendered).await;
        }

        Ok(Synthesized {
            wav: rendered.wav,
            summary: rendered.summary,
            cache_hit: !leader,
            synthesis_time: if leader { synthesis_time } else { Duration::ZERO },
        })
    }

    async fn render(&self, text: String) -> Shared {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| Arc::new(SynthesisError::Worker(e.to_string())))?;
        let engine = Arc::clone(&self.engine);
        let tmp_dir = self.tmp_dir.clone();

        // The worker owns the permit and the transient file, so a cancelled
        // request cannot free either while the engine is still writing.
        let result = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let started = Instant::now();
            render_to_wav(engine.as_ref(), &text, &tmp_dir).map(|r| (r, started.elapsed()))
        })
        .await;

        match result {
            Ok(Ok(done)) => Ok(done),
            Ok(Err(e)) => Err(Arc::new(e)),
            Err(join_err) => Err(Arc::new(SynthesisError::Worker(join_err.to_string()))),
        }
    }

    async fn cache_get(&self, text: &str) -> Option<Rendered> {
        let mut cache = self.cache.as_ref()?.lock().await;
        let entry = cache.get(text)?;
        if entry.cached_at.elapsed() < self.cache_ttl {
            return Some(entry.rendered.clone());
        }
        // expired
        cache.pop(text);
        None
    }

    async fn cache_put(&self, text: &str, rendered: &Rendered) {
        if let Some(cache) = &self.cache {
            cache.lock().await.put(
                text.to_string(),
                CachedAudio {
                    rendered: rendered.clone(),
                    cached_at: Instant::now(),
                },
            );
        }
    }
}

/// Drops the in-flight entry once its result is known or nobody waits on it.
struct InflightGuard<'a> {
    map: &'a DashMap<String, Arc<OnceCell<Shared>>>,
    key: &'a str,
    cell: &'a Arc<OnceCell<Shared>>,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.map.remove_if(self.key, |_, current| {
            // map entry + this guard's clone
            Arc::ptr_eq(current, self.cell)
                && (self.cell.initialized() || Arc::strong_count(current) <= 2)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Writes a WAV whose frame count equals the text's char count.
    struct CountingEngine {
        calls: AtomicUsize,
        delay: Duration,
    }

    impl CountingEngine {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay,
            })
        }
    }

    impl SynthesisEngine for CountingEngine {
        fn name(&self) -> &str {
            "counting"
        }

        fn synthesize(&self, text: &str, destination: &Path) -> Result<(), SynthesisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            if text == "fail" {
                return Err(SynthesisError::engine("counting", "refused"));
            }
            let samples = vec![0.25f32; text.chars().count()];
            wav::write_samples(destination, &samples, 16_000)
        }
    }

    struct SilentEngine;

    impl SynthesisEngine for SilentEngine {
        fn name(&self) -> &str {
            "silent"
        }

        fn synthesize(&self, _text: &str, _destination: &Path) -> Result<(), SynthesisError> {
            Ok(())
        }
    }

    fn config(dir: &Path, cache_max: usize) -> EngineConfig {
        EngineConfig {
            cache_max,
            max_concurrent: 4,
            tmp_dir: dir.to_path_buf(),
            ..EngineConfig::default()
        }
    }

    fn files_in(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_render_to_wav_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let engine = CountingEngine::new(Duration::ZERO);
        let rendered = render_to_wav(engine.as_ref(), "Olá mundo", dir.path()).unwrap();
        assert_eq!(rendered.summary.frames, 9);
        assert_eq!(&rendered.wav[0..4], b"RIFF");
        assert_eq!(files_in(dir.path()), 0);
    }

    #[test]
    fn test_render_to_wav_removes_file_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let engine = CountingEngine::new(Duration::ZERO);
        assert!(render_to_wav(engine.as_ref(), "fail", dir.path()).is_err());
        assert_eq!(files_in(dir.path()), 0);
    }

    #[test]
    fn test_engine_that_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let err = render_to_wav(&SilentEngine, "hello", dir.path()).unwrap_err();
        assert!(matches!(err, SynthesisError::MissingOutput));
        assert_eq!(files_in(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_cache_serves_repeated_text() {
        let dir = tempfile::tempdir().unwrap();
        let engine = CountingEngine::new(Duration::ZERO);
        let service = SpeechService::new(engine.clone(), &config(dir.path(), 10));

        let first = service.synthesize("Olá mundo").await.unwrap();
        let second = service.synthesize("Olá mundo").await.unwrap();
        assert!(!first.cache_hit);
        assert!(second.cache_hit);
        assert_eq!(first.wav, second.wav);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
        assert!(service.inflight.is_empty());
    }

    #[tokio::test]
    async fn test_without_cache_each_request_synthesizes() {
        let dir = tempfile::tempdir().unwrap();
        let engine = CountingEngine::new(Duration::ZERO);
        let service = SpeechService::new(engine.clone(), &config(dir.path(), 0));

        for _ in 0..3 {
            let out = service.synthesize("Olá mundo").await.unwrap();
            assert!(!out.cache_hit);
            assert!(wav::inspect(&out.wav).is_ok());
        }
        assert_eq!(engine.calls.load(Ordering::SeqCst), 3);
        assert_eq!(files_in(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let engine = CountingEngine::new(Duration::ZERO);
        let service = SpeechService::new(engine.clone(), &config(dir.path(), 10));

        assert!(service.synthesize("fail").await.is_err());
        assert!(service.synthesize("fail").await.is_err());
        assert_eq!(engine.calls.load(Ordering::SeqCst), 2);
        assert_eq!(files_in(dir.path()), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_identical_requests_coalesce() {
        let dir = tempfile::tempdir().unwrap();
        let engine = CountingEngine::new(Duration::from_millis(200));
        let service = Arc::new(SpeechService::new(engine.clone(), &config(dir.path(), 0)));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let service = Arc::clone(&service);
                tokio::spawn(async move { service.synthesize("mesmo texto").await })
            })
            .collect();
        let mut leaders = 0;
        for task in tasks {
            let out = task.await.unwrap().unwrap();
            assert_eq!(out.summary.frames, 11);
            if !out.cache_hit {
                leaders += 1;
            }
        }
        assert_eq!(leaders, 1);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
        assert!(service.inflight.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_different_texts_stay_separate() {
        let dir = tempfile::tempdir().unwrap();
        let engine = CountingEngine::new(Duration::from_millis(50));
        let service = Arc::new(SpeechService::new(engine.clone(), &config(dir.path(), 10)));

        let a = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.synthesize("curto").await })
        };
        let b = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.synthesize("um texto bem mais longo").await })
        };
        assert_eq!(a.await.unwrap().unwrap().summary.frames, 5);
        assert_eq!(b.await.unwrap().unwrap().summary.frames, 23);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unconfigured_chain() {
        let dir = tempfile::tempdir().unwrap();
        let service = SpeechService::new(Arc::new(EngineChain::new(Vec::new())), &config(dir.path(), 10));
        let err = service.synthesize("Olá").await.unwrap_err();
        assert!(matches!(*err, SynthesisError::NotConfigured));
        assert_eq!(files_in(dir.path()), 0);
    }
}
