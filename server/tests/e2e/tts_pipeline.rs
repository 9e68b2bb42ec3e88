use std::time::Duration;

use axum::http::StatusCode;
use futures_util::future::join_all;

use crate::common::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_do_not_mix_audio() {
    let engine = FakeEngine::with_delay(Duration::from_millis(30));
    let app = create_test_app(engine.clone());

    let texts: Vec<String> = (1..=8).map(|n| "x".repeat(n * 3)).collect();
    let requests = texts.iter().map(|text| {
        let router = app.router.clone();
        let body = format!(r#"{{"text":"{text}"}}"#);
        async move {
            let response = send(&router, post_tts("/tts", body)).await;
            assert_eq!(response.status(), StatusCode::OK);
            body_bytes(response).await
        }
    });
    let bodies = join_all(requests).await;

    for (text, body) in texts.iter().zip(&bodies) {
        let (_, frames) = wav_shape(body);
        assert_eq!(frames as usize, text.len() * FRAMES_PER_CHAR);
    }
    assert_eq!(engine.calls(), texts.len());
    assert_eq!(app.leftover_files(), 0);
}

#[tokio::test]
async fn test_repeated_requests_stay_valid() {
    let engine = FakeEngine::new();
    let app = create_test_app(engine.clone());

    let mut first = None;
    for _ in 0..5 {
        let response = send(&app.router, post_tts("/tts", r#"{"text":"again"}"#)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_bytes(response).await;
        assert_eq!(&body[..4], b"RIFF");
        match &first {
            None => first = Some(body),
            Some(prev) => assert_eq!(prev, &body),
        }
    }
    // cache disabled: every request synthesizes
    assert_eq!(engine.calls(), 5);
    assert_eq!(app.leftover_files(), 0);
}

#[tokio::test]
async fn test_cache_hits_reported_in_metrics() {
    let engine = FakeEngine::new();
    let app = create_test_app_with(engine.clone(), test_config(), 10);

    for _ in 0..3 {
        let response = send(&app.router, post_tts("/tts", r#"{"text":"cached"}"#)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    let other = send(&app.router, get("/api/tts?text=other")).await;
    assert_eq!(other.status(), StatusCode::OK);

    assert_eq!(engine.calls(), 2);

    let json = body_json(send(&app.router, get("/api/metrics")).await).await;
    assert_eq!(json["synthesis"]["cache_hits"], 2);
    assert_eq!(json["synthesis"]["cache_misses"], 2);
    assert_eq!(json["synthesis"]["synthesis_count"], 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_identical_concurrent_requests_share_synthesis() {
    let engine = FakeEngine::with_delay(Duration::from_millis(200));
    let app = create_test_app_with(engine.clone(), test_config(), 10);

    let requests = (0..4).map(|_| {
        let router = app.router.clone();
        async move {
            let response = send(&router, post_tts("/tts", r#"{"text":"same"}"#)).await;
            assert_eq!(response.status(), StatusCode::OK);
            body_bytes(response).await
        }
    });
    let bodies = join_all(requests).await;

    assert!(bodies.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(engine.calls(), 1);
}
