mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::Query;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;

use ai_image_captioner::config::SpeechSettings;
use ai_image_captioner::{Failure, FailureKind, GoogleTranslateSpeech, SpeechSynthesizer};

use common::{closed_port, spawn_upstream, Recorder, BICYCLE};

fn speech_for(base: String) -> GoogleTranslateSpeech {
    speech_with_timeout(base, Duration::from_secs(5))
}

fn speech_with_timeout(base: String, timeout: Duration) -> GoogleTranslateSpeech {
    GoogleTranslateSpeech::new(&SpeechSettings {
        enabled: true,
        language: "en".to_string(),
        api_base: base,
        timeout,
    })
    .unwrap()
}

/// A TTS stub that answers each chunk with `status` and a fake MP3 frame
/// tagged with the chunk index.
async fn tts_upstream(status: StatusCode) -> (String, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let seen = recorder.clone();

    let router = Router::new().route(
        "/translate_tts",
        get(move |Query(params): Query<HashMap<String, String>>| {
            let seen = seen.clone();
            async move {
                seen.hit();
                let idx: u8 = params.get("idx").and_then(|i| i.parse().ok()).unwrap_or(0);
                let mut pairs: Vec<(String, String)> = params.into_iter().collect();
                pairs.sort();
                seen.queries.lock().unwrap().push(pairs);
                (status, vec![0xFF, 0xFB, idx])
            }
        }),
    );

    let addr = spawn_upstream(router).await;
    (format!("http://{addr}"), recorder)
}

fn param<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

#[tokio::test]
async fn short_caption_is_one_request() {
    let (base, recorder) = tts_upstream(StatusCode::OK).await;

    let audio = speech_for(base).synthesize(BICYCLE).await.unwrap();

    assert_eq!(audio.mime_type(), "audio/mpeg");
    assert_eq!(audio.bytes().as_ref(), &[0xFF, 0xFB, 0]);
    assert_eq!(recorder.hits(), 1);

    let queries = recorder.queries.lock().unwrap();
    assert_eq!(param(&queries[0], "q"), Some(BICYCLE));
    assert_eq!(param(&queries[0], "tl"), Some("en"));
    assert_eq!(param(&queries[0], "client"), Some("tw-ob"));
    assert_eq!(param(&queries[0], "total"), Some("1"));
}

#[tokio::test]
async fn long_caption_is_chunked_and_joined_in_order() {
    let (base, recorder) = tts_upstream(StatusCode::OK).await;
    let text = BICYCLE.repeat(6);

    let audio = speech_for(base).synthesize(&text).await.unwrap();

    let hits = recorder.hits();
    assert!(hits > 1);
    let expected: Vec<u8> = (0..hits as u8).flat_map(|i| [0xFF, 0xFB, i]).collect();
    assert_eq!(audio.bytes().as_ref(), expected.as_slice());

    let queries = recorder.queries.lock().unwrap();
    assert!(queries
        .iter()
        .all(|q| param(q, "q").map_or(0, |s| s.chars().count()) <= 100));
}

#[tokio::test]
async fn empty_text_makes_no_request() {
    let (base, recorder) = tts_upstream(StatusCode::OK).await;
    let speech = speech_for(base);

    for text in ["", "   ", "\n\t"] {
        let err = speech.synthesize(text).await.unwrap_err();
        assert_eq!(err, Failure::Synthesis("empty text".to_string()));
    }
    assert_eq!(recorder.hits(), 0);
}

#[tokio::test]
async fn upstream_error_status_is_a_synthesis_error() {
    let (base, _) = tts_upstream(StatusCode::TOO_MANY_REQUESTS).await;

    let err = speech_for(base).synthesize(BICYCLE).await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::SynthesisError);
    assert!(err.to_string().contains("429"));
}

#[tokio::test]
async fn unreachable_endpoint_is_a_synthesis_error() {
    let err = speech_for(format!("http://{}", closed_port()))
        .synthesize(BICYCLE)
        .await
        .unwrap_err();

    let Failure::Synthesis(details) = err else { panic!("expected a synthesis error") };
    assert!(!details.is_empty());
}

#[tokio::test]
async fn slow_tts_times_out() {
    let router = Router::new().route(
        "/translate_tts",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            vec![0xFFu8, 0xFB, 0x90]
        }),
    );
    let addr = spawn_upstream(router).await;

    let err = speech_with_timeout(format!("http://{addr}"), Duration::from_millis(200))
        .synthesize(BICYCLE)
        .await
        .unwrap_err();
    assert_eq!(err, Failure::Synthesis("timeout".to_string()));
}

#[tokio::test]
async fn empty_tts_body_is_a_synthesis_error() {
    let recorder = Arc::new(Recorder::default());
    let seen = recorder.clone();
    let router = Router::new().route(
        "/translate_tts",
        get(move || {
            let seen = seen.clone();
            async move {
                seen.hit();
                (StatusCode::OK, Body::empty())
            }
        }),
    );
    let addr = spawn_upstream(router).await;

    let err = speech_for(format!("http://{addr}"))
        .synthesize(BICYCLE)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        Failure::Synthesis("TTS endpoint returned no audio".to_string())
    );
    assert_eq!(recorder.hits(), 1);
}
