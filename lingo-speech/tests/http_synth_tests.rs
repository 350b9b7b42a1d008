//! HTTP synthesis client against an in-process endpoint
//!
//! An axum router on 127.0.0.1:0 stands in for the synthesis service.

mod helpers;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use helpers::RecordingSink;
use lingo_speech::{
    AudioSource, HttpSynthesizer, PlayOutcome, SpeechCache, SpeechError, SpeechRequest,
    SpeechSession, SpeechSynthesizer, StaticTokenProvider, SynthesisRequest,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const AUDIO: &[u8] = b"ID3\x04fake-mp3-frames";

/// Start `router` on an ephemeral port, return its base URL
async fn spawn_endpoint(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Echoes the Authorization header back as `source`
async fn resolve_ok(
    State(hits): State<Arc<AtomicUsize>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    hits.fetch_add(1, Ordering::SeqCst);
    assert!(body["fileName"].as_str().unwrap().ends_with(".mp3"));
    assert!(body["text"].is_string());
    assert!(body["language"].is_string());

    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("none")
        .to_string();

    Json(json!({
        "success": true,
        "encodedMP3": STANDARD.encode(AUDIO),
        "source": auth,
    }))
}

async fn resolve_rejected() -> Json<Value> {
    Json(json!({ "success": false, "error": "voice not available" }))
}

async fn resolve_bad_base64() -> Json<Value> {
    Json(json!({ "success": true, "encodedMP3": "%%%not-base64%%%" }))
}

async fn resolve_server_error() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "boom")
}

fn ok_router(hits: Arc<AtomicUsize>) -> Router {
    Router::new()
        .route("/resolve", post(resolve_ok))
        .with_state(hits)
}

fn client(base: &str, token: Option<&str>) -> HttpSynthesizer {
    HttpSynthesizer::new(
        format!("{}/resolve", base),
        Arc::new(StaticTokenProvider::new(token.map(str::to_string))),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn request(text: &str) -> SynthesisRequest {
    SynthesisRequest {
        file_name: SpeechCache::file_name(text, "fr"),
        text: text.to_string(),
        language: "fr".to_string(),
    }
}

#[tokio::test]
async fn test_success_sends_bearer_token() {
    let base = spawn_endpoint(ok_router(Arc::new(AtomicUsize::new(0)))).await;

    let speech = client(&base, Some("id-token-1"))
        .synthesize(&request("chat"))
        .await
        .unwrap();

    assert_eq!(speech.audio, AUDIO);
    assert_eq!(speech.source.as_deref(), Some("Bearer id-token-1"));
}

#[tokio::test]
async fn test_missing_token_sends_no_auth_header() {
    let base = spawn_endpoint(ok_router(Arc::new(AtomicUsize::new(0)))).await;

    let speech = client(&base, None).synthesize(&request("chien")).await.unwrap();
    assert_eq!(speech.source.as_deref(), Some("none"));
}

#[tokio::test]
async fn test_success_false_is_rejected() {
    let base = spawn_endpoint(Router::new().route("/resolve", post(resolve_rejected))).await;

    match client(&base, None).synthesize(&request("oiseau")).await {
        Err(SpeechError::Rejected(msg)) => assert_eq!(msg, "voice not available"),
        other => panic!("expected Rejected, got {:?}", other),
    }
}

#[tokio::test]
async fn test_bad_base64_is_malformed() {
    let base = spawn_endpoint(Router::new().route("/resolve", post(resolve_bad_base64))).await;

    let result = client(&base, None).synthesize(&request("poisson")).await;
    assert!(matches!(result, Err(SpeechError::MalformedResponse(_))));
}

#[tokio::test]
async fn test_server_error_status() {
    let base = spawn_endpoint(Router::new().route("/resolve", post(resolve_server_error))).await;

    match client(&base, None).synthesize(&request("cheval")).await {
        Err(SpeechError::Api(status, body)) => {
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("expected Api error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_endpoint_is_network_error() {
    // Bind then drop to get a port nobody listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = client(&format!("http://{}", addr), None)
        .synthesize(&request("vache"))
        .await;
    assert!(matches!(result, Err(SpeechError::Network(_))));
}

#[tokio::test]
async fn test_session_over_http_caches_once() {
    let hits = Arc::new(AtomicUsize::new(0));
    let base = spawn_endpoint(ok_router(hits.clone())).await;
    let temp_dir = TempDir::new().unwrap();

    let sink = Arc::new(RecordingSink::default());
    let session = SpeechSession::new(
        SpeechCache::new(temp_dir.path(), Some(10)),
        Arc::new(client(&base, Some("tok"))),
        sink.clone(),
    );

    let request = SpeechRequest::new("merci", "fr");
    let first = session.play(&request).await.unwrap();
    let second = session.play(&request).await.unwrap();

    assert!(matches!(
        first,
        PlayOutcome::Played {
            source: AudioSource::Synthesized,
            ..
        }
    ));
    assert!(matches!(
        second,
        PlayOutcome::Played {
            source: AudioSource::Cache,
            ..
        }
    ));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(sink.played(), vec![AUDIO.to_vec(), AUDIO.to_vec()]);
}
