//! Gemini client against a local fake of the generative API

mod helpers;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use dogpost_publisher::error::PipelineError;
use dogpost_publisher::services::gemini_client::{GeminiClient, GeminiConfig, ModelStrategy};
use dogpost_publisher::types::{ContentContext, ContentGenerator};
use helpers::{plain_jpeg, spawn_server};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Clone, Default)]
struct FakeGemini {
    /// Listing response; `None` answers 500
    models: Option<Value>,
    /// Model → (status, body)
    replies: HashMap<String, (u16, String)>,
    /// Model whose generate call hangs past the client timeout
    stalled: Option<String>,
    calls: Arc<Mutex<Vec<String>>>,
    bodies: Arc<Mutex<Vec<Value>>>,
    keys: Arc<Mutex<Vec<String>>>,
}

async fn list_models(State(fake): State<FakeGemini>) -> (StatusCode, Json<Value>) {
    match &fake.models {
        Some(models) => (StatusCode::OK, Json(models.clone())),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": {"code": 500}})),
        ),
    }
}

async fn generate(
    State(fake): State<FakeGemini>,
    Path(call): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> (StatusCode, String) {
    let model = call.trim_end_matches(":generateContent").to_string();
    fake.calls.lock().unwrap().push(model.clone());
    fake.bodies.lock().unwrap().push(body);
    fake.keys
        .lock()
        .unwrap()
        .push(query.get("key").cloned().unwrap_or_default());
    if fake.stalled.as_deref() == Some(model.as_str()) {
        tokio::time::sleep(Duration::from_secs(3)).await;
    }

    let (status, reply) = fake
        .replies
        .get(&model)
        .cloned()
        .unwrap_or((404, format!("{{\"error\":\"unknown model {}\"}}", model)));
    (StatusCode::from_u16(status).unwrap(), reply)
}

async fn start(fake: FakeGemini) -> String {
    let router = Router::new()
        .route("/models", get(list_models))
        .route("/models/:call", post(generate))
        .with_state(fake);
    spawn_server(router).await
}

fn listing(names: &[&str]) -> Value {
    json!({
        "models": names
            .iter()
            .map(|n| json!({
                "name": format!("models/{}", n),
                "supportedGenerationMethods": ["generateContent", "countTokens"]
            }))
            .collect::<Vec<_>>()
    })
}

fn article_reply(title: &str) -> String {
    let article = json!({
        "filename": "river-walk",
        "title": title,
        "content": "## Walk\nBy the river.",
        "tags": ["walk"]
    });
    json!({
        "candidates": [{ "content": { "parts": [{ "text": article.to_string() }] } }]
    })
    .to_string()
}

fn config(base_url: String, strategy: ModelStrategy, default_model: &str) -> GeminiConfig {
    GeminiConfig {
        api_key: Some("test-key".to_string()),
        base_url,
        default_model: default_model.to_string(),
        model_strategy: strategy,
        backoff_ms: 200,
        timeout_secs: 5,
        ..Default::default()
    }
}

fn context() -> ContentContext {
    ContentContext {
        location_text: None,
        category: Some("daily".to_string()),
        memo: Some("first walk".to_string()),
    }
}

#[tokio::test]
async fn test_rate_limited_model_falls_back_after_backoff() {
    let fake = FakeGemini {
        models: Some(listing(&["gemini-a-flash", "gemini-b-pro"])),
        replies: HashMap::from([
            (
                "gemini-a-flash".to_string(),
                (429, "{\"error\":{\"code\":429,\"status\":\"RESOURCE_EXHAUSTED\"}}".to_string()),
            ),
            ("gemini-b-pro".to_string(), (200, article_reply("From B"))),
        ]),
        ..Default::default()
    };
    let calls = fake.calls.clone();
    let base = start(fake).await;

    let client = GeminiClient::new(&config(base, ModelStrategy::Ranked, "gemini-b-pro")).unwrap();
    let started = Instant::now();
    let draft = client.generate(&plain_jpeg(), &context()).await.unwrap();

    assert_eq!(draft.title, "From B");
    assert_eq!(draft.filename, "river-walk");
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(
        *calls.lock().unwrap(),
        vec!["gemini-a-flash".to_string(), "gemini-b-pro".to_string()]
    );
}

#[tokio::test]
async fn test_all_models_failed_keeps_last_body() {
    let fake = FakeGemini {
        models: Some(listing(&["gemini-a-flash", "gemini-b-pro"])),
        replies: HashMap::from([
            ("gemini-a-flash".to_string(), (429, "first".to_string())),
            ("gemini-b-pro".to_string(), (503, "second".to_string())),
        ]),
        ..Default::default()
    };
    let calls = fake.calls.clone();
    let base = start(fake).await;

    let client = GeminiClient::new(&config(base, ModelStrategy::Ranked, "gemini-b-pro")).unwrap();
    let err = client.generate(&plain_jpeg(), &context()).await.unwrap_err();

    match err {
        PipelineError::AllModelsFailed { last_error } => assert_eq!(last_error, "second"),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(calls.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_listing_failure_uses_default_model() {
    let fake = FakeGemini {
        models: None,
        replies: HashMap::from([(
            "gemini-1.5-flash".to_string(),
            (200, article_reply("Default")),
        )]),
        ..Default::default()
    };
    let calls = fake.calls.clone();
    let base = start(fake).await;

    let client =
        GeminiClient::new(&config(base, ModelStrategy::FirstMatch, "gemini-1.5-flash")).unwrap();
    let draft = client.generate(&plain_jpeg(), &context()).await.unwrap();

    assert_eq!(draft.title, "Default");
    assert_eq!(*calls.lock().unwrap(), vec!["gemini-1.5-flash".to_string()]);
}

#[tokio::test]
async fn test_first_match_uses_single_candidate() {
    let fake = FakeGemini {
        models: Some(listing(&["gemini-1.5-pro", "gemini-2.0-flash"])),
        replies: HashMap::from([(
            "gemini-2.0-flash".to_string(),
            (200, article_reply("Flash")),
        )]),
        ..Default::default()
    };
    let calls = fake.calls.clone();
    let bodies = fake.bodies.clone();
    let keys = fake.keys.clone();
    let base = start(fake).await;

    let client =
        GeminiClient::new(&config(base, ModelStrategy::FirstMatch, "gemini-1.5-flash")).unwrap();
    client.generate(&plain_jpeg(), &context()).await.unwrap();

    assert_eq!(*calls.lock().unwrap(), vec!["gemini-2.0-flash".to_string()]);
    assert_eq!(*keys.lock().unwrap(), vec!["test-key".to_string()]);

    let body = bodies.lock().unwrap()[0].clone();
    assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
    let parts = &body["contents"][0]["parts"];
    assert!(parts[0]["text"].as_str().unwrap().contains("- Memo: first walk"));
    assert_eq!(parts[1]["inline_data"]["mime_type"], "image/jpeg");
    assert!(!parts[1]["inline_data"]["data"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_article_is_not_retried() {
    let fenced = json!({
        "candidates": [{ "content": { "parts": [{ "text": "```json\n{}\n```" }] } }]
    })
    .to_string();
    let fake = FakeGemini {
        models: Some(listing(&["gemini-a-flash", "gemini-b-pro"])),
        replies: HashMap::from([
            ("gemini-a-flash".to_string(), (200, fenced)),
            ("gemini-b-pro".to_string(), (200, article_reply("Never"))),
        ]),
        ..Default::default()
    };
    let calls = fake.calls.clone();
    let base = start(fake).await;

    let client = GeminiClient::new(&config(base, ModelStrategy::Ranked, "gemini-b-pro")).unwrap();
    let err = client.generate(&plain_jpeg(), &context()).await.unwrap_err();

    assert!(matches!(err, PipelineError::MalformedGeneration(_)));
    assert_eq!(calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_stalled_model_times_out_and_falls_back() {
    let fake = FakeGemini {
        models: Some(listing(&["gemini-a-flash", "gemini-b-pro"])),
        replies: HashMap::from([
            ("gemini-a-flash".to_string(), (200, article_reply("Too late"))),
            ("gemini-b-pro".to_string(), (200, article_reply("From B"))),
        ]),
        stalled: Some("gemini-a-flash".to_string()),
        ..Default::default()
    };
    let calls = fake.calls.clone();
    let base = start(fake).await;

    let client = GeminiClient::new(&GeminiConfig {
        timeout_secs: 1,
        ..config(base, ModelStrategy::Ranked, "gemini-b-pro")
    })
    .unwrap();
    let draft = client.generate(&plain_jpeg(), &context()).await.unwrap();

    assert_eq!(draft.title, "From B");
    assert_eq!(
        *calls.lock().unwrap(),
        vec!["gemini-a-flash".to_string(), "gemini-b-pro".to_string()]
    );
}
