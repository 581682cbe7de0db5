//! End-to-end tests for the generation pipeline over HTTP.
//!
//! A fake generative endpoint stands in for Gemini so the real client, the
//! normalizer, the store and the router are all exercised together.

use std::net::TcpListener;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use coursegen_gateway::{GeminiClient, GeminiConfig};
use coursegen_orchestrator::{
    create_router, AppState, GenerationSettings, MemoryStore, USER_ID_HEADER,
};
use serde_json::{json, Value};

/// Helper to find an available port for testing.
fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

// ============================================================================
// Fake generative endpoint
// ============================================================================

#[derive(Clone, Default)]
struct FakeModel {
    hits: Arc<AtomicU32>,
    /// Number of initial requests answered with 503.
    fail_first: u32,
}

fn candidate(text: &str) -> Value {
    json!({"candidates": [{"content": {"parts": [{"text": text}]}}]})
}

fn outline_text() -> String {
    let outline = json!({
        "title": "Intro to SQL",
        "description": "Query relational data.",
        "tags": ["sql", "databases"],
        "difficulty": "beginner",
        "modules": [
            {
                "title": "Selecting Data",
                "lessons": [
                    {"title": "SELECT basics", "description": "Columns and rows."},
                    {"title": "Filtering", "description": "WHERE clauses."}
                ]
            },
            {
                "title": "Joins",
                "lessons": [{"title": "Inner joins", "description": "Combining tables."}]
            }
        ]
    });
    format!("Here is your course:\n```json\n{outline}\n```")
}

fn lesson_text() -> String {
    json!({
        "objectives": ["Write a SELECT statement"],
        "content": [
            {"type": "heading", "content": "Reading rows", "metadata": {"level": 2}, "order": 1},
            {"type": "code", "content": "SELECT * FROM users;", "metadata": {"language": "sql"}, "order": 2},
            {"type": "video", "content": {"searchQuery": "sql select tutorial"}, "order": 3},
            {"type": "diagram", "content": "users -> orders", "order": 4},
            {"type": "quiz", "content": {
                "question": "Which keyword reads rows?",
                "options": ["INSERT", "SELECT", "DROP"],
                "correctAnswer": 9
            }, "order": 5}
        ]
    })
    .to_string()
}

async fn handle_generate(State(model): State<FakeModel>, Json(body): Json<Value>) -> Response {
    let hit = model.hits.fetch_add(1, Ordering::SeqCst) + 1;
    if hit <= model.fail_first {
        return (StatusCode::SERVICE_UNAVAILABLE, "overloaded").into_response();
    }

    let prompt = body["contents"][0]["parts"][0]["text"]
        .as_str()
        .unwrap_or_default();
    let text = if prompt.contains("curriculum designer") {
        outline_text()
    } else {
        lesson_text()
    };
    Json(candidate(&text)).into_response()
}

async fn spawn_fake_model(model: FakeModel) -> String {
    let router = Router::new().fallback(handle_generate).with_state(model);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind fake model");
    let addr = listener.local_addr().expect("Failed to get local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Fake model failed");
    });
    format!("http://{addr}")
}

// ============================================================================
// Server under test
// ============================================================================

/// Spawns the API server backed by the fake model and returns its base URL.
async fn spawn_test_server(model: FakeModel) -> String {
    let model_url = spawn_fake_model(model).await;
    let client = GeminiClient::new(
        GeminiConfig::default()
            .with_api_key("test-key")
            .with_base_url(model_url)
            .with_retry(3, 1),
    )
    .expect("Failed to build client");

    let state = AppState::new(
        Arc::new(client),
        Arc::new(MemoryStore::new()),
        GenerationSettings::default(),
    );
    let router = create_router(state);

    let port = find_available_port();
    let addr = format!("127.0.0.1:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    // Give the server a moment to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    format!("http://{addr}/api")
}

async fn call(
    client: &reqwest::Client,
    method: reqwest::Method,
    url: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = client.request(method, url).header(USER_ID_HEADER, "alice");
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request.send().await.expect("Request failed");
    let status = StatusCode::from_u16(response.status().as_u16()).expect("Invalid status");
    let body = response.json().await.unwrap_or(Value::Null);
    (status, body)
}

// ============================================================================
// Tests
// ============================================================================

/// Tests the full flow from course generation to course completion.
#[tokio::test]
async fn test_generate_read_and_complete_course() {
    let base = spawn_test_server(FakeModel::default()).await;
    let client = reqwest::Client::new();

    let (status, body) = call(
        &client,
        reqwest::Method::POST,
        &format!("{base}/courses/generate"),
        Some(json!({"topic": "SQL", "difficulty": "beginner", "duration": "1 week"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "body: {body}");
    let course = &body["data"]["course"];
    assert_eq!(course["title"], "Intro to SQL");
    assert_eq!(course["isEnriched"], false);
    let course_id = course["id"].as_str().expect("course id").to_string();

    // Read-through enrichment of the first lesson
    let (status, body) = call(
        &client,
        reqwest::Method::GET,
        &format!("{base}/lessons/course/{course_id}/module/0/lesson/0"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {body}");
    let lesson = &body["data"];
    assert_eq!(lesson["isEnriched"], true);
    assert_eq!(lesson["enrichmentLevel"], 1);

    let blocks = lesson["content"].as_array().expect("content array");
    assert_eq!(blocks.len(), 5);
    let orders: Vec<u64> = blocks
        .iter()
        .map(|b| b["order"].as_u64().expect("order"))
        .collect();
    assert_eq!(orders, vec![0, 1, 2, 3, 4]);
    assert_eq!(blocks[1]["language"], "sql");
    assert_eq!(blocks[2]["searchQuery"], "sql select tutorial");
    assert_eq!(blocks[3]["type"], "paragraph");
    assert!(blocks[3]["text"]
        .as_str()
        .expect("placeholder text")
        .contains("diagram"));
    assert_eq!(blocks[4]["type"], "mcq");
    assert_eq!(blocks[4]["answer"], 0);

    // Complete every lesson
    let (_, detail) = call(
        &client,
        reqwest::Method::GET,
        &format!("{base}/courses/{course_id}"),
        None,
    )
    .await;
    let lesson_ids: Vec<String> = detail["data"]["modules"]
        .as_array()
        .expect("modules")
        .iter()
        .flat_map(|m| m["lessonSummaries"].as_array().cloned().unwrap_or_default())
        .map(|l| l["id"].as_str().expect("lesson id").to_string())
        .collect();
    assert_eq!(lesson_ids.len(), 3);

    let mut last = Value::Null;
    for lesson_id in &lesson_ids {
        let (status, body) = call(
            &client,
            reqwest::Method::POST,
            &format!("{base}/progress/course/{course_id}/lesson/{lesson_id}/complete"),
            Some(json!({"timeSpent": 60})),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "body: {body}");
        last = body;
    }
    assert_eq!(last["data"]["course"]["newlyCompleted"], true);
    assert_eq!(last["data"]["progress"]["progressPercentage"], 100);
    assert_eq!(last["data"]["progress"]["totalTimeSpent"], 180);

    // Markdown export reflects the generated lesson
    let response = client
        .get(format!("{base}/courses/{course_id}/export"))
        .header(USER_ID_HEADER, "alice")
        .send()
        .await
        .expect("Export failed");
    assert_eq!(response.status().as_u16(), 200);
    let markdown = response.text().await.expect("Export body");
    assert!(markdown.starts_with("# Intro to SQL"));
    assert!(markdown.contains("SELECT * FROM users;"));
    assert!(markdown.contains("**Question:** Which keyword reads rows?"));
}

/// Tests that transient upstream failures are retried by the gateway.
#[tokio::test]
async fn test_gateway_retries_transient_failures() {
    let model = FakeModel {
        fail_first: 2,
        ..FakeModel::default()
    };
    let hits = model.hits.clone();
    let base = spawn_test_server(model).await;

    let (status, body) = call(
        &reqwest::Client::new(),
        reqwest::Method::POST,
        &format!("{base}/courses/generate"),
        Some(json!({"topic": "SQL"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "body: {body}");
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

/// Tests that an exhausted gateway surfaces an API error and stores nothing.
#[tokio::test]
async fn test_gateway_exhaustion_stores_nothing() {
    let base = spawn_test_server(FakeModel {
        fail_first: u32::MAX,
        ..FakeModel::default()
    })
    .await;
    let client = reqwest::Client::new();

    let (status, body) = call(
        &client,
        reqwest::Method::POST,
        &format!("{base}/courses/generate"),
        Some(json!({"topic": "SQL"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "API_ERROR");
    assert_eq!(body["error"]["details"]["status"], 503);

    let (_, body) = call(&client, reqwest::Method::GET, &format!("{base}/courses"), None).await;
    assert_eq!(body["data"], json!([]));
}

/// Tests that concurrent completions of different lessons are all kept.
#[tokio::test]
async fn test_concurrent_completions() {
    let base = spawn_test_server(FakeModel::default()).await;
    let client = reqwest::Client::new();

    let (_, body) = call(
        &client,
        reqwest::Method::POST,
        &format!("{base}/courses/generate"),
        Some(json!({"topic": "SQL"})),
    )
    .await;
    let course_id = body["data"]["course"]["id"]
        .as_str()
        .expect("course id")
        .to_string();
    let lesson_ids: Vec<String> = body["data"]["modules"]
        .as_array()
        .expect("modules")
        .iter()
        .flat_map(|m| m["lessonSummaries"].as_array().cloned().unwrap_or_default())
        .map(|l| l["id"].as_str().expect("lesson id").to_string())
        .collect();

    let client = &client;
    let requests = lesson_ids.iter().map(|lesson_id| {
        let url = format!("{base}/progress/course/{course_id}/lesson/{lesson_id}/complete");
        async move {
            call(
                client,
                reqwest::Method::POST,
                &url,
                Some(json!({"timeSpent": 5})),
            )
            .await
        }
    });
    let results = futures::future::join_all(requests).await;
    assert!(results.iter().all(|(status, _)| *status == StatusCode::OK));

    let (_, body) = call(
        &client,
        reqwest::Method::GET,
        &format!("{base}/progress/course/{course_id}"),
        None,
    )
    .await;
    assert_eq!(
        body["data"]["completedLessons"].as_array().map(Vec::len),
        Some(3)
    );
    assert_eq!(body["data"]["courseCompleted"], true);
}
