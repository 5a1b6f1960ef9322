use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;

use course_rag::core::config::{AppPaths, EmbeddingProvider, Settings};
use course_rag::core::errors::ApiError;
use course_rag::llm::{
    ContentBlock, LlmProvider, MessageRequest, MessageResponse, StopReason,
};
use course_rag::server::router::router;
use course_rag::state::AppState;

const COURSE: &str = "Course Title: Building Towards Computer Use with Anthropic
Course Link: https://example.com/computer-use
Course Instructor: Colt Steele

Lesson 0: Introduction
Lesson Link: https://example.com/computer-use/0
Welcome to Building Toward Computer Use with Anthropic.

Lesson 1: Overview
Lesson Link: https://example.com/computer-use/1
The model sees screenshots and decides which action to take next.
";

/// Replays queued responses, answering "ok" once the queue is empty.
#[derive(Default)]
struct QueuedProvider {
    responses: Mutex<VecDeque<Result<MessageResponse, ApiError>>>,
    requests: Mutex<Vec<MessageRequest>>,
}

impl QueuedProvider {
    fn push(&self, response: Result<MessageResponse, ApiError>) {
        self.responses.lock().unwrap().push_back(response);
    }
}

fn text(answer: &str) -> MessageResponse {
    MessageResponse {
        id: "msg".into(),
        content: vec![ContentBlock::Text {
            text: answer.into(),
        }],
        stop_reason: Some(StopReason::EndTurn),
        usage: Default::default(),
    }
}

#[async_trait]
impl LlmProvider for QueuedProvider {
    fn name(&self) -> &str {
        "queued"
    }

    async fn create_message(&self, request: MessageRequest) -> Result<MessageResponse, ApiError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(text("ok")))
    }
}

struct TestServer {
    _dir: TempDir,
    base: String,
    client: reqwest::Client,
    provider: Arc<QueuedProvider>,
}

async fn spawn_server() -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let docs = dir.path().join("docs");
    std::fs::create_dir_all(&docs).unwrap();
    std::fs::write(docs.join("course1_script.txt"), COURSE).unwrap();

    let paths = Arc::new(AppPaths::with_dirs(
        dir.path().to_path_buf(),
        dir.path().join("data"),
    ));
    let mut settings = Settings::default();
    settings.embedding.provider = EmbeddingProvider::Hashing;
    settings.embedding.dimension = 1024;

    let provider = Arc::new(QueuedProvider::default());
    let state = AppState::initialize_with_provider(paths, settings, provider.clone())
        .await
        .unwrap();
    state.rag.add_course_folder(&docs, false).await.unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        _dir: dir,
        base: format!("http://{}", addr),
        client: reqwest::Client::new(),
        provider,
    }
}

#[tokio::test]
async fn root_describes_the_api() {
    let server = spawn_server().await;

    let body: Value = server
        .client
        .get(format!("{}/", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body, json!({ "message": "Course Materials RAG System API" }));
}

#[tokio::test]
async fn query_without_session_creates_one() {
    let server = spawn_server().await;
    server.provider.push(Ok(text("Computer use lets the model act.")));

    let res = server
        .client
        .post(format!("{}/api/query", server.base))
        .json(&json!({ "query": "What is computer use?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();

    assert_eq!(body["answer"], "Computer use lets the model act.");
    assert_eq!(body["sources"], json!([]));
    assert!(body["session_id"].as_str().unwrap().starts_with("session_"));
}

#[tokio::test]
async fn session_id_is_echoed_and_history_is_used() {
    let server = spawn_server().await;

    let first: Value = server
        .client
        .post(format!("{}/api/query", server.base))
        .json(&json!({ "query": "first question" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let session_id = first["session_id"].as_str().unwrap().to_string();

    let second: Value = server
        .client
        .post(format!("{}/api/query", server.base))
        .json(&json!({ "query": "second question", "session_id": session_id }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(second["session_id"], session_id.as_str());
    let requests = server.provider.requests.lock().unwrap();
    let system = requests[1].system.clone().unwrap();
    assert!(system.ends_with("Previous conversation:\nUser: first question\nAssistant: ok"));
}

#[tokio::test]
async fn search_sources_are_returned_with_links() {
    let server = spawn_server().await;
    server.provider.push(Ok(MessageResponse {
        id: "msg".into(),
        content: vec![ContentBlock::ToolUse {
            id: "tu_1".into(),
            name: "search_course_content".into(),
            input: json!({ "query": "screenshots action", "lesson_number": 1 }),
        }],
        stop_reason: Some(StopReason::ToolUse),
        usage: Default::default(),
    }));
    server.provider.push(Ok(text("It reads screenshots.")));

    let body: Value = server
        .client
        .post(format!("{}/api/query", server.base))
        .json(&json!({ "query": "How does it see the screen?" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["answer"], "It reads screenshots.");
    assert_eq!(
        body["sources"],
        json!([{
            "text": "Building Towards Computer Use with Anthropic - Lesson 1",
            "link": "https://example.com/computer-use/1"
        }])
    );
}

#[tokio::test]
async fn upstream_failure_returns_fallback_answer() {
    let server = spawn_server().await;
    server
        .provider
        .push(Err(ApiError::Upstream("overloaded".into())));

    let res = server
        .client
        .post(format!("{}/api/query", server.base))
        .json(&json!({ "query": "anything" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();

    assert_eq!(
        body["answer"],
        "I encountered an error while processing your request."
    );
}

#[tokio::test]
async fn missing_query_is_rejected() {
    let server = spawn_server().await;

    let res = server
        .client
        .post(format!("{}/api/query", server.base))
        .json(&json!({ "session_id": "abc" }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 422);
}

#[tokio::test]
async fn courses_endpoint_reports_catalog() {
    let server = spawn_server().await;

    let body: Value = server
        .client
        .get(format!("{}/api/courses", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(
        body,
        json!({
            "total_courses": 1,
            "course_titles": ["Building Towards Computer Use with Anthropic"]
        })
    );
}

#[tokio::test]
async fn deleting_a_session_forgets_history() {
    let server = spawn_server().await;
    let first: Value = server
        .client
        .post(format!("{}/api/query", server.base))
        .json(&json!({ "query": "remember me" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let session_id = first["session_id"].as_str().unwrap().to_string();

    let deleted: Value = server
        .client
        .delete(format!("{}/api/sessions/{}", server.base, session_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(deleted, json!({ "success": true }));

    server
        .client
        .post(format!("{}/api/query", server.base))
        .json(&json!({ "query": "again", "session_id": session_id }))
        .send()
        .await
        .unwrap();

    let requests = server.provider.requests.lock().unwrap();
    assert!(!requests[1]
        .system
        .as_deref()
        .unwrap()
        .contains("Previous conversation"));
}
