//! Integration tests for the HTTP API, driven through the axum router with
//! SQLite fixture databases, the hashing embedder and stub model/sink.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tower::ServiceExt;

use support_rag::core::config::{AppPaths, Settings};
use support_rag::corpus::SqlCorpusExtractor;
use support_rag::embedding::HashingEmbedder;
use support_rag::llm::{CompletionRequest, GenerationError, LlmProvider};
use support_rag::recorder::{
    Feedback, Interaction, InteractionSink, RecorderError, SqlInteractionSink,
};
use support_rag::server::router::router;
use support_rag::state::{AppState, Components};

/// Answers with the evidence block of the prompt, so responses show what
/// was retrieved.
struct EvidenceEchoProvider {
    delay: Duration,
}

#[async_trait]
impl LlmProvider for EvidenceEchoProvider {
    fn name(&self) -> &str {
        "evidence-echo"
    }

    async fn health_check(&self) -> bool {
        true
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, GenerationError> {
        tokio::time::sleep(self.delay).await;
        let evidence = request
            .prompt
            .split("Information:\n")
            .nth(1)
            .and_then(|rest| rest.split("\n<|user|>").next())
            .unwrap_or_default()
            .to_string();
        Ok(format!("  Based on: {}  ", evidence))
    }
}

struct FailingSink;

#[async_trait]
impl InteractionSink for FailingSink {
    async fn write_interaction(&self, _interaction: &Interaction) -> Result<(), RecorderError> {
        Err(RecorderError::Unavailable("database is locked".to_string()))
    }

    async fn write_feedback(&self, _feedback: &Feedback) -> Result<(), RecorderError> {
        Err(RecorderError::Unavailable("database is locked".to_string()))
    }
}

#[derive(Default)]
struct MemorySink {
    interactions: Mutex<Vec<Interaction>>,
}

#[async_trait]
impl InteractionSink for MemorySink {
    async fn write_interaction(&self, interaction: &Interaction) -> Result<(), RecorderError> {
        self.interactions.lock().unwrap().push(interaction.clone());
        Ok(())
    }

    async fn write_feedback(&self, _feedback: &Feedback) -> Result<(), RecorderError> {
        Ok(())
    }
}

async fn execute(path: &Path, statements: &[&str]) {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();
    for statement in statements {
        sqlx::query(statement).execute(&pool).await.unwrap();
    }
    pool.close().await;
}

fn sqlite_url(path: &Path) -> String {
    format!("sqlite://{}", path.to_string_lossy())
}

struct TestApp {
    _tmp: tempfile::TempDir,
    faq_db: std::path::PathBuf,
    ticketing_db: std::path::PathBuf,
    state: Arc<AppState>,
}

impl TestApp {
    async fn start(sink: Option<Arc<dyn InteractionSink>>, delay: Duration) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let faq_db = tmp.path().join("ecommerce_faq.db");
        let ticketing_db = tmp.path().join("ecommerce_ticketing.db");

        execute(
            &faq_db,
            &[
                "CREATE TABLE faq_table (id INTEGER PRIMARY KEY, question TEXT, answer TEXT)",
                "INSERT INTO faq_table (question, answer) VALUES ('How do I reset my password?', 'Click \"Forgot password\" on the login page and follow the emailed link.')",
                "INSERT INTO faq_table (question, answer) VALUES ('What is your return policy?', 'Items can be returned within 30 days of delivery.')",
                "INSERT INTO faq_table (question, answer) VALUES ('Do you ship internationally?', 'We ship to over 40 countries.')",
            ],
        )
        .await;
        execute(
            &ticketing_db,
            &[
                "CREATE TABLE tickets (ticket_id INTEGER PRIMARY KEY, customer_query TEXT, resolution TEXT, status TEXT)",
                "INSERT INTO tickets VALUES (101, 'Password reset email never arrived', 'Whitelisted our sender domain and resent the email', 'resolved')",
                "INSERT INTO tickets VALUES (102, 'Package arrived damaged', 'Shipped a replacement', 'resolved')",
                "INSERT INTO tickets VALUES (103, 'Charged twice', NULL, 'open')",
            ],
        )
        .await;

        let paths = Arc::new(AppPaths::with_data_dir(
            tmp.path().to_path_buf(),
            tmp.path().join("data"),
        ));
        let mut settings = Settings::default();
        settings.database.faq_url = Some(sqlite_url(&faq_db));
        settings.database.ticketing_url = Some(sqlite_url(&ticketing_db));
        settings.generation.timeout_secs = 1;

        let sink: Arc<dyn InteractionSink> = match sink {
            Some(sink) => sink,
            None => Arc::new(SqlInteractionSink::connect_lazy(&sqlite_url(&ticketing_db)).unwrap()),
        };
        let components = Components {
            extractor: Arc::new(SqlCorpusExtractor::new(
                sqlite_url(&faq_db),
                sqlite_url(&ticketing_db),
            )),
            embedder: Arc::new(HashingEmbedder::new(256)),
            provider: Arc::new(EvidenceEchoProvider { delay }),
            sink,
        };

        let state = AppState::with_components(paths, settings, components)
            .await
            .unwrap();

        Self {
            _tmp: tmp,
            faq_db,
            ticketing_db,
            state,
        }
    }

    async fn start_default() -> Self {
        Self::start(None, Duration::ZERO).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let app = router(self.state.clone());
        let resp = ServiceExt::<Request<Body>>::oneshot(app, request)
            .await
            .unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 1_000_000)
            .await
            .unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
        )
        .await
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }
}

async fn count_rows(db: &Path, table: &str) -> i64 {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(SqliteConnectOptions::new().filename(db))
        .await
        .unwrap();
    let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(&pool)
        .await
        .unwrap();
    pool.close().await;
    count
}

#[tokio::test]
async fn chat_answers_with_default_session() {
    let app = TestApp::start_default().await;

    let (status, body) = app
        .post("/api/chat", json!({ "message": "How do I reset my password?" }))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session_id"], "default");
    let response = body["response"].as_str().unwrap();
    assert!(!response.is_empty());
    assert!(response.starts_with("Based on: Question: How do I reset my password?"));
    assert!(response.contains("Ticket: 101"));
    assert!(!response.ends_with(' '));
    assert!(body.get("warnings").is_none());
}

#[tokio::test]
async fn chat_keeps_given_session_and_records_interaction() {
    let app = TestApp::start_default().await;

    let (status, body) = app
        .post(
            "/api/chat",
            json!({ "message": "Do you ship internationally?", "session_id": "s-42" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session_id"], "s-42");

    app.state.recorder.shutdown().await;
    assert_eq!(app.state.recorder.stats().written, 1);
    assert_eq!(count_rows(&app.ticketing_db, "conversation_history").await, 1);
}

#[tokio::test]
async fn chat_without_message_is_rejected() {
    let app = TestApp::start_default().await;

    let (status, body) = app.post("/api/chat", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "No message provided" }));

    let (status, body) = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/chat")
                .header("content-type", "application/json")
                .body(Body::from("{\"message\": "))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn feedback_requires_all_fields() {
    let app = TestApp::start_default().await;

    let (status, body) = app
        .post(
            "/api/feedback",
            json!({ "session_id": "s1", "message_id": "m1" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Missing required fields" }));

    let (status, body) = app
        .post(
            "/api/feedback",
            json!({ "session_id": "s1", "message_id": "m1", "rating": 5, "comment": "Helpful" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "success" }));

    app.state.recorder.shutdown().await;
    assert_eq!(count_rows(&app.ticketing_db, "feedback").await, 1);
}

#[tokio::test]
async fn retrain_makes_new_rows_retrievable() {
    let app = TestApp::start_default().await;
    let question = "zebra sentinel 4711";

    let (_, before) = app.post("/api/chat", json!({ "message": question })).await;
    assert!(!before["response"].as_str().unwrap().contains("4711"));

    execute(
        &app.ticketing_db,
        &["INSERT INTO tickets VALUES (4711, 'zebra sentinel 4711', 'Sentinel resolved', 'resolved')"],
    )
    .await;

    let (status, body) = app.post("/api/retrain", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "status": "success", "message": "Knowledge base updated with latest data" })
    );

    let (_, after) = app.post("/api/chat", json!({ "message": question })).await;
    assert!(after["response"]
        .as_str()
        .unwrap()
        .contains("Ticket: 4711\nQuery: zebra sentinel 4711\nResolution: Sentinel resolved"));
}

#[tokio::test]
async fn failed_retrain_names_the_knowledge_base_and_keeps_serving() {
    let app = TestApp::start_default().await;

    execute(&app.faq_db, &["DROP TABLE faq_table"]).await;

    let (status, body) = app.post("/api/retrain", json!({})).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let error = body["error"].as_str().unwrap();
    assert!(error.contains("faq"));
    assert!(!error.contains("tickets"));

    let (status, body) = app
        .post("/api/chat", json!({ "message": "What is your return policy?" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["response"].as_str().unwrap().contains("30 days"));
}

#[tokio::test]
async fn recording_failure_does_not_change_chat_response() {
    let memory = TestApp::start(Some(Arc::new(MemorySink::default())), Duration::ZERO).await;
    let failing = TestApp::start(Some(Arc::new(FailingSink)), Duration::ZERO).await;
    let request = json!({ "message": "What is your return policy?" });

    let expected = memory.post("/api/chat", request.clone()).await;
    let actual = failing.post("/api/chat", request).await;

    assert_eq!(actual, expected);
    failing.state.recorder.shutdown().await;
    assert_eq!(failing.state.recorder.stats().failed, 1);
}

#[tokio::test]
async fn slow_generation_times_out() {
    let app = TestApp::start(None, Duration::from_secs(5)).await;

    let (status, body) = app
        .post("/api/chat", json!({ "message": "How do I reset my password?" }))
        .await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert!(body["error"].as_str().unwrap().contains("timed out"));
    app.state.recorder.shutdown().await;
    assert_eq!(app.state.recorder.stats().enqueued, 0);
}

#[tokio::test]
async fn health_and_status_report_ready_knowledge_bases() {
    let app = TestApp::start_default().await;

    let (status, body) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = app.get("/api/status").await;
    assert_eq!(status, StatusCode::OK);
    let knowledge_bases = body["knowledge_bases"].as_array().unwrap();
    assert_eq!(knowledge_bases.len(), 2);
    assert_eq!(knowledge_bases[0]["name"], "faq");
    assert_eq!(knowledge_bases[0]["state"], "READY");
    assert_eq!(knowledge_bases[0]["document_count"], 3);
    assert_eq!(knowledge_bases[1]["name"], "tickets");
    assert_eq!(knowledge_bases[1]["document_count"], 2);
    assert_eq!(body["recorder"]["dropped"], 0);
    assert_eq!(body["generation"]["provider"], "evidence-echo");
    assert_eq!(body["generation"]["reachable"], true);
    assert_eq!(body["generation"]["timeout_secs"], 1);
}

#[tokio::test]
async fn restart_loads_persisted_indices() {
    let app = TestApp::start_default().await;
    let first = app.state.knowledge.snapshot();

    let paths = app.state.paths.clone();
    let mut settings = Settings::default();
    settings.database.faq_url = Some(sqlite_url(&app.faq_db));
    settings.database.ticketing_url = Some(sqlite_url(&app.ticketing_db));
    let restarted = AppState::with_components(
        paths,
        settings,
        Components {
            extractor: Arc::new(SqlCorpusExtractor::new(
                sqlite_url(&app.faq_db),
                sqlite_url(&app.ticketing_db),
            )),
            embedder: Arc::new(HashingEmbedder::new(256)),
            provider: Arc::new(EvidenceEchoProvider {
                delay: Duration::ZERO,
            }),
            sink: Arc::new(MemorySink::default()),
        },
    )
    .await
    .unwrap();

    let second = restarted.knowledge.snapshot();
    assert_eq!(first[0].generation, second[0].generation);
    assert_eq!(first[1].generation, second[1].generation);
}
