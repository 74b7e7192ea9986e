use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};

struct Stub {
    status: StatusCode,
    reply: Value,
    hits: AtomicUsize,
}

async fn generate(State(stub): State<Arc<Stub>>) -> (StatusCode, Json<Value>) {
    stub.hits.fetch_add(1, Ordering::SeqCst);
    (stub.status, Json(stub.reply.clone()))
}

async fn spawn_stub(status: StatusCode, reply: Value) -> (String, Arc<Stub>) {
    let stub = Arc::new(Stub {
        status,
        reply,
        hits: AtomicUsize::new(0),
    });
    let app = Router::new()
        .route("/v1beta/models/*rest", post(generate))
        .with_state(Arc::clone(&stub));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    (format!("http://{addr}"), stub)
}

fn drafter_for(base_url: String) -> GeminiDrafter {
    GeminiDrafter::new(GeminiConfig {
        api_key: "test-key".to_string(),
        model: DEFAULT_MODEL.to_string(),
        base_url,
        timeout: Duration::from_secs(5),
    })
    .expect("client")
}

fn candidate_reply(text: &str) -> Value {
    serde_json::json!({
        "candidates": [{ "content": { "parts": [{ "text": text }] } }]
    })
}

#[tokio::test]
async fn missing_drafter_returns_nothing() {
    assert_eq!(MissingDrafter.draft("Intro to Pottery").await, None);
}

#[tokio::test]
async fn blank_key_selects_missing_drafter() {
    let drafter = drafter_from_config(Some(GeminiConfig::new("  ")));
    assert_eq!(drafter.draft("Intro to Pottery").await, None);
}

#[tokio::test]
async fn drafts_from_json_reply() {
    let (base_url, stub) = spawn_stub(
        StatusCode::OK,
        candidate_reply(
            r#"{"description":"Shape clay on the wheel.","prerequisites":"Apron, towel, curiosity"}"#,
        ),
    )
    .await;

    let draft = drafter_for(base_url)
        .draft("Intro to Pottery")
        .await
        .expect("draft");
    assert_eq!(draft.description, "Shape clay on the wheel.");
    assert_eq!(draft.prerequisites, "Apron, towel, curiosity");
    assert_eq!(stub.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn server_error_degrades_to_none() {
    let (base_url, _stub) = spawn_stub(
        StatusCode::INTERNAL_SERVER_ERROR,
        serde_json::json!({ "error": "boom" }),
    )
    .await;
    assert_eq!(drafter_for(base_url).draft("Weaving").await, None);
}

#[tokio::test]
async fn malformed_reply_degrades_to_none() {
    let (base_url, _stub) = spawn_stub(StatusCode::OK, candidate_reply("not json at all")).await;
    assert_eq!(drafter_for(base_url).draft("Weaving").await, None);
}

#[tokio::test]
async fn blank_title_skips_the_request() {
    let (base_url, stub) = spawn_stub(StatusCode::OK, candidate_reply("{}")).await;
    assert_eq!(drafter_for(base_url).draft("   ").await, None);
    assert_eq!(stub.hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unreachable_service_degrades_to_none() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    assert_eq!(
        drafter_for(format!("http://{addr}")).draft("Weaving").await,
        None
    );
}

async fn stalled_generate() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(10)).await;
    Json(candidate_reply(r#"{"description":"late","prerequisites":"none"}"#))
}

#[tokio::test]
async fn slow_service_times_out_to_none() {
    let app = Router::new().route("/v1beta/models/*rest", post(stalled_generate));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });

    let drafter = GeminiDrafter::new(GeminiConfig {
        base_url: format!("http://{addr}"),
        timeout: Duration::from_millis(200),
        ..GeminiConfig::new("test-key")
    })
    .expect("client");

    let started = tokio::time::Instant::now();
    let draft = tokio::time::timeout(Duration::from_secs(5), drafter.draft("Weaving"))
        .await
        .expect("draft returns within the client timeout");
    assert_eq!(draft, None);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn prompt_names_the_workshop() {
    let prompt = course_prompt("Rustic Wood Stool");
    assert!(prompt.contains("\"Rustic Wood Stool\""));
    assert!(prompt.contains("\"prerequisites\""));
}

#[test]
fn parses_fenced_reply_with_list_prerequisites() {
    let draft = parse_draft(
        "```json\n{\"description\":\"Loom basics.\",\"prerequisites\":[\"Scissors\",\"Yarn\"]}\n```",
    )
    .expect("draft");
    assert_eq!(draft.description, "Loom basics.");
    assert_eq!(draft.prerequisites, "Scissors, Yarn");
}

#[test]
fn composed_description_appends_prerequisites() {
    let draft = CourseDraft {
        description: "Loom basics.".to_string(),
        prerequisites: "Scissors".to_string(),
    };
    assert_eq!(
        draft.compose_description(),
        "Loom basics.\n\nPrerequisites: Scissors"
    );
}
