use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use quizboard_back::{
    config::AppConfig,
    content::QuizCatalog,
    dao::quiz_store::MemoryQuizStore,
    delivery::LogDelivery,
    routes,
    state::{AppState, SharedState},
};

const BANK: &str = r#"{
  "quiz_batches": [
    {
      "batch_id": "rust-basics",
      "title": "Rust basics",
      "questions": [
        {
          "id": 1,
          "question": "Which keyword declares an immutable binding?",
          "options": ["var", "let", "const", "mut"],
          "correct_answer": 1,
          "explanation": "`let` binds immutably unless `mut` is added."
        },
        {
          "id": 2,
          "question": "What does `?` do on an Err?",
          "options": ["Panics", "Returns it early"],
          "correct_answer": 1
        }
      ]
    }
  ]
}"#;

async fn app() -> (Router, SharedState) {
    let config = AppConfig::with_destinations(vec!["chat-1".into()]).unwrap();
    let catalog = QuizCatalog::from_json(BANK).unwrap();
    let state = AppState::new(config, catalog, Arc::new(LogDelivery), Some("admin".into()));
    state.install_store(Arc::new(MemoryQuizStore::new())).await;
    (routes::router(state.clone()), state)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn answer(user_id: i64, question_id: u32, chosen_index: usize) -> Value {
    json!({
        "user_id": user_id,
        "display_name": "Ada",
        "question_id": question_id,
        "chosen_index": chosen_index,
    })
}

#[tokio::test]
async fn healthcheck_reports_ok_and_the_bank_size() {
    let (app, _) = app().await;

    let (status, body) = send(&app, get("/healthcheck")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["questions"], 2);

    let (status, _) = send(&app, get("/readyz")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn correct_answer_is_scored_and_ranked() {
    let (app, _) = app().await;

    let (status, body) = send(&app, post_json("/answers", answer(7, 1, 1))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_correct"], true);
    assert_eq!(body["points_delta"], 3);
    assert_eq!(body["total_score"], 3);
    assert_eq!(body["correct_option"], "B");

    let (status, body) = send(&app, get("/leaderboard/weekly?n=5")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["window"], "weekly");
    assert_eq!(body["standings"][0]["rank"], 1);
    assert_eq!(body["standings"][0]["user_id"], 7);
    assert_eq!(body["standings"][0]["score"], 3);
}

#[tokio::test]
async fn repeat_answer_is_a_conflict_with_retry_hint() {
    let (app, _) = app().await;
    send(&app, post_json("/answers", answer(7, 1, 1))).await;

    let (status, body) = send(&app, post_json("/answers", answer(7, 1, 0))).await;

    assert_eq!(status, StatusCode::CONFLICT);
    let retry = body["retry_after_secs"].as_i64().unwrap();
    assert!(retry > 86_000 && retry <= 86_400);
}

#[tokio::test]
async fn invalid_answers_are_rejected() {
    let (app, _) = app().await;

    let (status, _) = send(&app, post_json("/answers", answer(7, 99, 0))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, post_json("/answers", answer(7, 2, 2))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("out of range"));

    let (status, _) = send(&app, post_json("/answers", answer(0, 1, 0))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn leaderboard_query_is_validated() {
    let (app, _) = app().await;

    let (status, _) = send(&app, get("/leaderboard/weekly?n=0")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, get("/leaderboard/weekly?n=51")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, get("/leaderboard/yearly")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn degraded_mode_answers_service_unavailable() {
    let (app, state) = app().await;
    state.clear_store().await;

    let (status, body) = send(&app, post_json("/answers", answer(7, 1, 1))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["message"].as_str().unwrap().contains("try again"));

    let (status, body) = send(&app, get("/healthcheck")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");

    let (status, _) = send(&app, get("/readyz")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn admin_jobs_require_the_token() {
    let (app, _) = app().await;

    let request = Request::post("/admin/jobs/quiz_tick")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::post("/admin/jobs/quiz_tick")
        .header("x-admin-token", "wrong")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_can_tick_close_the_week_and_read_history() {
    let (app, _) = app().await;
    send(&app, post_json("/answers", answer(7, 1, 1))).await;

    let request = Request::post("/admin/jobs/quiz_tick")
        .header("x-admin-token", "admin")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["tick"]["batch_id"], "rust-basics");
    assert_eq!(body["tick"]["delivered"], 1);

    let request = Request::post("/admin/jobs/weekly_ceremony")
        .header("x-admin-token", "admin")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ceremony"]["already_closed"], false);
    assert_eq!(body["ceremony"]["winners"][0]["user_id"], 7);
    let period_start = body["ceremony"]["period_start"].as_str().unwrap().to_owned();

    let (status, body) = send(&app, get("/leaderboard/weekly")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["standings"][0]["score"], 0);

    let uri = format!("/leaderboard/weekly/history?period_start={period_start}");
    let (status, body) = send(&app, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["standings"][0]["score"], 3);

    let request = Request::post("/admin/jobs/nightly")
        .header("x-admin-token", "admin")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn history_needs_a_valid_closed_period() {
    let (app, _) = app().await;

    let (status, _) = send(&app, get("/leaderboard/weekly/history?period_start=07-07-2025")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, get("/leaderboard/weekly/history?period_start=2020-01-06")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn user_stats_cover_every_window() {
    let (app, _) = app().await;

    let (status, _) = send(&app, get("/users/7/stats")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    send(&app, post_json("/answers", answer(7, 1, 1))).await;
    send(&app, post_json("/answers", answer(7, 2, 0))).await;

    let (status, body) = send(&app, get("/users/7/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_score"], 2);
    assert_eq!(body["accuracy"], 50.0);
    let windows: Vec<_> = body["current"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["window"].as_str().unwrap().to_owned())
        .collect();
    assert_eq!(windows, vec!["daily", "weekly", "monthly"]);
}

#[tokio::test]
async fn openapi_document_is_served() {
    let (app, _) = app().await;

    let (status, body) = send(&app, get("/api-doc/openapi.json")).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/answers"].is_object());
}
