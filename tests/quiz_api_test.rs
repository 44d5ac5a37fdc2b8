use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value as JsonValue};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tower::ServiceExt;
use uuid::Uuid;

use quizzly_backend::services::media::AudioFile;
use quizzly_backend::services::pipeline::{
    AudioSource, QuizPipeline, TextGenerator, Transcriber,
};
use quizzly_backend::utils::token::issue_access_token;
use quizzly_backend::{app, AppState};

struct StubAudio {
    fail: bool,
}

#[async_trait]
impl AudioSource for StubAudio {
    async fn fetch_audio(&self, _url: &str) -> anyhow::Result<AudioFile> {
        if self.fail {
            Err(anyhow::anyhow!("video unavailable"))
        } else {
            Ok(AudioFile::new(PathBuf::from("/tmp/stub.mp3")))
        }
    }
}

struct StubTranscriber {
    fail: bool,
}

#[async_trait]
impl Transcriber for StubTranscriber {
    async fn transcribe(&self, _audio: &AudioFile, _model: &str) -> anyhow::Result<String> {
        if self.fail {
            Err(anyhow::anyhow!("Whisper failed!"))
        } else {
            Ok("stub transcript".to_string())
        }
    }
}

struct StubGenerator {
    output: Option<String>,
}

#[async_trait]
impl TextGenerator for StubGenerator {
    async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
        match &self.output {
            Some(text) => Ok(text.clone()),
            None => Err(anyhow::anyhow!("quota exceeded")),
        }
    }
}

fn stub_pipeline(
    audio_fail: bool,
    transcribe_fail: bool,
    generator_output: Option<&str>,
) -> Arc<QuizPipeline> {
    Arc::new(QuizPipeline::new(
        Arc::new(StubAudio { fail: audio_fail }),
        Arc::new(StubTranscriber {
            fail: transcribe_fail,
        }),
        Arc::new(StubGenerator {
            output: generator_output.map(str::to_string),
        }),
        "base".to_string(),
    ))
}

fn init_test_config() {
    env::set_var("SERVER_ADDRESS", "127.0.0.1:0");
    env::set_var("DATABASE_URL", "sqlite::memory:");
    env::set_var("JWT_SECRET", "test_secret_key");
    env::set_var("GEMINI_API_KEY", "test-key");
    let _ = quizzly_backend::config::init_config();
}

async fn test_pool() -> SqlitePool {
    // single connection so every query sees the same in-memory database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("pool");
    sqlx::migrate!("./migrations").run(&pool).await.expect("migrations");
    pool
}

async fn state_with_pipeline(pipeline: Arc<QuizPipeline>) -> AppState {
    init_test_config();
    let pool = test_pool().await;
    AppState::with_pipeline(pool, pipeline)
}

async fn seed_user(state: &AppState, username: &str) -> (Uuid, String) {
    let user = state
        .user_service
        .register(username, &format!("{}@example.com", username), "quizpass123")
        .await
        .expect("seed user");
    let token = issue_access_token(&user).expect("token");
    (user.id, format!("access_token={}", token))
}

fn post_json(uri: &str, cookie: &str, body: JsonValue) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::COOKIE, cookie)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> JsonValue {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

const WATCH_URL: &str = "https://www.youtube.com/watch?v=example";

const TWO_QUESTIONS: &str = "```json\n[
  {\"question_title\": \"First?\", \"question_options\": [\"a\", \"b\", \"c\", \"d\"], \"answer\": \"a\"},
  {\"question_title\": \"Second?\", \"question_options\": [\"w\", \"x\", \"y\", \"z\"], \"answer\": \"z\"}
]\n```";

#[tokio::test]
async fn create_quiz_success_returns_parsed_questions() {
    let state = state_with_pipeline(stub_pipeline(false, false, Some(TWO_QUESTIONS))).await;
    let (_, cookie) = seed_user(&state, "creator").await;
    let router = app(state);

    let response = router
        .oneshot(post_json("/createQuiz/", &cookie, json!({"url": WATCH_URL})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let quiz = body_json(response).await;
    assert_eq!(quiz["title"], format!("Quiz for {}", WATCH_URL));
    assert_eq!(quiz["video_url"], WATCH_URL);
    assert!(quiz["id"].is_string());
    let questions = quiz["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 2);
    for question in questions {
        assert!(question["id"].is_string());
        assert!(question["question_title"].is_string());
        assert!(question["question_options"].is_array());
        assert!(question["answer"].is_string());
    }
}

#[tokio::test]
async fn create_quiz_transcription_failure_yields_dummy_quiz() {
    let state = state_with_pipeline(stub_pipeline(false, true, None)).await;
    let (_, cookie) = seed_user(&state, "whisperless").await;
    let router = app(state);

    let response = router
        .oneshot(post_json("/createQuiz/", &cookie, json!({"url": WATCH_URL})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.starts_with("Transcription failed:"), "{}", detail);

    let quiz = &body["dummy_quiz"];
    assert_eq!(quiz["title"], format!("Example quiz for {}", WATCH_URL));
    assert_eq!(quiz["description"], detail);
    let questions = quiz["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 10);
}

#[tokio::test]
async fn create_quiz_audio_failure_yields_dummy_quiz() {
    let state = state_with_pipeline(stub_pipeline(true, false, None)).await;
    let (_, cookie) = seed_user(&state, "nodownload").await;
    let router = app(state);

    let response = router
        .oneshot(post_json("/createQuiz/", &cookie, json!({"url": WATCH_URL})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .starts_with("Audio extraction failed:"));
    assert!(body["dummy_quiz"]["title"].is_string());
    assert!(body["dummy_quiz"]["description"].is_string());
}

#[tokio::test]
async fn create_quiz_generation_failure_yields_dummy_quiz() {
    let state = state_with_pipeline(stub_pipeline(false, false, None)).await;
    let (_, cookie) = seed_user(&state, "nogemini").await;
    let router = app(state);

    let response = router
        .oneshot(post_json("/createQuiz/", &cookie, json!({"url": WATCH_URL})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .starts_with("Quiz generation failed:"));
    assert_eq!(body["dummy_quiz"]["questions"].as_array().unwrap().len(), 10);
}

#[tokio::test]
async fn create_quiz_empty_list_is_a_valid_quiz() {
    let state = state_with_pipeline(stub_pipeline(false, false, Some("```json\n[]\n```"))).await;
    let (_, cookie) = seed_user(&state, "emptylist").await;
    let router = app(state);

    let response = router
        .oneshot(post_json("/createQuiz/", &cookie, json!({"url": WATCH_URL})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let quiz = body_json(response).await;
    assert!(quiz.get("detail").is_none());
    assert_eq!(quiz["questions"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn create_quiz_invalid_url_is_rejected_before_the_pipeline() {
    let state = state_with_pipeline(stub_pipeline(false, false, Some(TWO_QUESTIONS))).await;
    let (_, cookie) = seed_user(&state, "badurl").await;
    let pool = state.pool.clone();
    let router = app(state);

    let response = router
        .oneshot(post_json(
            "/createQuiz/",
            &cookie,
            json!({"url": "not_a_youtube_url"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["detail"], "Invalid YouTube URL.");

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM quizzes")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn create_quiz_without_url_field_is_a_bad_request() {
    let state = state_with_pipeline(stub_pipeline(false, false, Some(TWO_QUESTIONS))).await;
    let (_, cookie) = seed_user(&state, "nourl").await;
    let router = app(state);

    let response = router
        .oneshot(post_json("/createQuiz/", &cookie, json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["detail"], "Invalid YouTube URL.");
}

#[tokio::test]
async fn create_quiz_without_cookie_is_unauthorized() {
    let state = state_with_pipeline(stub_pipeline(false, false, Some(TWO_QUESTIONS))).await;
    let router = app(state);

    let request = Request::builder()
        .method("POST")
        .uri("/createQuiz/")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"url": WATCH_URL}).to_string()))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = body_json(response).await;
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn list_quizzes_is_newest_first_and_scoped_to_owner() {
    let state = state_with_pipeline(stub_pipeline(false, false, Some(TWO_QUESTIONS))).await;
    let (owner_id, cookie) = seed_user(&state, "lister").await;
    let (other_id, _) = seed_user(&state, "someone_else").await;

    let (first, _) = state
        .quiz_service
        .create_with_questions(owner_id, "Older", "", WATCH_URL, &[])
        .await
        .unwrap();
    let (second, _) = state
        .quiz_service
        .create_with_questions(owner_id, "Newer", "", WATCH_URL, &[])
        .await
        .unwrap();
    state
        .quiz_service
        .create_with_questions(other_id, "Foreign", "", WATCH_URL, &[])
        .await
        .unwrap();

    let router = app(state);
    let response = router.oneshot(get("/quizzes/", &cookie)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let quizzes = body.as_array().unwrap();
    assert_eq!(quizzes.len(), 2);
    assert_eq!(quizzes[0]["id"], second.id.to_string());
    assert_eq!(quizzes[1]["id"], first.id.to_string());
}

#[tokio::test]
async fn get_quiz_of_another_user_is_forbidden() {
    let state = state_with_pipeline(stub_pipeline(false, false, Some(TWO_QUESTIONS))).await;
    let (owner_id, _) = seed_user(&state, "owner").await;
    let (_, intruder_cookie) = seed_user(&state, "intruder").await;

    let (quiz, _) = state
        .quiz_service
        .create_with_questions(owner_id, "Private", "", WATCH_URL, &[])
        .await
        .unwrap();

    let router = app(state);
    let response = router
        .oneshot(get(&format!("/quizzes/{}/", quiz.id), &intruder_cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let body = body_json(response).await;
    assert_eq!(body["detail"], "Access denied. Quiz does not belong to user.");
}

#[tokio::test]
async fn get_unknown_quiz_is_not_found() {
    let state = state_with_pipeline(stub_pipeline(false, false, Some(TWO_QUESTIONS))).await;
    let (_, cookie) = seed_user(&state, "searcher").await;

    let router = app(state);
    let response = router
        .oneshot(get(&format!("/quizzes/{}/", Uuid::new_v4()), &cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = body_json(response).await;
    assert_eq!(body["detail"], "Quiz not found.");
}

#[tokio::test]
async fn patch_updates_only_the_provided_fields() {
    let state = state_with_pipeline(stub_pipeline(false, false, Some(TWO_QUESTIONS))).await;
    let (owner_id, cookie) = seed_user(&state, "editor").await;

    let (quiz, _) = state
        .quiz_service
        .create_with_questions(owner_id, "Before", "unchanged description", WATCH_URL, &[])
        .await
        .unwrap();

    let router = app(state);
    let request = Request::builder()
        .method("PATCH")
        .uri(format!("/quizzes/{}/", quiz.id))
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::COOKIE, &cookie)
        .body(Body::from(json!({"title": "After"}).to_string()))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["title"], "After");
    assert_eq!(body["description"], "unchanged description");
    assert_eq!(body["video_url"], WATCH_URL);

    let updated_at: chrono::DateTime<chrono::Utc> =
        body["updated_at"].as_str().unwrap().parse().unwrap();
    let created_at: chrono::DateTime<chrono::Utc> =
        body["created_at"].as_str().unwrap().parse().unwrap();
    assert!(updated_at > quiz.updated_at);
    assert_eq!(created_at, quiz.created_at);
}

#[tokio::test]
async fn patch_and_delete_of_another_users_quiz_are_forbidden() {
    let state = state_with_pipeline(stub_pipeline(false, false, Some(TWO_QUESTIONS))).await;
    let (owner_id, _) = seed_user(&state, "holder").await;
    let (_, intruder_cookie) = seed_user(&state, "meddler").await;
    let pool = state.pool.clone();

    let (quiz, _) = state
        .quiz_service
        .create_with_questions(owner_id, "Private", "", WATCH_URL, &[])
        .await
        .unwrap();

    let router = app(state);
    let request = Request::builder()
        .method("PATCH")
        .uri(format!("/quizzes/{}/", quiz.id))
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::COOKIE, &intruder_cookie)
        .body(Body::from(json!({"title": "Hijacked"}).to_string()))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/quizzes/{}/", quiz.id))
        .header(header::COOKIE, &intruder_cookie)
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let title: String = sqlx::query_scalar("SELECT title FROM quizzes WHERE id = ?")
        .bind(quiz.id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(title, "Private");
}

#[tokio::test]
async fn delete_removes_the_quiz_and_its_questions() {
    let state = state_with_pipeline(stub_pipeline(false, false, Some(TWO_QUESTIONS))).await;
    let (_, cookie) = seed_user(&state, "deleter").await;
    let pool = state.pool.clone();
    let router = app(state.clone());

    let response = router
        .clone()
        .oneshot(post_json("/createQuiz/", &cookie, json!({"url": WATCH_URL})))
        .await
        .unwrap();
    let quiz = body_json(response).await;
    let quiz_id = quiz["id"].as_str().unwrap().to_string();

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/quizzes/{}/", quiz_id))
        .header(header::COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = router
        .oneshot(get(&format!("/quizzes/{}/", quiz_id), &cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM questions")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn quiz_with_deleted_questions_serializes_to_empty_list() {
    let state = state_with_pipeline(stub_pipeline(false, false, Some(TWO_QUESTIONS))).await;
    let (_, cookie) = seed_user(&state, "pruner").await;
    let pool = state.pool.clone();
    let router = app(state);

    let response = router
        .clone()
        .oneshot(post_json("/createQuiz/", &cookie, json!({"url": WATCH_URL})))
        .await
        .unwrap();
    let quiz = body_json(response).await;
    let quiz_id = quiz["id"].as_str().unwrap().to_string();
    assert_eq!(quiz["questions"].as_array().unwrap().len(), 2);

    sqlx::query("DELETE FROM questions WHERE quiz_id = ?")
        .bind(Uuid::parse_str(&quiz_id).unwrap())
        .execute(&pool)
        .await
        .unwrap();

    let response = router
        .oneshot(get(&format!("/quizzes/{}/", quiz_id), &cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["questions"], json!([]));
}
