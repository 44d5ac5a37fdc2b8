pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use reqwest::Client;
use sqlx::SqlitePool;

use crate::services::{
    gemini::GeminiService,
    media::{WhisperTranscriber, YtDlpAudioSource},
    pipeline::QuizPipeline,
    quiz_service::QuizService,
    user_service::UserService,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub user_service: UserService,
    pub quiz_service: QuizService,
    pub pipeline: Arc<QuizPipeline>,
}

impl AppState {
    pub fn new(pool: SqlitePool) -> Self {
        let config = crate::config::get_config();
        let http_client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .unwrap();

        let generator = GeminiService::new(
            config.gemini_api_key.clone(),
            config.gemini_model.clone(),
            http_client,
        );
        let pipeline = Arc::new(QuizPipeline::new(
            Arc::new(YtDlpAudioSource),
            Arc::new(WhisperTranscriber),
            Arc::new(generator),
            config.whisper_model.clone(),
        ));

        Self::with_pipeline(pool, pipeline)
    }

    /// Same state with the pipeline stages swapped out; tests inject stub
    /// stages through this.
    pub fn with_pipeline(pool: SqlitePool, pipeline: Arc<QuizPipeline>) -> Self {
        let user_service = UserService::new(pool.clone());
        let quiz_service = QuizService::new(pool.clone());
        Self {
            pool,
            user_service,
            quiz_service,
            pipeline,
        }
    }
}

pub fn app(state: AppState) -> Router {
    let auth_api = Router::new()
        .route("/register/", post(routes::auth::register))
        .route("/login/", post(routes::auth::login))
        .route("/token/refresh/", post(routes::auth::refresh))
        .route("/logout/", post(routes::auth::logout));

    let quiz_api = Router::new()
        .route("/createQuiz/", post(routes::quiz::create_quiz))
        .route("/quizzes/", get(routes::quiz::list_quizzes))
        .route(
            "/quizzes/:id/",
            get(routes::quiz::get_quiz)
                .patch(routes::quiz::update_quiz)
                .delete(routes::quiz::delete_quiz),
        )
        .layer(axum::middleware::from_fn(
            middleware::auth::require_cookie_auth,
        ));

    Router::new()
        .route("/health", get(routes::health::health))
        .merge(auth_api)
        .merge(quiz_api)
        .with_state(state)
}
