use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Extension,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::quiz_dto::{CreateQuizPayload, DummyQuizResponse, QuizResponse, UpdateQuizPayload},
    error::{Error, Result},
    models::quiz::Quiz,
    services::pipeline::PipelineOutcome,
    utils::token::Claims,
    AppState,
};

pub const YOUTUBE_WATCH_PREFIX: &str = "https://www.youtube.com/watch?v=";

#[utoipa::path(
    post,
    path = "/createQuiz/",
    request_body = CreateQuizPayload,
    responses(
        (status = 201, description = "Quiz created (real or placeholder)"),
        (status = 400, description = "Invalid YouTube URL"),
        (status = 401, description = "Not authenticated")
    )
)]
#[axum::debug_handler]
pub async fn create_quiz(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateQuizPayload>,
) -> Result<Response> {
    let owner_id = owner_from_claims(&claims)?;
    let url = payload.url.unwrap_or_default();
    if !url.starts_with(YOUTUBE_WATCH_PREFIX) {
        return Err(Error::BadRequest("Invalid YouTube URL.".to_string()));
    }

    let (questions, outcome) = state.pipeline.run(&url).await;
    match outcome {
        PipelineOutcome::Success => {
            let (quiz, saved) = state
                .quiz_service
                .create_with_questions(
                    owner_id,
                    &format!("Quiz for {}", url),
                    "Automatically generated from a YouTube video.",
                    &url,
                    &questions,
                )
                .await?;
            Ok((StatusCode::CREATED, Json(QuizResponse::assemble(quiz, saved))).into_response())
        }
        PipelineOutcome::Degraded { stage, message } => {
            tracing::warn!(stage = %stage, detail = %message, "pipeline degraded, persisting placeholder quiz");
            let placeholders = state.pipeline.placeholder_questions().await;
            let (quiz, saved) = state
                .quiz_service
                .create_with_questions(
                    owner_id,
                    &format!("Example quiz for {}", url),
                    &message,
                    &url,
                    &placeholders,
                )
                .await?;
            let body = DummyQuizResponse {
                detail: message,
                dummy_quiz: QuizResponse::assemble(quiz, saved),
            };
            Ok((StatusCode::CREATED, Json(body)).into_response())
        }
    }
}

#[utoipa::path(
    get,
    path = "/quizzes/",
    responses(
        (status = 200, description = "Caller's quizzes, newest first"),
        (status = 401, description = "Not authenticated")
    )
)]
#[axum::debug_handler]
pub async fn list_quizzes(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let owner_id = owner_from_claims(&claims)?;
    let quizzes = state.quiz_service.list_by_owner(owner_id).await?;

    let mut body = Vec::with_capacity(quizzes.len());
    for quiz in quizzes {
        let questions = state.quiz_service.questions_for_quiz(quiz.id).await?;
        body.push(QuizResponse::assemble(quiz, questions));
    }
    Ok(Json(body))
}

#[utoipa::path(
    get,
    path = "/quizzes/{id}/",
    params(("id" = Uuid, Path, description = "Quiz ID")),
    responses(
        (status = 200, description = "Quiz found"),
        (status = 403, description = "Quiz belongs to another user"),
        (status = 404, description = "Quiz not found")
    )
)]
#[axum::debug_handler]
pub async fn get_quiz(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let owner_id = owner_from_claims(&claims)?;
    let quiz = load_owned_quiz(&state, id, owner_id).await?;
    let questions = state.quiz_service.questions_for_quiz(quiz.id).await?;
    Ok(Json(QuizResponse::assemble(quiz, questions)))
}

#[utoipa::path(
    patch,
    path = "/quizzes/{id}/",
    params(("id" = Uuid, Path, description = "Quiz ID")),
    request_body = UpdateQuizPayload,
    responses(
        (status = 200, description = "Quiz updated"),
        (status = 403, description = "Quiz belongs to another user"),
        (status = 404, description = "Quiz not found")
    )
)]
#[axum::debug_handler]
pub async fn update_quiz(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateQuizPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let owner_id = owner_from_claims(&claims)?;
    load_owned_quiz(&state, id, owner_id).await?;

    let quiz = state.quiz_service.update_partial(id, &payload).await?;
    let questions = state.quiz_service.questions_for_quiz(quiz.id).await?;
    Ok(Json(QuizResponse::assemble(quiz, questions)))
}

#[utoipa::path(
    delete,
    path = "/quizzes/{id}/",
    params(("id" = Uuid, Path, description = "Quiz ID")),
    responses(
        (status = 204, description = "Quiz deleted"),
        (status = 403, description = "Quiz belongs to another user"),
        (status = 404, description = "Quiz not found")
    )
)]
#[axum::debug_handler]
pub async fn delete_quiz(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let owner_id = owner_from_claims(&claims)?;
    load_owned_quiz(&state, id, owner_id).await?;
    state.quiz_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn owner_from_claims(claims: &Claims) -> Result<Uuid> {
    Uuid::parse_str(&claims.sub)
        .map_err(|_| Error::Unauthorized("Invalid token subject.".to_string()))
}

async fn load_owned_quiz(state: &AppState, id: Uuid, owner_id: Uuid) -> Result<Quiz> {
    let quiz = state.quiz_service.get_by_id(id).await.map_err(|e| match e {
        Error::NotFound(_) => Error::NotFound("Quiz not found.".to_string()),
        other => other,
    })?;
    if quiz.owner_id != owner_id {
        return Err(Error::Forbidden(
            "Access denied. Quiz does not belong to user.".to_string(),
        ));
    }
    Ok(quiz)
}
