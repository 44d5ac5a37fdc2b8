use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::question::Question;
use crate::models::quiz::Quiz;

/// `url` is optional at the deserialization level so an absent field is
/// answered with the same 400 as a non-YouTube value, not a generic 422.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateQuizPayload {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateQuizPayload {
    #[validate(length(min = 1))]
    pub title: Option<String>,
    pub description: Option<String>,
    #[validate(length(min = 1))]
    pub video_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionResponse {
    pub id: Uuid,
    pub question_title: String,
    pub question_options: Vec<String>,
    pub answer: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Question> for QuestionResponse {
    fn from(question: Question) -> Self {
        Self {
            id: question.id,
            question_title: question.question_title,
            question_options: question.question_options.0,
            answer: question.answer,
            created_at: question.created_at,
            updated_at: question.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizResponse {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub video_url: String,
    pub questions: Vec<QuestionResponse>,
}

impl QuizResponse {
    pub fn assemble(quiz: Quiz, questions: Vec<Question>) -> Self {
        Self {
            id: quiz.id,
            title: quiz.title,
            description: quiz.description,
            created_at: quiz.created_at,
            updated_at: quiz.updated_at,
            video_url: quiz.video_url,
            questions: questions.into_iter().map(Into::into).collect(),
        }
    }
}

/// Degrade-path body: the stage error plus the persisted placeholder quiz.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DummyQuizResponse {
    pub detail: String,
    pub dummy_quiz: QuizResponse,
}
