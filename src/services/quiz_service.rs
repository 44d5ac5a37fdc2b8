use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::dto::quiz_dto::UpdateQuizPayload;
use crate::error::Result;
use crate::models::question::Question;
use crate::models::quiz::Quiz;
use crate::services::pipeline::GeneratedQuestion;

#[derive(Clone)]
pub struct QuizService {
    pool: SqlitePool,
}

impl QuizService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Persists a quiz and its questions in one transaction. Either the
    /// whole quiz lands in the store or nothing does.
    pub async fn create_with_questions(
        &self,
        owner_id: Uuid,
        title: &str,
        description: &str,
        video_url: &str,
        questions: &[GeneratedQuestion],
    ) -> Result<(Quiz, Vec<Question>)> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let quiz = Quiz {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: description.to_string(),
            video_url: video_url.to_string(),
            owner_id,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO quizzes (id, title, description, video_url, owner_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(quiz.id)
        .bind(&quiz.title)
        .bind(&quiz.description)
        .bind(&quiz.video_url)
        .bind(quiz.owner_id)
        .bind(quiz.created_at)
        .bind(quiz.updated_at)
        .execute(&mut *tx)
        .await?;

        let mut saved = Vec::with_capacity(questions.len());
        for generated in questions {
            let question = Question {
                id: Uuid::new_v4(),
                quiz_id: quiz.id,
                question_title: generated.question_title.clone(),
                question_options: sqlx::types::Json(generated.question_options.clone()),
                answer: generated.answer.clone(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            };
            sqlx::query(
                r#"
                INSERT INTO questions (id, quiz_id, question_title, question_options, answer, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(question.id)
            .bind(question.quiz_id)
            .bind(&question.question_title)
            .bind(&question.question_options)
            .bind(&question.answer)
            .bind(question.created_at)
            .bind(question.updated_at)
            .execute(&mut *tx)
            .await?;
            saved.push(question);
        }

        tx.commit().await?;
        Ok((quiz, saved))
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Quiz> {
        let quiz = sqlx::query_as::<_, Quiz>(
            r#"
            SELECT id, title, description, video_url, owner_id, created_at, updated_at
            FROM quizzes
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(quiz)
    }

    pub async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Quiz>> {
        let quizzes = sqlx::query_as::<_, Quiz>(
            r#"
            SELECT id, title, description, video_url, owner_id, created_at, updated_at
            FROM quizzes
            WHERE owner_id = ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(quizzes)
    }

    pub async fn questions_for_quiz(&self, quiz_id: Uuid) -> Result<Vec<Question>> {
        let questions = sqlx::query_as::<_, Question>(
            r#"
            SELECT id, quiz_id, question_title, question_options, answer, created_at, updated_at
            FROM questions
            WHERE quiz_id = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(questions)
    }

    /// Partial update of the caller-editable fields. The owner column is
    /// never part of the statement.
    pub async fn update_partial(&self, id: Uuid, payload: &UpdateQuizPayload) -> Result<Quiz> {
        let quiz = sqlx::query_as::<_, Quiz>(
            r#"
            UPDATE quizzes
            SET
                title = COALESCE(?, title),
                description = COALESCE(?, description),
                video_url = COALESCE(?, video_url),
                updated_at = ?
            WHERE id = ?
            RETURNING id, title, description, video_url, owner_id, created_at, updated_at
            "#,
        )
        .bind(&payload.title)
        .bind(&payload.description)
        .bind(&payload.video_url)
        .bind(Utc::now())
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(quiz)
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM questions WHERE quiz_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM quizzes WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}
