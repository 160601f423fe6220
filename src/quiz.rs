//! Questionnaires: quiz types, their ordered questions, and submitted answers.
//!
//! Answers are keyed by question text and are not checked against the
//! current question set.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{
    auth::new_id,
    error::{ApiError, ApiResult},
    models::{QuizQuestionRow, QuizResponseRow, QuizTypeRow},
};

const SELECT_TYPE: &str =
    "SELECT id, name, description, icon, order_index, is_active, created_at FROM quiz_types";
const SELECT_QUESTION: &str =
    "SELECT id, quiz_type_id, question, order_index, is_active, created_at FROM quiz_questions";
const SELECT_RESPONSE: &str =
    "SELECT id, quiz_type_id, user_name, user_email, user_phone, answers, created_at FROM quiz_responses";

fn active_by_default() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuizTypeInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
    pub order_index: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuestionInput {
    pub question: String,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
    pub order_index: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseInput {
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub user_phone: Option<String>,
    pub answers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuizResponse {
    pub id: String,
    pub quiz_type_id: String,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
    pub user_phone: Option<String>,
    pub answers: BTreeMap<String, String>,
    pub created_at: String,
}

impl From<QuizResponseRow> for QuizResponse {
    fn from(row: QuizResponseRow) -> Self {
        let answers = serde_json::from_str(&row.answers).unwrap_or_else(|err| {
            log::warn!("Quiz response {} has unreadable answers: {err}", row.id);
            BTreeMap::new()
        });
        Self {
            id: row.id,
            quiz_type_id: row.quiz_type_id,
            user_name: row.user_name,
            user_email: row.user_email,
            user_phone: row.user_phone,
            answers,
            created_at: row.created_at,
        }
    }
}

pub async fn list_types(pool: &SqlitePool, only_active: bool) -> Result<Vec<QuizTypeRow>, sqlx::Error> {
    let filter = if only_active { "WHERE is_active = 1 " } else { "" };
    sqlx::query_as::<_, QuizTypeRow>(&format!("{SELECT_TYPE} {filter}ORDER BY order_index ASC"))
        .fetch_all(pool)
        .await
}

pub async fn find_type(pool: &SqlitePool, id: &str) -> Result<Option<QuizTypeRow>, sqlx::Error> {
    sqlx::query_as::<_, QuizTypeRow>(&format!("{SELECT_TYPE} WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn create_type(pool: &SqlitePool, input: &QuizTypeInput) -> ApiResult<QuizTypeRow> {
    if input.name.trim().is_empty() {
        return Err(ApiError::validation("name is required"));
    }
    let order_index = match input.order_index {
        Some(order_index) => order_index,
        None => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM quiz_types")
                .fetch_one(pool)
                .await?
        }
    };
    let row = QuizTypeRow {
        id: new_id(),
        name: input.name.trim().to_string(),
        description: input.description.trim().to_string(),
        icon: input.icon.clone(),
        order_index,
        is_active: input.is_active,
        created_at: Utc::now().to_rfc3339(),
    };
    sqlx::query(
        r#"INSERT INTO quiz_types (id, name, description, icon, order_index, is_active, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&row.id)
    .bind(&row.name)
    .bind(&row.description)
    .bind(&row.icon)
    .bind(row.order_index)
    .bind(row.is_active)
    .bind(&row.created_at)
    .execute(pool)
    .await?;
    Ok(row)
}

pub async fn update_type(
    pool: &SqlitePool,
    id: &str,
    input: &QuizTypeInput,
) -> ApiResult<Option<QuizTypeRow>> {
    if input.name.trim().is_empty() {
        return Err(ApiError::validation("name is required"));
    }
    let Some(existing) = find_type(pool, id).await? else {
        return Ok(None);
    };
    sqlx::query(
        "UPDATE quiz_types SET name = ?, description = ?, icon = ?, is_active = ?, order_index = ? WHERE id = ?",
    )
    .bind(input.name.trim())
    .bind(input.description.trim())
    .bind(&input.icon)
    .bind(input.is_active)
    .bind(input.order_index.unwrap_or(existing.order_index))
    .bind(id)
    .execute(pool)
    .await?;
    Ok(find_type(pool, id).await?)
}

pub async fn delete_type(pool: &SqlitePool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM quiz_types WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn list_questions(
    pool: &SqlitePool,
    quiz_type_id: &str,
    only_active: bool,
) -> Result<Vec<QuizQuestionRow>, sqlx::Error> {
    let filter = if only_active { "AND is_active = 1 " } else { "" };
    sqlx::query_as::<_, QuizQuestionRow>(&format!(
        "{SELECT_QUESTION} WHERE quiz_type_id = ? {filter}ORDER BY order_index ASC"
    ))
    .bind(quiz_type_id)
    .fetch_all(pool)
    .await
}

pub async fn find_question(pool: &SqlitePool, id: &str) -> Result<Option<QuizQuestionRow>, sqlx::Error> {
    sqlx::query_as::<_, QuizQuestionRow>(&format!("{SELECT_QUESTION} WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn create_question(
    pool: &SqlitePool,
    quiz_type_id: &str,
    input: &QuestionInput,
) -> ApiResult<QuizQuestionRow> {
    if input.question.trim().is_empty() {
        return Err(ApiError::validation("question is required"));
    }
    if find_type(pool, quiz_type_id).await?.is_none() {
        return Err(ApiError::NotFound("quiz type"));
    }
    let order_index = match input.order_index {
        Some(order_index) => order_index,
        None => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM quiz_questions WHERE quiz_type_id = ?")
                .bind(quiz_type_id)
                .fetch_one(pool)
                .await?
        }
    };
    let row = QuizQuestionRow {
        id: new_id(),
        quiz_type_id: quiz_type_id.to_string(),
        question: input.question.trim().to_string(),
        order_index,
        is_active: input.is_active,
        created_at: Utc::now().to_rfc3339(),
    };
    sqlx::query(
        r#"INSERT INTO quiz_questions (id, quiz_type_id, question, order_index, is_active, created_at)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&row.id)
    .bind(&row.quiz_type_id)
    .bind(&row.question)
    .bind(row.order_index)
    .bind(row.is_active)
    .bind(&row.created_at)
    .execute(pool)
    .await?;
    Ok(row)
}

pub async fn update_question(
    pool: &SqlitePool,
    id: &str,
    input: &QuestionInput,
) -> ApiResult<Option<QuizQuestionRow>> {
    if input.question.trim().is_empty() {
        return Err(ApiError::validation("question is required"));
    }
    let Some(existing) = find_question(pool, id).await? else {
        return Ok(None);
    };
    sqlx::query("UPDATE quiz_questions SET question = ?, is_active = ?, order_index = ? WHERE id = ?")
        .bind(input.question.trim())
        .bind(input.is_active)
        .bind(input.order_index.unwrap_or(existing.order_index))
        .bind(id)
        .execute(pool)
        .await?;
    Ok(find_question(pool, id).await?)
}

pub async fn delete_question(pool: &SqlitePool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM quiz_questions WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Rewrites question positions so they follow `ordered_ids`, inside one
/// transaction. Ids from other quiz types are ignored.
pub async fn reorder_questions(
    pool: &SqlitePool,
    quiz_type_id: &str,
    ordered_ids: &[String],
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for (position, id) in ordered_ids.iter().enumerate() {
        sqlx::query("UPDATE quiz_questions SET order_index = ? WHERE id = ? AND quiz_type_id = ?")
            .bind(position as i64)
            .bind(id)
            .bind(quiz_type_id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await
}

pub async fn submit_response(
    pool: &SqlitePool,
    quiz_type_id: &str,
    input: &ResponseInput,
) -> ApiResult<QuizResponse> {
    if input.answers.is_empty() {
        return Err(ApiError::validation("answers are required"));
    }
    match find_type(pool, quiz_type_id).await? {
        Some(quiz_type) if quiz_type.is_active => {}
        _ => return Err(ApiError::NotFound("quiz type")),
    }

    let response = QuizResponse {
        id: new_id(),
        quiz_type_id: quiz_type_id.to_string(),
        user_name: trimmed(&input.user_name),
        user_email: trimmed(&input.user_email),
        user_phone: trimmed(&input.user_phone),
        answers: input.answers.clone(),
        created_at: Utc::now().to_rfc3339(),
    };
    let answers = serde_json::to_string(&response.answers)
        .map_err(|err| ApiError::validation(format!("answers are not encodable: {err}")))?;

    sqlx::query(
        r#"INSERT INTO quiz_responses (id, quiz_type_id, user_name, user_email, user_phone, answers, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&response.id)
    .bind(&response.quiz_type_id)
    .bind(&response.user_name)
    .bind(&response.user_email)
    .bind(&response.user_phone)
    .bind(answers)
    .bind(&response.created_at)
    .execute(pool)
    .await?;
    Ok(response)
}

pub async fn list_responses(pool: &SqlitePool, quiz_type_id: &str) -> Result<Vec<QuizResponse>, sqlx::Error> {
    let rows = sqlx::query_as::<_, QuizResponseRow>(&format!(
        "{SELECT_RESPONSE} WHERE quiz_type_id = ? ORDER BY created_at DESC"
    ))
    .bind(quiz_type_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(QuizResponse::from).collect())
}

pub async fn delete_response(pool: &SqlitePool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM quiz_responses WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
