use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;

use crate::{
    auth::new_id,
    error::{ApiError, ApiResult},
    models::FormSubmissionRow,
};

const SELECT_SUBMISSION: &str =
    "SELECT id, form_type, name, email, phone, subject, message, data, created_at FROM form_submissions";

#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionInput {
    pub form_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FormSubmission {
    pub id: String,
    pub form_type: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub subject: Option<String>,
    pub message: Option<String>,
    pub data: Option<Value>,
    pub created_at: String,
}

impl From<FormSubmissionRow> for FormSubmission {
    fn from(row: FormSubmissionRow) -> Self {
        Self {
            data: row.data.as_deref().and_then(|raw| serde_json::from_str(raw).ok()),
            id: row.id,
            form_type: row.form_type,
            name: row.name,
            email: row.email,
            phone: row.phone,
            subject: row.subject,
            message: row.message,
            created_at: row.created_at,
        }
    }
}

pub async fn submit(pool: &SqlitePool, input: &SubmissionInput) -> ApiResult<FormSubmission> {
    let form_type = input.form_type.trim();
    if form_type.is_empty() {
        return Err(ApiError::validation("form_type is required"));
    }

    let submission = FormSubmission {
        id: new_id(),
        form_type: form_type.to_string(),
        name: trimmed(&input.name),
        email: trimmed(&input.email),
        phone: trimmed(&input.phone),
        subject: trimmed(&input.subject),
        message: trimmed(&input.message),
        data: input.data.clone(),
        created_at: Utc::now().to_rfc3339(),
    };

    sqlx::query(
        r#"INSERT INTO form_submissions (id, form_type, name, email, phone, subject, message, data, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&submission.id)
    .bind(&submission.form_type)
    .bind(&submission.name)
    .bind(&submission.email)
    .bind(&submission.phone)
    .bind(&submission.subject)
    .bind(&submission.message)
    .bind(submission.data.as_ref().map(Value::to_string))
    .bind(&submission.created_at)
    .execute(pool)
    .await?;

    log::info!("Stored '{}' form submission", submission.form_type);
    Ok(submission)
}

pub async fn list(pool: &SqlitePool, form_type: Option<&str>) -> Result<Vec<FormSubmission>, sqlx::Error> {
    let rows = match form_type {
        Some(form_type) => {
            sqlx::query_as::<_, FormSubmissionRow>(&format!(
                "{SELECT_SUBMISSION} WHERE form_type = ? ORDER BY created_at DESC"
            ))
            .bind(form_type)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, FormSubmissionRow>(&format!(
                "{SELECT_SUBMISSION} ORDER BY created_at DESC"
            ))
            .fetch_all(pool)
            .await?
        }
    };
    Ok(rows.into_iter().map(FormSubmission::from).collect())
}

pub async fn delete(pool: &SqlitePool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM form_submissions WHERE id = ?")
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
