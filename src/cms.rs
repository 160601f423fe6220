//! Key to JSON-document content blocks. No schema: every consumer reads its
//! own key defensively.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;

use crate::models::CmsBlockRow;

#[derive(Debug, Clone, Serialize)]
pub struct CmsBlock {
    pub key: String,
    pub data: Value,
    pub updated_at: String,
}

impl From<CmsBlockRow> for CmsBlock {
    fn from(row: CmsBlockRow) -> Self {
        let data = serde_json::from_str(&row.data).unwrap_or_else(|err| {
            log::warn!("CMS block '{}' holds invalid JSON: {err}", row.key);
            Value::Null
        });
        Self {
            key: row.key,
            data,
            updated_at: row.updated_at,
        }
    }
}

pub async fn get_block(pool: &SqlitePool, key: &str) -> Result<Option<CmsBlock>, sqlx::Error> {
    let row = sqlx::query_as::<_, CmsBlockRow>(
        "SELECT key, data, updated_at FROM cms_blocks WHERE key = ?",
    )
    .bind(key)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(CmsBlock::from))
}

pub async fn list_blocks(pool: &SqlitePool) -> Result<Vec<CmsBlock>, sqlx::Error> {
    let rows = sqlx::query_as::<_, CmsBlockRow>(
        "SELECT key, data, updated_at FROM cms_blocks ORDER BY key",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(CmsBlock::from).collect())
}

pub async fn upsert_block(
    pool: &SqlitePool,
    key: &str,
    data: &Value,
    updated_by: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO cms_blocks (key, data, updated_at, updated_by)
           VALUES (?, ?, ?, ?)
           ON CONFLICT(key) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at, updated_by = excluded.updated_by"#,
    )
    .bind(key)
    .bind(data.to_string())
    .bind(Utc::now().to_rfc3339())
    .bind(updated_by)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_block(pool: &SqlitePool, key: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM cms_blocks WHERE key = ?")
        .bind(key)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
