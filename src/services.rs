use chrono::Utc;
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    auth::new_id,
    error::{ApiError, ApiResult},
    models::ServiceRow,
};

const SELECT_SERVICE: &str =
    "SELECT id, title, description, icon, is_active, order_index, created_at FROM services";

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceInput {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
    pub order_index: Option<i64>,
}

fn active_by_default() -> bool {
    true
}

impl ServiceInput {
    pub fn validate(&self) -> ApiResult<()> {
        if self.title.trim().is_empty() {
            return Err(ApiError::validation("title is required"));
        }
        Ok(())
    }
}

pub async fn list_active(pool: &SqlitePool) -> Result<Vec<ServiceRow>, sqlx::Error> {
    sqlx::query_as::<_, ServiceRow>(&format!(
        "{SELECT_SERVICE} WHERE is_active = 1 ORDER BY order_index ASC"
    ))
    .fetch_all(pool)
    .await
}

pub async fn list_all(pool: &SqlitePool) -> Result<Vec<ServiceRow>, sqlx::Error> {
    sqlx::query_as::<_, ServiceRow>(&format!("{SELECT_SERVICE} ORDER BY order_index ASC"))
        .fetch_all(pool)
        .await
}

pub async fn find(pool: &SqlitePool, id: &str) -> Result<Option<ServiceRow>, sqlx::Error> {
    sqlx::query_as::<_, ServiceRow>(&format!("{SELECT_SERVICE} WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Inserts a service. Without an explicit position it goes last.
pub async fn create(pool: &SqlitePool, input: &ServiceInput) -> Result<ServiceRow, sqlx::Error> {
    let order_index = match input.order_index {
        Some(order_index) => order_index,
        None => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM services")
                .fetch_one(pool)
                .await?
        }
    };
    let row = ServiceRow {
        id: new_id(),
        title: input.title.trim().to_string(),
        description: input.description.trim().to_string(),
        icon: input.icon.clone(),
        is_active: input.is_active,
        order_index,
        created_at: Utc::now().to_rfc3339(),
    };

    sqlx::query(
        r#"INSERT INTO services (id, title, description, icon, is_active, order_index, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&row.id)
    .bind(&row.title)
    .bind(&row.description)
    .bind(&row.icon)
    .bind(row.is_active)
    .bind(row.order_index)
    .bind(&row.created_at)
    .execute(pool)
    .await?;
    Ok(row)
}

pub async fn update(
    pool: &SqlitePool,
    id: &str,
    input: &ServiceInput,
) -> Result<Option<ServiceRow>, sqlx::Error> {
    let Some(existing) = find(pool, id).await? else {
        return Ok(None);
    };
    sqlx::query(
        "UPDATE services SET title = ?, description = ?, icon = ?, is_active = ?, order_index = ? WHERE id = ?",
    )
    .bind(input.title.trim())
    .bind(input.description.trim())
    .bind(&input.icon)
    .bind(input.is_active)
    .bind(input.order_index.unwrap_or(existing.order_index))
    .bind(id)
    .execute(pool)
    .await?;
    find(pool, id).await
}

pub async fn set_active(pool: &SqlitePool, id: &str, active: bool) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE services SET is_active = ? WHERE id = ?")
        .bind(active)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete(pool: &SqlitePool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM services WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn input(title: &str) -> ServiceInput {
        ServiceInput {
            title: title.into(),
            description: String::new(),
            icon: "🧠".into(),
            is_active: true,
            order_index: None,
        }
    }

    #[tokio::test]
    async fn public_list_hides_inactive_and_keeps_order() {
        let pool = test_pool().await;
        let first = create(&pool, &input("Bireysel Terapi")).await.unwrap();
        let second = create(&pool, &input("Çift Terapisi")).await.unwrap();
        create(&pool, &input("Aile Danışmanlığı")).await.unwrap();
        assert_eq!((first.order_index, second.order_index), (0, 1));

        assert!(set_active(&pool, &second.id, false).await.unwrap());
        let titles: Vec<String> = list_active(&pool)
            .await
            .unwrap()
            .into_iter()
            .map(|row| row.title)
            .collect();
        assert_eq!(titles, vec!["Bireysel Terapi", "Aile Danışmanlığı"]);
        assert_eq!(list_all(&pool).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn update_keeps_position_unless_given() {
        let pool = test_pool().await;
        create(&pool, &input("A")).await.unwrap();
        let row = create(&pool, &input("B")).await.unwrap();
        let updated = update(&pool, &row.id, &input("B2")).await.unwrap().unwrap();
        assert_eq!(updated.title, "B2");
        assert_eq!(updated.order_index, 1);
        assert!(update(&pool, "missing", &input("C")).await.unwrap().is_none());
    }

    #[test]
    fn blank_title_is_rejected() {
        assert!(input(" ").validate().is_err());
    }
}
