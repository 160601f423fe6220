//! Appointment storage.
//!
//! Requests are inserted as `pending` without looking at other bookings for
//! the same date and time; admins move them through the other statuses.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    auth::new_id,
    error::{ApiError, ApiResult},
    models::{AppointmentRow, AppointmentStatus},
    notify::{AppointmentDetails, Recipient},
    slots::{parse_date, parse_time},
};

const SELECT_APPOINTMENT: &str =
    "SELECT id, name, email, phone, date, time, service, message, status, created_at FROM appointments";

#[derive(Debug, Clone, Deserialize)]
pub struct NewAppointment {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    pub phone: String,
    pub date: String,
    pub time: String,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default, alias = "note")]
    pub message: Option<String>,
}

impl NewAppointment {
    pub fn validate(&self) -> ApiResult<()> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push("name is required");
        }
        if self.phone.trim().is_empty() {
            errors.push("phone is required");
        }
        if parse_date(&self.date).is_none() {
            errors.push("date must be YYYY-MM-DD");
        }
        if parse_time(&self.time).is_none() {
            errors.push("time must be HH:MM");
        }
        if let Some(email) = optional(&self.email) {
            if !email.contains('@') {
                errors.push("email is invalid");
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::validation(errors.join(", ")))
        }
    }
}

fn optional(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|value| !value.is_empty())
}

/// Zero-padded `YYYY-MM-DD`, so stored dates sort and match holidays.
fn canonical_date(raw: &str) -> String {
    parse_date(raw).map_or_else(|| raw.trim().to_string(), |date| date.format("%Y-%m-%d").to_string())
}

/// Zero-padded `HH:MM`, the form the slot list uses.
fn canonical_time(raw: &str) -> String {
    parse_time(raw).map_or_else(|| raw.trim().to_string(), |time| time.format("%H:%M").to_string())
}

pub async fn create(
    pool: &SqlitePool,
    input: &NewAppointment,
    now: DateTime<Utc>,
) -> Result<AppointmentRow, sqlx::Error> {
    let row = AppointmentRow {
        id: new_id(),
        name: input.name.trim().to_string(),
        email: optional(&input.email).map(str::to_string),
        phone: input.phone.trim().to_string(),
        date: canonical_date(&input.date),
        time: canonical_time(&input.time),
        service: optional(&input.service).map(str::to_string),
        message: optional(&input.message).map(str::to_string),
        status: AppointmentStatus::Pending.to_string(),
        created_at: now.to_rfc3339(),
    };

    sqlx::query(
        r#"INSERT INTO appointments (id, name, email, phone, date, time, service, message, status, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&row.id)
    .bind(&row.name)
    .bind(&row.email)
    .bind(&row.phone)
    .bind(&row.date)
    .bind(&row.time)
    .bind(&row.service)
    .bind(&row.message)
    .bind(&row.status)
    .bind(&row.created_at)
    .execute(pool)
    .await?;

    Ok(row)
}

pub async fn find(pool: &SqlitePool, id: &str) -> Result<Option<AppointmentRow>, sqlx::Error> {
    sqlx::query_as::<_, AppointmentRow>(&format!("{SELECT_APPOINTMENT} WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn list(
    pool: &SqlitePool,
    status: Option<AppointmentStatus>,
) -> Result<Vec<AppointmentRow>, sqlx::Error> {
    match status {
        Some(status) => {
            sqlx::query_as::<_, AppointmentRow>(&format!(
                "{SELECT_APPOINTMENT} WHERE status = ? ORDER BY date DESC, time ASC"
            ))
            .bind(status.as_str())
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query_as::<_, AppointmentRow>(&format!(
                "{SELECT_APPOINTMENT} ORDER BY date DESC, time ASC"
            ))
            .fetch_all(pool)
            .await
        }
    }
}

pub async fn update_status(
    pool: &SqlitePool,
    id: &str,
    status: AppointmentStatus,
) -> Result<Option<AppointmentRow>, sqlx::Error> {
    let result = sqlx::query("UPDATE appointments SET status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Ok(None);
    }
    find(pool, id).await
}

pub async fn delete(pool: &SqlitePool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM appointments WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn count_by_status(pool: &SqlitePool) -> Result<Vec<(String, i64)>, sqlx::Error> {
    let counts = sqlx::query_as::<_, (String, i64)>(
        "SELECT status, COUNT(*) FROM appointments GROUP BY status",
    )
    .fetch_all(pool)
    .await?;

    Ok(AppointmentStatus::ALL
        .iter()
        .map(|status| {
            let total = counts
                .iter()
                .find(|(name, _)| name == status.as_str())
                .map_or(0, |(_, total)| *total);
            (status.to_string(), total)
        })
        .collect())
}

pub fn recipient(row: &AppointmentRow) -> Recipient {
    Recipient {
        name: row.name.clone(),
        email: row.email.clone(),
        phone: Some(row.phone.clone()),
    }
}

pub fn details(row: &AppointmentRow) -> AppointmentDetails {
    AppointmentDetails {
        date: row.date.clone(),
        time: row.time.clone(),
        service: row.service.clone().unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn booking(name: &str) -> NewAppointment {
        NewAppointment {
            name: name.into(),
            email: Some("client@example.com".into()),
            phone: "5551234567".into(),
            date: "2026-10-19".into(),
            time: "09:30".into(),
            service: Some("Bireysel Terapi".into()),
            message: None,
        }
    }

    #[test]
    fn validation_collects_every_problem() {
        let input = NewAppointment {
            name: " ".into(),
            email: Some("nope".into()),
            phone: "".into(),
            date: "19.10.2026".into(),
            time: "9".into(),
            service: None,
            message: None,
        };
        let Err(ApiError::Validation(message)) = input.validate() else {
            panic!("expected validation error");
        };
        for part in ["name", "phone", "date", "time", "email"] {
            assert!(message.contains(part), "{message} should mention {part}");
        }
        assert!(booking("Ayşe").validate().is_ok());
    }

    #[tokio::test]
    async fn new_appointments_start_pending() {
        let pool = test_pool().await;
        let row = create(&pool, &booking("Ayşe"), Utc::now()).await.unwrap();
        assert_eq!(row.status, "pending");

        let stored = find(&pool, &row.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Ayşe");
        assert_eq!(stored.service.as_deref(), Some("Bireysel Terapi"));
    }

    #[tokio::test]
    async fn concurrent_bookings_for_one_slot_both_land() {
        let pool = test_pool().await;
        let now = Utc::now();
        let (ayse, mehmet) = (booking("Ayşe"), booking("Mehmet"));
        let (first, second) = tokio::join!(create(&pool, &ayse, now), create(&pool, &mehmet, now));
        let (first, second) = (first.unwrap(), second.unwrap());
        assert_ne!(first.id, second.id);

        let rows = list(&pool, Some(AppointmentStatus::Pending)).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.date == "2026-10-19" && row.time == "09:30"));
    }

    #[tokio::test]
    async fn status_updates_and_counts() {
        let pool = test_pool().await;
        let row = create(&pool, &booking("Ayşe"), Utc::now()).await.unwrap();
        create(&pool, &booking("Mehmet"), Utc::now()).await.unwrap();

        let updated = update_status(&pool, &row.id, AppointmentStatus::Confirmed)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, "confirmed");
        assert!(update_status(&pool, "missing", AppointmentStatus::Cancelled)
            .await
            .unwrap()
            .is_none());

        let counts = count_by_status(&pool).await.unwrap();
        assert_eq!(
            counts,
            vec![
                ("pending".to_string(), 1),
                ("confirmed".to_string(), 1),
                ("cancelled".to_string(), 0),
                ("completed".to_string(), 0),
            ]
        );
    }

    #[tokio::test]
    async fn list_orders_by_date_then_time() {
        let pool = test_pool().await;
        for (date, time) in [("2026-10-19", "11:00"), ("2026-10-20", "09:00"), ("2026-10-19", "09:00")] {
            let input = NewAppointment {
                date: date.into(),
                time: time.into(),
                ..booking("Ayşe")
            };
            create(&pool, &input, Utc::now()).await.unwrap();
        }
        let order: Vec<(String, String)> = list(&pool, None)
            .await
            .unwrap()
            .into_iter()
            .map(|row| (row.date, row.time))
            .collect();
        assert_eq!(
            order,
            vec![
                ("2026-10-20".to_string(), "09:00".to_string()),
                ("2026-10-19".to_string(), "09:00".to_string()),
                ("2026-10-19".to_string(), "11:00".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn unpadded_date_and_time_are_stored_padded() {
        let pool = test_pool().await;
        for (date, time) in [("2026-10-19", "10:00"), ("2026-10-19", "9:30"), ("2026-1-5", "9:00")] {
            let input = NewAppointment {
                date: date.into(),
                time: time.into(),
                ..booking("Ayşe")
            };
            assert!(input.validate().is_ok());
            create(&pool, &input, Utc::now()).await.unwrap();
        }
        let order: Vec<String> = list(&pool, None)
            .await
            .unwrap()
            .into_iter()
            .map(|row| format!("{} {}", row.date, row.time))
            .collect();
        assert_eq!(order, vec!["2026-10-19 09:30", "2026-10-19 10:00", "2026-01-05 09:00"]);
    }

    #[tokio::test]
    async fn delete_removes_row() {
        let pool = test_pool().await;
        let row = create(&pool, &booking("Ayşe"), Utc::now()).await.unwrap();
        assert!(delete(&pool, &row.id).await.unwrap());
        assert!(find(&pool, &row.id).await.unwrap().is_none());
    }
}
