use std::{fs, path::Path, str::FromStr};

use chrono::Utc;
use serde_json::json;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};

use crate::{
    auth::{hash_password, new_id},
    cms,
    config::AppConfig,
    models::ROLE_ADMIN,
    settings::{Settings, SETTINGS_KEY},
};

pub async fn connect(db_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let connect_options = SqliteConnectOptions::from_str(db_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(connect_options)
        .await
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

pub fn ensure_sqlite_dir(db_url: &str) -> std::io::Result<()> {
    let path = db_url
        .strip_prefix("sqlite://")
        .or_else(|| db_url.strip_prefix("sqlite:"));

    let Some(path) = path else {
        return Ok(());
    };

    let path = path.split('?').next().unwrap_or(path);
    if path == ":memory:" || path.is_empty() {
        return Ok(());
    }

    let path = path.strip_prefix("file:").unwrap_or(path);
    if let Some(parent) = Path::new(path).parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub async fn seed_defaults(pool: &SqlitePool, config: &AppConfig) -> Result<(), sqlx::Error> {
    seed_admin(pool, config).await?;
    seed_settings(pool).await?;
    seed_cms(pool).await?;
    Ok(())
}

pub async fn log_activity(
    pool: &SqlitePool,
    kind: &str,
    message: &str,
    user_id: Option<&str>,
    appointment_id: Option<&str>,
) {
    let result = sqlx::query(
        r#"INSERT INTO activities (id, kind, message, created_at, user_id, appointment_id)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(new_id())
    .bind(kind)
    .bind(message)
    .bind(Utc::now().to_rfc3339())
    .bind(user_id)
    .bind(appointment_id)
    .execute(pool)
    .await;

    if let Err(err) = result {
        log::warn!("Activity log write failed: {err}");
    }
}

async fn seed_admin(pool: &SqlitePool, config: &AppConfig) -> Result<(), sqlx::Error> {
    let existing = sqlx::query_as::<_, (String,)>("SELECT id FROM users WHERE role = ? LIMIT 1")
        .bind(ROLE_ADMIN)
        .fetch_optional(pool)
        .await?;

    if existing.is_some() {
        return Ok(());
    }

    if config.admin_password == "admin" {
        log::warn!("ADMIN_PASSWORD not set. Using default password 'admin'. Set ADMIN_PASSWORD in production.");
    }

    let password_hash = hash_password(&config.admin_password)
        .map_err(|_| sqlx::Error::Protocol("password hash failed".into()))?;

    sqlx::query(
        r#"INSERT INTO users (id, username, display_name, role, password_hash, active, created_at)
           VALUES (?, ?, ?, ?, ?, 1, ?)"#,
    )
    .bind(new_id())
    .bind(&config.admin_user)
    .bind(&config.admin_display_name)
    .bind(ROLE_ADMIN)
    .bind(password_hash)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    log::info!("Seeded admin account '{}'", config.admin_user);
    Ok(())
}

async fn seed_settings(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    if cms::get_block(pool, SETTINGS_KEY).await?.is_none() {
        Settings::default().save(pool, None).await?;
    }
    Ok(())
}

async fn seed_cms(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let blocks = [
        (
            "hero",
            json!({
                "title": "Kendinize iyi bakmanın ilk adımı",
                "subtitle": "Bireysel, çift ve aile danışmanlığı için online randevu alın.",
                "words": ["Anlaşılmak", "Güçlenmek", "Dengelenmek"]
            }),
        ),
        (
            "theme",
            json!({ "primary": "#0f172a", "accent": "#0ea5e9", "background": "#f8fafc" }),
        ),
        (
            "navigation",
            json!([
                { "href": "/", "label": "Ana Sayfa" },
                { "href": "/hakkinda", "label": "Hakkında" },
                { "href": "/hizmetler", "label": "Hizmetler" },
                { "href": "/testler", "label": "Testler" },
                { "href": "/randevu", "label": "Randevu" },
                { "href": "/iletisim", "label": "İletişim" }
            ]),
        ),
        ("footer", json!({ "text": "Tüm hakları saklıdır." })),
    ];

    for (key, data) in blocks {
        if cms::get_block(pool, key).await?.is_some() {
            continue;
        }
        cms::upsert_block(pool, key, &data, None).await?;
    }
    Ok(())
}

/// A fresh in-memory database with migrations applied and nothing seeded.
#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    // One connection: every connection to :memory: is a separate database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}
