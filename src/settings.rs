//! The single settings record.
//!
//! Stored as the `settings` CMS block so the admin console can edit it like
//! any other content. Handlers load it once per request and pass it down
//! explicitly; nothing caches it between requests.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

pub const SETTINGS_KEY: &str = "settings";

pub const WEEKDAYS: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingDay {
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub enabled: bool,
}

impl WorkingDay {
    fn new(start: &str, end: &str, enabled: bool) -> Self {
        Self {
            start: start.to_string(),
            end: end.to_string(),
            enabled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub site_name: String,
    pub site_url: String,
    pub admin_email: String,

    pub recaptcha_enabled: bool,
    pub recaptcha_site_key: String,
    pub recaptcha_secret_key: String,

    pub sms_enabled: bool,
    pub sms_provider: String,
    pub netgsm_usercode: String,
    pub netgsm_password: String,
    pub netgsm_msg_header: String,

    pub email_enabled: bool,
    pub email_provider: String,
    pub resend_api_key: String,
    pub smtp_host: String,
    pub smtp_port: String,
    pub smtp_user: String,
    pub smtp_password: String,
    pub email_from: String,
    pub email_from_name: String,

    pub appointment_reminder_hours: u32,
    pub appointment_confirmation_required: bool,
    pub phone_verification_required: bool,

    pub working_hours: BTreeMap<String, WorkingDay>,
    pub holidays: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        let mut working_hours = BTreeMap::new();
        for day in &WEEKDAYS[..5] {
            working_hours.insert(day.to_string(), WorkingDay::new("09:00", "18:00", true));
        }
        for day in &WEEKDAYS[5..] {
            working_hours.insert(day.to_string(), WorkingDay::new("10:00", "14:00", false));
        }

        Self {
            site_name: "Psikolog Danismanlik".to_string(),
            site_url: String::new(),
            admin_email: String::new(),
            recaptcha_enabled: false,
            recaptcha_site_key: String::new(),
            recaptcha_secret_key: String::new(),
            sms_enabled: false,
            sms_provider: "netgsm".to_string(),
            netgsm_usercode: String::new(),
            netgsm_password: String::new(),
            netgsm_msg_header: String::new(),
            email_enabled: false,
            email_provider: "resend".to_string(),
            resend_api_key: String::new(),
            smtp_host: String::new(),
            smtp_port: "587".to_string(),
            smtp_user: String::new(),
            smtp_password: String::new(),
            email_from: String::new(),
            email_from_name: String::new(),
            appointment_reminder_hours: 24,
            appointment_confirmation_required: true,
            phone_verification_required: true,
            working_hours,
            holidays: Vec::new(),
        }
    }
}

impl Settings {
    pub fn is_holiday(&self, iso_date: &str) -> bool {
        self.holidays.iter().any(|day| day.trim() == iso_date)
    }

    pub fn public_view(&self) -> PublicSettings {
        PublicSettings {
            recaptcha_enabled: self.recaptcha_enabled,
            recaptcha_site_key: self.recaptcha_site_key.clone(),
            phone_verification_required: self.phone_verification_required,
        }
    }

    /// Loads the record, falling back to defaults when it is missing or
    /// cannot be parsed.
    pub async fn load(pool: &SqlitePool) -> Result<Self, sqlx::Error> {
        let raw = sqlx::query_scalar::<_, String>("SELECT data FROM cms_blocks WHERE key = ?")
            .bind(SETTINGS_KEY)
            .fetch_optional(pool)
            .await?;

        let Some(raw) = raw else {
            return Ok(Settings::default());
        };

        match serde_json::from_str(&raw) {
            Ok(settings) => Ok(settings),
            Err(err) => {
                log::warn!("Stored settings are unreadable, using defaults: {err}");
                Ok(Settings::default())
            }
        }
    }

    pub async fn save(&self, pool: &SqlitePool, updated_by: Option<&str>) -> Result<(), sqlx::Error> {
        let data = serde_json::to_string(self)
            .map_err(|err| sqlx::Error::Protocol(format!("settings encode failed: {err}")))?;
        sqlx::query(
            r#"INSERT INTO cms_blocks (key, data, updated_at, updated_by)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(key) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at, updated_by = excluded.updated_by"#,
        )
        .bind(SETTINGS_KEY)
        .bind(data)
        .bind(Utc::now().to_rfc3339())
        .bind(updated_by)
        .execute(pool)
        .await?;
        Ok(())
    }
}

/// The part of the settings a browser needs to gate its own UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicSettings {
    pub recaptcha_enabled: bool,
    pub recaptcha_site_key: String,
    pub phone_verification_required: bool,
}
