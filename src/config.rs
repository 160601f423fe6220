use std::{env, time::Duration};

pub const DEFAULT_NETGSM_URL: &str = "https://api.netgsm.com.tr/sms/send/get";
pub const DEFAULT_RESEND_URL: &str = "https://api.resend.com/emails";
pub const DEFAULT_RECAPTCHA_URL: &str = "https://www.google.com/recaptcha/api/siteverify";

/// Process-level configuration. Business toggles and provider credentials
/// live in the settings record instead, see [`crate::settings::Settings`].
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub admin_user: String,
    pub admin_password: String,
    pub admin_display_name: String,
    pub netgsm_url: String,
    pub resend_url: String,
    pub recaptcha_url: String,
    pub http_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let port = env::var("PORT")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(8080);
        let timeout_secs = env::var("HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(10);

        Self {
            database_url: env_or("DATABASE_URL", "sqlite://./data/practice.db"),
            port,
            admin_user: env_or("ADMIN_USER", "admin"),
            admin_password: env_or("ADMIN_PASSWORD", "admin"),
            admin_display_name: env_or("ADMIN_DISPLAY_NAME", "Practice Admin"),
            netgsm_url: env_or("NETGSM_API_URL", DEFAULT_NETGSM_URL),
            resend_url: env_or("RESEND_API_URL", DEFAULT_RESEND_URL),
            recaptcha_url: env_or("RECAPTCHA_VERIFY_URL", DEFAULT_RECAPTCHA_URL),
            http_timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder().timeout(self.http_timeout).build()
    }
}

fn env_or(key: &str, fallback: &str) -> String {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string())
}
