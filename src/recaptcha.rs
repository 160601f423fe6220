use async_trait::async_trait;
use serde::Deserialize;

use crate::{
    error::{ApiError, ProviderError},
    settings::Settings,
};

pub const SCORE_THRESHOLD: f64 = 0.5;
const DEFAULT_DENY_REASON: &str = "bot detected";

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ScoreResponse {
    #[serde(default)]
    pub success: bool,
    pub score: Option<f64>,
    #[serde(default, rename = "error-codes")]
    pub error_codes: Vec<String>,
}

#[async_trait]
pub trait BotScoreApi: Send + Sync {
    async fn score(&self, secret: &str, token: &str) -> Result<ScoreResponse, ProviderError>;
}

pub struct RecaptchaClient {
    http: reqwest::Client,
    url: String,
}

impl RecaptchaClient {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl BotScoreApi for RecaptchaClient {
    async fn score(&self, secret: &str, token: &str) -> Result<ScoreResponse, ProviderError> {
        let response = self
            .http
            .post(&self.url)
            .form(&[("secret", secret), ("response", token)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<ScoreResponse>().await?)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum GateDecision {
    Allowed { score: f64 },
    Denied { score: f64, reason: String },
}

impl GateDecision {
    fn from_response(response: &ScoreResponse) -> Self {
        let score = response.score.unwrap_or(0.0);
        if response.success && score >= SCORE_THRESHOLD {
            return GateDecision::Allowed { score };
        }
        let reason = response
            .error_codes
            .first()
            .cloned()
            .unwrap_or_else(|| DEFAULT_DENY_REASON.to_string());
        GateDecision::Denied { score, reason }
    }
}

/// Runs the bot-score check for `token`.
///
/// A disabled gate always allows. Transport and decode failures are errors,
/// never an implicit allow.
pub async fn check(
    settings: &Settings,
    api: &dyn BotScoreApi,
    token: &str,
) -> Result<GateDecision, ApiError> {
    if token.trim().is_empty() {
        return Err(ApiError::validation("token is required"));
    }
    if !settings.recaptcha_enabled {
        return Ok(GateDecision::Allowed { score: 1.0 });
    }
    if settings.recaptcha_secret_key.trim().is_empty() {
        return Err(ApiError::Provider("recaptcha secret key missing".to_string()));
    }

    let response = api
        .score(&settings.recaptcha_secret_key, token)
        .await
        .map_err(|err| {
            log::warn!("Bot score request failed: {err}");
            ApiError::Provider(err.to_string())
        })?;

    let decision = GateDecision::from_response(&response);
    if let GateDecision::Denied { score, reason } = &decision {
        log::info!("Bot score gate denied request (score {score}, reason {reason})");
    }
    Ok(decision)
}
