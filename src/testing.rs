//! Test doubles for the outbound providers and a ready-made [`AppState`].

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::{
    db::test_pool,
    email::{EmailGateway, OutgoingEmail},
    error::ProviderError,
    recaptcha::{BotScoreApi, ScoreResponse},
    sms::{SmsCredentials, SmsGateway},
    state::AppState,
};

#[derive(Default)]
pub struct FakeSms {
    sent: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl FakeSms {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// The trailing six digits of the last message, i.e. the OTP.
    pub fn last_code(&self) -> Option<String> {
        let sent = self.sent.lock().unwrap();
        let (_, message) = sent.last()?;
        let code: String = message.chars().rev().take(6).collect::<Vec<_>>().into_iter().rev().collect();
        code.chars().all(|ch| ch.is_ascii_digit()).then_some(code)
    }
}

#[async_trait]
impl SmsGateway for FakeSms {
    async fn send(
        &self,
        _credentials: &SmsCredentials,
        phone: &str,
        message: &str,
    ) -> Result<(), ProviderError> {
        if self.fail {
            return Err(ProviderError::Rejected("30".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((phone.to_string(), message.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeEmail {
    sent: Mutex<Vec<OutgoingEmail>>,
    fail: bool,
}

impl FakeEmail {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailGateway for FakeEmail {
    async fn send(&self, _api_key: &str, email: &OutgoingEmail) -> Result<(), ProviderError> {
        if self.fail {
            return Err(ProviderError::Status {
                status: 422,
                body: "invalid from".into(),
            });
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

pub struct FakeBotScore {
    response: Option<ScoreResponse>,
    calls: AtomicUsize,
}

impl FakeBotScore {
    pub fn responding(response: ScoreResponse) -> Self {
        Self {
            response: Some(response),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn scoring(score: f64) -> Self {
        Self::responding(ScoreResponse {
            success: true,
            score: Some(score),
            error_codes: Vec::new(),
        })
    }

    pub fn failing() -> Self {
        Self {
            response: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BotScoreApi for FakeBotScore {
    async fn score(&self, _secret: &str, _token: &str) -> Result<ScoreResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response
            .clone()
            .ok_or(ProviderError::NotConfigured("score endpoint unreachable"))
    }
}

pub struct Harness {
    pub state: AppState,
    pub sms: Arc<FakeSms>,
    pub email: Arc<FakeEmail>,
    pub bot_score: Arc<FakeBotScore>,
}

pub async fn harness() -> Harness {
    harness_with(FakeBotScore::scoring(0.9)).await
}

pub async fn harness_with(bot_score: FakeBotScore) -> Harness {
    let sms = Arc::new(FakeSms::default());
    let email = Arc::new(FakeEmail::default());
    let bot_score = Arc::new(bot_score);
    let (events, _) = broadcast::channel(16);
    let state = AppState {
        db: test_pool().await,
        events,
        sms: sms.clone(),
        email: email.clone(),
        bot_score: bot_score.clone(),
    };
    Harness {
        state,
        sms,
        email,
        bot_score,
    }
}
