//! One-time phone verification codes.
//!
//! One live code per phone number: issuing again overwrites the previous
//! code. A code is accepted once, before it expires; a successful check
//! clears it so it cannot be replayed.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sqlx::SqlitePool;

use crate::{
    error::{ApiError, ApiResult},
    models::VerificationCodeRow,
    settings::Settings,
    sms::{mask_phone, SmsCredentials, SmsGateway},
};

pub const CODE_TTL_MINUTES: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueOutcome {
    Sent,
    /// Phone verification is turned off; no code was generated.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Verified,
    /// Phone verification is turned off; nothing was checked.
    Skipped,
}

pub fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

pub fn message_for(code: &str) -> String {
    format!("Randevu dogrulama kodunuz: {code}")
}

/// Stores `code` for `phone`, replacing any code issued earlier.
pub async fn store_code(
    pool: &SqlitePool,
    phone: &str,
    code: &str,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    let expires_at = now + Duration::minutes(CODE_TTL_MINUTES);
    sqlx::query(
        r#"INSERT INTO verification_codes (phone, code, expires_at, verified, created_at)
           VALUES (?, ?, ?, 0, ?)
           ON CONFLICT(phone) DO UPDATE SET
             code = excluded.code,
             expires_at = excluded.expires_at,
             verified = 0,
             created_at = excluded.created_at"#,
    )
    .bind(phone)
    .bind(code)
    .bind(expires_at.to_rfc3339())
    .bind(now.to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn find_code(
    pool: &SqlitePool,
    phone: &str,
) -> Result<Option<VerificationCodeRow>, sqlx::Error> {
    sqlx::query_as::<_, VerificationCodeRow>(
        "SELECT code, expires_at, verified FROM verification_codes WHERE phone = ?",
    )
    .bind(phone)
    .fetch_optional(pool)
    .await
}

/// Checks `code` against the stored one and consumes it on a match.
///
/// Returns `false` when no code exists, it does not match, it was already
/// used, or it expired.
pub async fn check_code(
    pool: &SqlitePool,
    phone: &str,
    code: &str,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let Some(row) = find_code(pool, phone).await? else {
        return Ok(false);
    };
    let Some(stored) = row.code.as_deref() else {
        return Ok(false);
    };
    if stored != code {
        return Ok(false);
    }
    let expired = DateTime::parse_from_rfc3339(&row.expires_at)
        .map(|expires_at| expires_at.with_timezone(&Utc) <= now)
        .unwrap_or(true);
    if expired {
        return Ok(false);
    }

    // Conditional on the code so two concurrent checks cannot both consume it.
    let result = sqlx::query(
        "UPDATE verification_codes SET verified = 1, code = NULL WHERE phone = ? AND code = ?",
    )
    .bind(phone)
    .bind(code)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn issue(
    pool: &SqlitePool,
    settings: &Settings,
    sms: &dyn SmsGateway,
    phone: &str,
    now: DateTime<Utc>,
) -> ApiResult<IssueOutcome> {
    let phone = phone.trim();
    if phone.is_empty() {
        return Err(ApiError::validation("phone number is required"));
    }
    if !settings.phone_verification_required {
        return Ok(IssueOutcome::Skipped);
    }
    if !settings.sms_enabled {
        log::warn!("Phone verification is required but the SMS channel is disabled");
        return Err(ApiError::Provider("SMS gateway disabled".to_string()));
    }

    let code = generate_code();
    store_code(pool, phone, &code, now).await?;

    let credentials = SmsCredentials::from_settings(settings);
    if let Err(err) = sms.send(&credentials, phone, &message_for(&code)).await {
        log::warn!("Verification SMS to {} failed: {err}", mask_phone(phone));
        return Err(ApiError::Provider("SMS could not be sent".to_string()));
    }
    Ok(IssueOutcome::Sent)
}

pub async fn verify(
    pool: &SqlitePool,
    settings: &Settings,
    phone: &str,
    code: &str,
    now: DateTime<Utc>,
) -> ApiResult<VerifyOutcome> {
    let phone = phone.trim();
    let code = code.trim();
    if phone.is_empty() || code.is_empty() {
        return Err(ApiError::validation("required fields missing"));
    }
    if !settings.phone_verification_required {
        return Ok(VerifyOutcome::Skipped);
    }
    if check_code(pool, phone, code, now).await? {
        Ok(VerifyOutcome::Verified)
    } else {
        Err(ApiError::InvalidCode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::test_pool, testing::FakeSms};

    const PHONE: &str = "5551234567";

    fn sms_settings() -> Settings {
        Settings {
            sms_enabled: true,
            phone_verification_required: true,
            netgsm_usercode: "user".into(),
            ..Settings::default()
        }
    }

    fn other_code(code: &str) -> String {
        if code == "123456" { "654321" } else { "123456" }.to_string()
    }

    #[test]
    fn generated_codes_are_six_digits() {
        for _ in 0..1000 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            let value: u32 = code.parse().unwrap();
            assert!((100_000..=999_999).contains(&value));
        }
    }

    #[tokio::test]
    async fn issued_code_is_sent_and_verifies_once() {
        let pool = test_pool().await;
        let sms = FakeSms::default();
        let now = Utc::now();

        let outcome = issue(&pool, &sms_settings(), &sms, PHONE, now).await.unwrap();
        assert_eq!(outcome, IssueOutcome::Sent);
        let code = sms.last_code().unwrap();

        let verified = verify(&pool, &sms_settings(), PHONE, &code, now).await.unwrap();
        assert_eq!(verified, VerifyOutcome::Verified);
        let row = find_code(&pool, PHONE).await.unwrap().unwrap();
        assert!(row.verified);

        let replay = verify(&pool, &sms_settings(), PHONE, &code, now).await;
        assert!(matches!(replay, Err(ApiError::InvalidCode)));
    }

    #[tokio::test]
    async fn wrong_code_fails_and_leaves_row_unverified() {
        let pool = test_pool().await;
        let sms = FakeSms::default();
        let now = Utc::now();

        issue(&pool, &sms_settings(), &sms, PHONE, now).await.unwrap();
        let code = sms.last_code().unwrap();

        let result = verify(&pool, &sms_settings(), PHONE, &other_code(&code), now).await;
        assert!(matches!(result, Err(ApiError::InvalidCode)));
        let row = find_code(&pool, PHONE).await.unwrap().unwrap();
        assert!(!row.verified);
        assert_eq!(row.code.as_deref(), Some(code.as_str()));
    }

    #[tokio::test]
    async fn reissuing_overwrites_the_previous_code() {
        let pool = test_pool().await;
        let now = Utc::now();
        store_code(&pool, PHONE, "111111", now).await.unwrap();
        store_code(&pool, PHONE, "222222", now).await.unwrap();

        assert!(!check_code(&pool, PHONE, "111111", now).await.unwrap());
        assert!(check_code(&pool, PHONE, "222222", now).await.unwrap());

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM verification_codes")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn expired_code_fails_even_when_it_matches() {
        let pool = test_pool().await;
        let issued_at = Utc::now();
        store_code(&pool, PHONE, "123456", issued_at).await.unwrap();

        let later = issued_at + Duration::minutes(CODE_TTL_MINUTES) + Duration::seconds(1);
        let result = verify(&pool, &sms_settings(), PHONE, "123456", later).await;
        assert!(matches!(result, Err(ApiError::InvalidCode)));

        let just_before = issued_at + Duration::minutes(CODE_TTL_MINUTES) - Duration::seconds(1);
        assert!(check_code(&pool, PHONE, "123456", just_before).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_phone_fails_closed() {
        let pool = test_pool().await;
        let result = verify(&pool, &sms_settings(), PHONE, "123456", Utc::now()).await;
        assert!(matches!(result, Err(ApiError::InvalidCode)));
    }

    #[tokio::test]
    async fn disabled_verification_skips_both_steps() {
        let pool = test_pool().await;
        let sms = FakeSms::default();
        let settings = Settings {
            phone_verification_required: false,
            sms_enabled: true,
            ..Settings::default()
        };

        let issued = issue(&pool, &settings, &sms, PHONE, Utc::now()).await.unwrap();
        assert_eq!(issued, IssueOutcome::Skipped);
        assert!(sms.sent().is_empty());
        assert!(find_code(&pool, PHONE).await.unwrap().is_none());

        let verified = verify(&pool, &settings, PHONE, "000000", Utc::now()).await.unwrap();
        assert_eq!(verified, VerifyOutcome::Skipped);
    }

    #[tokio::test]
    async fn missing_fields_are_validation_errors() {
        let pool = test_pool().await;
        let sms = FakeSms::default();
        assert!(matches!(
            issue(&pool, &sms_settings(), &sms, " ", Utc::now()).await,
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            verify(&pool, &sms_settings(), PHONE, "", Utc::now()).await,
            Err(ApiError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn gateway_failure_blocks_issue() {
        let pool = test_pool().await;
        let sms = FakeSms::failing();
        let result = issue(&pool, &sms_settings(), &sms, PHONE, Utc::now()).await;
        assert!(matches!(result, Err(ApiError::Provider(_))));
    }

    #[tokio::test]
    async fn disabled_sms_channel_blocks_issue() {
        let pool = test_pool().await;
        let sms = FakeSms::default();
        let settings = Settings {
            sms_enabled: false,
            ..sms_settings()
        };
        let result = issue(&pool, &settings, &sms, PHONE, Utc::now()).await;
        assert!(matches!(result, Err(ApiError::Provider(_))));
        assert!(sms.sent().is_empty());
    }
}
