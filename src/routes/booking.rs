//! The booking flow: slots, bot check, phone verification, the appointment
//! write and its notifications.

use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::{
    appointments::{self, NewAppointment},
    db::log_activity,
    error::{ApiError, ApiResult},
    notify::{AppointmentDetails, NotificationKind, Recipient},
    otp::{self, IssueOutcome, VerifyOutcome},
    recaptcha::{self, GateDecision},
    settings::Settings,
    slots::{generate_slots, parse_date},
    state::{AppState, ServerEvent},
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/slots").route(web::get().to(slots)))
        .service(web::resource("/api/verify-recaptcha").route(web::post().to(verify_recaptcha)))
        .service(web::resource("/api/send-verification").route(web::post().to(send_verification)))
        .service(web::resource("/api/verify-code").route(web::post().to(verify_code)))
        .service(web::resource("/api/appointments").route(web::post().to(create_appointment)))
        .service(web::resource("/api/send-notification").route(web::post().to(send_notification)));
}

#[derive(Deserialize)]
struct SlotQuery {
    date: String,
}

async fn slots(state: web::Data<AppState>, query: web::Query<SlotQuery>) -> ApiResult<HttpResponse> {
    let date = parse_date(&query.date).ok_or_else(|| ApiError::validation("date must be YYYY-MM-DD"))?;
    let settings = Settings::load(&state.db).await?;
    let slots = generate_slots(date, &settings);
    Ok(HttpResponse::Ok().json(json!({ "date": query.date.trim(), "slots": slots })))
}

#[derive(Deserialize)]
struct TokenRequest {
    #[serde(default)]
    token: String,
}

async fn verify_recaptcha(
    state: web::Data<AppState>,
    body: web::Json<TokenRequest>,
) -> ApiResult<HttpResponse> {
    let settings = Settings::load(&state.db).await?;
    match recaptcha::check(&settings, state.bot_score.as_ref(), &body.token).await? {
        GateDecision::Allowed { score } => {
            Ok(HttpResponse::Ok().json(json!({ "success": true, "score": score })))
        }
        GateDecision::Denied { score, reason } => Err(ApiError::BotDetected { reason, score }),
    }
}

#[derive(Deserialize)]
struct PhoneRequest {
    #[serde(default)]
    phone: String,
}

async fn send_verification(
    state: web::Data<AppState>,
    body: web::Json<PhoneRequest>,
) -> ApiResult<HttpResponse> {
    let settings = Settings::load(&state.db).await?;
    let outcome = otp::issue(&state.db, &settings, state.sms.as_ref(), &body.phone, Utc::now()).await?;
    let message = match outcome {
        IssueOutcome::Sent => "verification code sent",
        IssueOutcome::Skipped => "phone verification disabled",
    };
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "sent": outcome == IssueOutcome::Sent,
        "message": message,
    })))
}

#[derive(Deserialize)]
struct CodeRequest {
    #[serde(default)]
    phone: String,
    #[serde(default)]
    code: String,
}

async fn verify_code(
    state: web::Data<AppState>,
    body: web::Json<CodeRequest>,
) -> ApiResult<HttpResponse> {
    let settings = Settings::load(&state.db).await?;
    let outcome = otp::verify(&state.db, &settings, &body.phone, &body.code, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "skipped": outcome == VerifyOutcome::Skipped,
    })))
}

/// Writes the request as `pending`, then notifies. Notification trouble is
/// reported in the body but never fails the booking.
async fn create_appointment(
    state: web::Data<AppState>,
    body: web::Json<NewAppointment>,
) -> ApiResult<HttpResponse> {
    body.validate()?;
    let settings = Settings::load(&state.db).await?;
    let now = Utc::now();

    let row = appointments::create(&state.db, &body, now).await?;
    log_activity(
        &state.db,
        "appointment_created",
        &format!("New appointment requested for {} on {} {}.", row.name, row.date, row.time),
        None,
        Some(&row.id),
    )
    .await;
    state.publish(ServerEvent::from_row("appointment_created", row.clone()));

    let report = state
        .dispatcher(&settings)
        .dispatch(
            NotificationKind::AppointmentConfirmation,
            &appointments::recipient(&row),
            &appointments::details(&row),
            now,
        )
        .await;

    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "id": row.id,
        "status": row.status,
        "notifications": report.flags(),
    })))
}

#[derive(Deserialize)]
struct NotificationRequest {
    #[serde(rename = "type")]
    kind: NotificationKind,
    #[serde(alias = "to")]
    recipient: Recipient,
    appointment: AppointmentDetails,
}

async fn send_notification(
    state: web::Data<AppState>,
    body: web::Json<NotificationRequest>,
) -> ApiResult<HttpResponse> {
    let settings = Settings::load(&state.db).await?;
    let report = state
        .dispatcher(&settings)
        .dispatch(body.kind, &body.recipient, &body.appointment, Utc::now())
        .await;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "results": report.flags(),
        "details": report,
    })))
}
