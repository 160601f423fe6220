use std::collections::BTreeMap;

use actix_web::{middleware::from_fn, web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    appointments,
    auth::{admin_validator, logout_guard, AuthUser},
    cms,
    db::log_activity,
    error::{ApiError, ApiResult},
    forms,
    models::{ActivityRow, AppointmentStatus},
    notify::NotificationKind,
    quiz::{self, QuestionInput, QuizTypeInput},
    services::{self, ServiceInput},
    settings::{Settings, SETTINGS_KEY},
    state::{AppState, ServerEvent},
};

const RECENT_ACTIVITY: i64 = 10;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin/api")
            .wrap(HttpAuthentication::basic(admin_validator))
            .wrap(from_fn(logout_guard))
            .service(web::resource("/dashboard").route(web::get().to(dashboard)))
            .service(web::resource("/appointments").route(web::get().to(list_appointments)))
            .service(
                web::resource("/appointments/{id}")
                    .route(web::get().to(appointment_detail))
                    .route(web::delete().to(delete_appointment)),
            )
            .service(web::resource("/appointments/{id}/status").route(web::put().to(update_status)))
            .service(web::resource("/appointments/{id}/remind").route(web::post().to(send_reminder)))
            .service(
                web::resource("/settings")
                    .route(web::get().to(get_settings))
                    .route(web::put().to(save_settings)),
            )
            .service(
                web::resource("/services")
                    .route(web::get().to(list_services))
                    .route(web::post().to(create_service)),
            )
            .service(
                web::resource("/services/{id}")
                    .route(web::put().to(update_service))
                    .route(web::delete().to(delete_service)),
            )
            .service(web::resource("/services/{id}/toggle").route(web::post().to(toggle_service)))
            .service(
                web::resource("/quiz")
                    .route(web::get().to(list_quiz_types))
                    .route(web::post().to(create_quiz_type)),
            )
            .service(
                web::resource("/quiz/{id}")
                    .route(web::put().to(update_quiz_type))
                    .route(web::delete().to(delete_quiz_type)),
            )
            .service(
                web::resource("/quiz/{id}/questions")
                    .route(web::get().to(list_questions))
                    .route(web::post().to(create_question)),
            )
            .service(web::resource("/quiz/{id}/questions/order").route(web::put().to(reorder_questions)))
            .service(web::resource("/quiz/{id}/responses").route(web::get().to(list_responses)))
            .service(
                web::resource("/questions/{id}")
                    .route(web::put().to(update_question))
                    .route(web::delete().to(delete_question)),
            )
            .service(web::resource("/responses/{id}").route(web::delete().to(delete_response)))
            .service(web::resource("/forms").route(web::get().to(list_forms)))
            .service(web::resource("/forms/{id}").route(web::delete().to(delete_form)))
            .service(web::resource("/cms").route(web::get().to(list_cms)))
            .service(
                web::resource("/cms/{key}")
                    .route(web::get().to(get_cms))
                    .route(web::put().to(save_cms))
                    .route(web::delete().to(delete_cms)),
            ),
    );
}

fn deleted(found: bool, what: &'static str) -> ApiResult<HttpResponse> {
    if found {
        Ok(HttpResponse::Ok().json(json!({ "success": true })))
    } else {
        Err(ApiError::NotFound(what))
    }
}

async fn dashboard(state: web::Data<AppState>, auth: web::ReqData<AuthUser>) -> ApiResult<HttpResponse> {
    let counts: BTreeMap<String, i64> = appointments::count_by_status(&state.db)
        .await?
        .into_iter()
        .collect();
    let total: i64 = counts.values().sum();
    let activity = sqlx::query_as::<_, ActivityRow>(
        "SELECT kind, message, created_at FROM activities ORDER BY created_at DESC LIMIT ?",
    )
    .bind(RECENT_ACTIVITY)
    .fetch_all(&state.db)
    .await?;

    Ok(HttpResponse::Ok().json(json!({
        "admin": auth.display_name,
        "total": total,
        "counts": counts,
        "recent_activity": activity,
    })))
}

#[derive(Deserialize)]
struct AppointmentFilter {
    status: Option<String>,
}

async fn list_appointments(
    state: web::Data<AppState>,
    query: web::Query<AppointmentFilter>,
) -> ApiResult<HttpResponse> {
    let status = match query.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Some(raw.parse::<AppointmentStatus>().map_err(ApiError::Validation)?),
        None => None,
    };
    let rows = appointments::list(&state.db, status).await?;
    Ok(HttpResponse::Ok().json(rows))
}

async fn appointment_detail(state: web::Data<AppState>, path: web::Path<String>) -> ApiResult<HttpResponse> {
    let row = appointments::find(&state.db, &path)
        .await?
        .ok_or(ApiError::NotFound("appointment"))?;
    Ok(HttpResponse::Ok().json(row))
}

#[derive(Deserialize)]
struct StatusUpdate {
    status: String,
}

/// Moving into `confirmed` or `cancelled` also notifies the client; the
/// outcome is returned alongside the updated row. Re-saving the current
/// status sends nothing.
async fn update_status(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    body: web::Json<StatusUpdate>,
) -> ApiResult<HttpResponse> {
    let status: AppointmentStatus = body.status.parse().map_err(ApiError::Validation)?;
    let settings = Settings::load(&state.db).await?;
    let previous = appointments::find(&state.db, &path)
        .await?
        .ok_or(ApiError::NotFound("appointment"))?;
    let row = appointments::update_status(&state.db, &path, status)
        .await?
        .ok_or(ApiError::NotFound("appointment"))?;

    log_activity(
        &state.db,
        "appointment_status",
        &format!("Appointment for {} marked {status}.", row.name),
        Some(&auth.id),
        Some(&row.id),
    )
    .await;
    state.publish(ServerEvent::from_row("appointment_updated", row.clone()));

    let changed = previous.status != status.as_str();
    let kind = match status {
        _ if !changed => None,
        AppointmentStatus::Confirmed => Some(NotificationKind::AppointmentConfirmation),
        AppointmentStatus::Cancelled => Some(NotificationKind::AppointmentCancelled),
        AppointmentStatus::Pending | AppointmentStatus::Completed => None,
    };
    let report = match kind {
        Some(kind) => Some(
            state
                .dispatcher(&settings)
                .dispatch(kind, &appointments::recipient(&row), &appointments::details(&row), Utc::now())
                .await,
        ),
        None => None,
    };

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "appointment": row,
        "notifications": report.as_ref().map(|report| report.flags()),
        "details": report,
    })))
}

async fn send_reminder(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let settings = Settings::load(&state.db).await?;
    let row = appointments::find(&state.db, &path)
        .await?
        .ok_or(ApiError::NotFound("appointment"))?;
    let report = state
        .dispatcher(&settings)
        .dispatch(
            NotificationKind::AppointmentReminder,
            &appointments::recipient(&row),
            &appointments::details(&row),
            Utc::now(),
        )
        .await;
    log_activity(
        &state.db,
        "appointment_reminder",
        &format!("Reminder sent to {}.", row.name),
        Some(&auth.id),
        Some(&row.id),
    )
    .await;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "results": report.flags(),
        "details": report,
    })))
}

async fn delete_appointment(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let id = path.into_inner();
    let found = appointments::delete(&state.db, &id).await?;
    if found {
        log_activity(&state.db, "appointment_deleted", "Appointment deleted.", Some(&auth.id), Some(&id)).await;
        state.publish(ServerEvent::removed(&id));
    }
    deleted(found, "appointment")
}

async fn get_settings(state: web::Data<AppState>) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(Settings::load(&state.db).await?))
}

async fn save_settings(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    body: web::Json<Settings>,
) -> ApiResult<HttpResponse> {
    let settings = body.into_inner();
    settings.save(&state.db, Some(&auth.id)).await?;
    log_activity(&state.db, "settings_updated", "Settings updated.", Some(&auth.id), None).await;
    Ok(HttpResponse::Ok().json(settings))
}

async fn list_services(state: web::Data<AppState>) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(services::list_all(&state.db).await?))
}

async fn create_service(state: web::Data<AppState>, body: web::Json<ServiceInput>) -> ApiResult<HttpResponse> {
    body.validate()?;
    let row = services::create(&state.db, &body).await?;
    Ok(HttpResponse::Created().json(row))
}

async fn update_service(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<ServiceInput>,
) -> ApiResult<HttpResponse> {
    body.validate()?;
    let row = services::update(&state.db, &path, &body)
        .await?
        .ok_or(ApiError::NotFound("service"))?;
    Ok(HttpResponse::Ok().json(row))
}

#[derive(Deserialize)]
struct Toggle {
    is_active: bool,
}

async fn toggle_service(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<Toggle>,
) -> ApiResult<HttpResponse> {
    let found = services::set_active(&state.db, &path, body.is_active).await?;
    if !found {
        return Err(ApiError::NotFound("service"));
    }
    Ok(HttpResponse::Ok().json(json!({ "success": true, "is_active": body.is_active })))
}

async fn delete_service(state: web::Data<AppState>, path: web::Path<String>) -> ApiResult<HttpResponse> {
    deleted(services::delete(&state.db, &path).await?, "service")
}

async fn list_quiz_types(state: web::Data<AppState>) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(quiz::list_types(&state.db, false).await?))
}

async fn create_quiz_type(state: web::Data<AppState>, body: web::Json<QuizTypeInput>) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Created().json(quiz::create_type(&state.db, &body).await?))
}

async fn update_quiz_type(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<QuizTypeInput>,
) -> ApiResult<HttpResponse> {
    let row = quiz::update_type(&state.db, &path, &body)
        .await?
        .ok_or(ApiError::NotFound("quiz type"))?;
    Ok(HttpResponse::Ok().json(row))
}

async fn delete_quiz_type(state: web::Data<AppState>, path: web::Path<String>) -> ApiResult<HttpResponse> {
    deleted(quiz::delete_type(&state.db, &path).await?, "quiz type")
}

async fn list_questions(state: web::Data<AppState>, path: web::Path<String>) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(quiz::list_questions(&state.db, &path, false).await?))
}

async fn create_question(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<QuestionInput>,
) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Created().json(quiz::create_question(&state.db, &path, &body).await?))
}

#[derive(Deserialize)]
struct QuestionOrder {
    ids: Vec<String>,
}

async fn reorder_questions(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<QuestionOrder>,
) -> ApiResult<HttpResponse> {
    quiz::reorder_questions(&state.db, &path, &body.ids).await?;
    Ok(HttpResponse::Ok().json(quiz::list_questions(&state.db, &path, false).await?))
}

async fn update_question(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<QuestionInput>,
) -> ApiResult<HttpResponse> {
    let row = quiz::update_question(&state.db, &path, &body)
        .await?
        .ok_or(ApiError::NotFound("question"))?;
    Ok(HttpResponse::Ok().json(row))
}

async fn delete_question(state: web::Data<AppState>, path: web::Path<String>) -> ApiResult<HttpResponse> {
    deleted(quiz::delete_question(&state.db, &path).await?, "question")
}

async fn list_responses(state: web::Data<AppState>, path: web::Path<String>) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(quiz::list_responses(&state.db, &path).await?))
}

async fn delete_response(state: web::Data<AppState>, path: web::Path<String>) -> ApiResult<HttpResponse> {
    deleted(quiz::delete_response(&state.db, &path).await?, "quiz response")
}

#[derive(Deserialize)]
struct FormFilter {
    form_type: Option<String>,
}

async fn list_forms(state: web::Data<AppState>, query: web::Query<FormFilter>) -> ApiResult<HttpResponse> {
    let form_type = query.form_type.as_deref().map(str::trim).filter(|t| !t.is_empty());
    Ok(HttpResponse::Ok().json(forms::list(&state.db, form_type).await?))
}

async fn delete_form(state: web::Data<AppState>, path: web::Path<String>) -> ApiResult<HttpResponse> {
    deleted(forms::delete(&state.db, &path).await?, "form submission")
}

async fn list_cms(state: web::Data<AppState>) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(cms::list_blocks(&state.db).await?))
}

async fn get_cms(state: web::Data<AppState>, path: web::Path<String>) -> ApiResult<HttpResponse> {
    let block = cms::get_block(&state.db, &path)
        .await?
        .ok_or(ApiError::NotFound("content block"))?;
    Ok(HttpResponse::Ok().json(block))
}

/// The settings record goes through `/settings` so it is always parsed
/// before it is stored.
async fn save_cms(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    body: web::Json<Value>,
) -> ApiResult<HttpResponse> {
    let key = path.into_inner();
    if key == SETTINGS_KEY {
        return Err(ApiError::validation("settings are edited through /admin/api/settings"));
    }
    cms::upsert_block(&state.db, &key, &body, Some(&auth.id)).await?;
    log_activity(&state.db, "cms_updated", &format!("Content block '{key}' updated."), Some(&auth.id), None).await;
    let block = cms::get_block(&state.db, &key)
        .await?
        .ok_or(ApiError::NotFound("content block"))?;
    Ok(HttpResponse::Ok().json(block))
}

async fn delete_cms(state: web::Data<AppState>, path: web::Path<String>) -> ApiResult<HttpResponse> {
    if path.as_str() == SETTINGS_KEY {
        return Err(ApiError::validation("the settings block cannot be deleted"));
    }
    deleted(cms::delete_block(&state.db, &path).await?, "content block")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        appointments::NewAppointment,
        auth::hash_password,
        testing::{harness, Harness},
    };
    use actix_web::{cookie::Cookie, http::{header, StatusCode}, test, App};
    use base64::Engine;

    async fn with_admin() -> Harness {
        let h = harness().await;
        sqlx::query(
            r#"INSERT INTO users (id, username, display_name, role, password_hash, active, created_at)
               VALUES ('admin-1', 'admin', 'Practice Admin', 'admin', ?, 1, '2026-10-17T00:00:00Z')"#,
        )
        .bind(hash_password("pw").unwrap())
        .execute(&h.state.db)
        .await
        .unwrap();
        h
    }

    fn basic(user: &str, password: &str) -> (header::HeaderName, String) {
        let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{user}:{password}"));
        (header::AUTHORIZATION, format!("Basic {encoded}"))
    }

    macro_rules! app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($state.clone()))
                    .configure(configure),
            )
            .await
        };
    }

    fn booking() -> NewAppointment {
        NewAppointment {
            name: "Ayşe".into(),
            email: Some("ayse@example.com".into()),
            phone: "5551234567".into(),
            date: "2026-10-19".into(),
            time: "09:30".into(),
            service: None,
            message: None,
        }
    }

    #[actix_web::test]
    async fn requests_need_valid_credentials() {
        let h = with_admin().await;
        let app = app!(h.state);

        let req = test::TestRequest::get().uri("/admin/api/dashboard").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::get()
            .uri("/admin/api/dashboard")
            .insert_header(basic("admin", "wrong"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::get()
            .uri("/admin/api/dashboard")
            .insert_header(basic("admin", "pw"))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["admin"], "Practice Admin");
        assert_eq!(body["counts"]["pending"], 0);
    }

    #[actix_web::test]
    async fn logout_cookie_blocks_replayed_credentials() {
        let h = with_admin().await;
        let app = app!(h.state);
        let req = test::TestRequest::get()
            .uri("/admin/api/dashboard")
            .insert_header(basic("admin", "pw"))
            .cookie(Cookie::new("practice_logged_out", "1"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn cancelling_notifies_and_broadcasts() {
        let h = with_admin().await;
        let settings = Settings {
            sms_enabled: true,
            ..Settings::default()
        };
        settings.save(&h.state.db, None).await.unwrap();
        let row = appointments::create(&h.state.db, &booking(), Utc::now()).await.unwrap();
        let mut events = h.state.events.subscribe();
        let app = app!(h.state);

        let req = test::TestRequest::put()
            .uri(&format!("/admin/api/appointments/{}/status", row.id))
            .insert_header(basic("admin", "pw"))
            .set_json(json!({ "status": "cancelled" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["appointment"]["status"], "cancelled");
        assert_eq!(body["notifications"], json!({ "email": false, "sms": true }));

        let (_, message) = h.sms.sent().pop().unwrap();
        assert!(message.contains("iptal"));
        assert_eq!(events.try_recv().unwrap().kind, "appointment_updated");

        let req = test::TestRequest::put()
            .uri(&format!("/admin/api/appointments/{}/status", row.id))
            .insert_header(basic("admin", "pw"))
            .set_json(json!({ "status": "archived" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn repeating_the_current_status_does_not_notify_again() {
        let h = with_admin().await;
        let settings = Settings {
            sms_enabled: true,
            ..Settings::default()
        };
        settings.save(&h.state.db, None).await.unwrap();
        let row = appointments::create(&h.state.db, &booking(), Utc::now()).await.unwrap();
        let app = app!(h.state);

        for expected_sms in [1, 1] {
            let req = test::TestRequest::put()
                .uri(&format!("/admin/api/appointments/{}/status", row.id))
                .insert_header(basic("admin", "pw"))
                .set_json(json!({ "status": "confirmed" }))
                .to_request();
            let body: Value = test::call_and_read_body_json(&app, req).await;
            assert_eq!(body["appointment"]["status"], "confirmed");
            assert_eq!(h.sms.sent().len(), expected_sms);
        }
    }

    #[actix_web::test]
    async fn completing_sends_nothing() {
        let h = with_admin().await;
        let settings = Settings {
            sms_enabled: true,
            email_enabled: true,
            ..Settings::default()
        };
        settings.save(&h.state.db, None).await.unwrap();
        let row = appointments::create(&h.state.db, &booking(), Utc::now()).await.unwrap();
        let app = app!(h.state);

        let req = test::TestRequest::put()
            .uri(&format!("/admin/api/appointments/{}/status", row.id))
            .insert_header(basic("admin", "pw"))
            .set_json(json!({ "status": "completed" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["notifications"], Value::Null);
        assert!(h.sms.sent().is_empty());
        assert!(h.email.sent().is_empty());
    }

    #[actix_web::test]
    async fn settings_round_trip_and_stay_protected_in_cms() {
        let h = with_admin().await;
        let app = app!(h.state);

        let mut settings = Settings::default();
        settings.holidays.push("2026-10-29".into());
        settings.netgsm_msg_header = "PSIKOLOG".into();
        let req = test::TestRequest::put()
            .uri("/admin/api/settings")
            .insert_header(basic("admin", "pw"))
            .set_json(&settings)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
        assert_eq!(Settings::load(&h.state.db).await.unwrap(), settings);

        let req = test::TestRequest::delete()
            .uri("/admin/api/cms/settings")
            .insert_header(basic("admin", "pw"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::put()
            .uri("/admin/api/cms/settings")
            .insert_header(basic("admin", "pw"))
            .set_json(json!({ "smsEnabled": "yes" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
        assert_eq!(Settings::load(&h.state.db).await.unwrap(), settings);
    }

    #[actix_web::test]
    async fn content_crud_through_the_api() {
        let h = with_admin().await;
        let app = app!(h.state);

        let req = test::TestRequest::post()
            .uri("/admin/api/services")
            .insert_header(basic("admin", "pw"))
            .set_json(json!({ "title": "Çift Terapisi" }))
            .to_request();
        let service: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(service["is_active"], true);

        let req = test::TestRequest::post()
            .uri(&format!("/admin/api/services/{}/toggle", service["id"].as_str().unwrap()))
            .insert_header(basic("admin", "pw"))
            .set_json(json!({ "is_active": false }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
        assert!(services::list_active(&h.state.db).await.unwrap().is_empty());

        let req = test::TestRequest::put()
            .uri("/admin/api/cms/about")
            .insert_header(basic("admin", "pw"))
            .set_json(json!({ "title": "Hakkımda" }))
            .to_request();
        let block: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(block["data"]["title"], "Hakkımda");

        let req = test::TestRequest::delete()
            .uri("/admin/api/forms/missing")
            .insert_header(basic("admin", "pw"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }
}
