use actix_web::http::header::Header;
use actix_web::{http::header, web, HttpRequest, HttpResponse};
use actix_web_httpauth::headers::authorization::{Authorization, Basic};
use serde_json::json;

use crate::{
    auth::{authenticate_credentials, clear_logout_cookie, logout_cookie, AUTH_REALM},
    cms,
    error::{ApiError, ApiResult},
    forms::{self, SubmissionInput},
    quiz::{self, ResponseInput},
    services,
    settings::{Settings, SETTINGS_KEY},
    state::AppState,
};

const ADMIN_HOME: &str = "/admin/api/dashboard";

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource("/login").route(web::get().to(login)))
        .service(web::resource("/logout").route(web::get().to(logout)))
        .service(web::resource("/api/settings").route(web::get().to(public_settings)))
        .service(web::resource("/api/services").route(web::get().to(list_services)))
        .service(web::resource("/api/cms/{key}").route(web::get().to(cms_block)))
        .service(web::resource("/api/forms").route(web::post().to(submit_form)))
        .service(web::resource("/api/quiz").route(web::get().to(list_quiz_types)))
        .service(web::resource("/api/quiz/{id}/questions").route(web::get().to(list_quiz_questions)))
        .service(web::resource("/api/quiz/{id}/responses").route(web::post().to(submit_quiz_response)));
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("ok")
}

async fn logout(req: HttpRequest) -> HttpResponse {
    HttpResponse::SeeOther()
        .append_header((header::LOCATION, "/"))
        .cookie(logout_cookie(&req))
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .finish()
}

#[derive(serde::Deserialize)]
struct LoginQuery {
    next: Option<String>,
}

async fn login(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<LoginQuery>,
) -> HttpResponse {
    let credentials = match Authorization::<Basic>::parse(&req) {
        Ok(auth) => auth.into_scheme(),
        Err(_) => return auth_challenge(),
    };
    let password = credentials.password().unwrap_or_default();
    if authenticate_credentials(&state, credentials.user_id(), password)
        .await
        .is_none()
    {
        return auth_challenge();
    }

    let redirect = query
        .next
        .as_deref()
        .filter(|next| next.starts_with("/admin"))
        .unwrap_or(ADMIN_HOME);

    HttpResponse::SeeOther()
        .append_header((header::LOCATION, redirect))
        .cookie(clear_logout_cookie(&req))
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .finish()
}

fn auth_challenge() -> HttpResponse {
    HttpResponse::Unauthorized()
        .insert_header((header::WWW_AUTHENTICATE, format!("Basic realm=\"{AUTH_REALM}\"")))
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .finish()
}

/// Only the fields the booking page needs to gate its own UI. A storage
/// failure degrades to defaults rather than breaking the page.
async fn public_settings(state: web::Data<AppState>) -> HttpResponse {
    let settings = Settings::load(&state.db).await.unwrap_or_else(|err| {
        log::error!("Settings load failed, serving defaults: {err}");
        Settings::default()
    });
    HttpResponse::Ok().json(settings.public_view())
}

async fn list_services(state: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let rows = services::list_active(&state.db).await?;
    Ok(HttpResponse::Ok().json(rows))
}

async fn cms_block(state: web::Data<AppState>, path: web::Path<String>) -> ApiResult<HttpResponse> {
    let key = path.into_inner();
    if key == SETTINGS_KEY {
        return Err(ApiError::NotFound("content block"));
    }
    let block = cms::get_block(&state.db, &key)
        .await?
        .ok_or(ApiError::NotFound("content block"))?;
    Ok(HttpResponse::Ok().json(block))
}

async fn submit_form(
    state: web::Data<AppState>,
    body: web::Json<SubmissionInput>,
) -> ApiResult<HttpResponse> {
    let submission = forms::submit(&state.db, &body).await?;
    Ok(HttpResponse::Created().json(json!({ "success": true, "id": submission.id })))
}

async fn list_quiz_types(state: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let types = quiz::list_types(&state.db, true).await?;
    Ok(HttpResponse::Ok().json(types))
}

async fn list_quiz_questions(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let quiz_type_id = path.into_inner();
    match quiz::find_type(&state.db, &quiz_type_id).await? {
        Some(quiz_type) if quiz_type.is_active => {}
        _ => return Err(ApiError::NotFound("quiz type")),
    }
    let questions = quiz::list_questions(&state.db, &quiz_type_id, true).await?;
    Ok(HttpResponse::Ok().json(questions))
}

async fn submit_quiz_response(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<ResponseInput>,
) -> ApiResult<HttpResponse> {
    let response = quiz::submit_response(&state.db, &path, &body).await?;
    Ok(HttpResponse::Created().json(json!({ "success": true, "id": response.id })))
}
