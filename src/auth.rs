use actix_web::{
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    error::ErrorUnauthorized,
    http::{header, StatusCode},
    middleware::Next,
    web, Error, HttpMessage, HttpRequest,
};
use actix_web::cookie::{Cookie, SameSite, time::Duration};
use actix_web_httpauth::extractors::basic::BasicAuth;
use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand_core::OsRng;
use uuid::Uuid;

use crate::{
    models::{UserRow, ROLE_ADMIN},
    state::AppState,
    templates::{render, LoggedOutPage},
};

pub const AUTH_REALM: &str = "Practice Admin";
const LOGOUT_COOKIE: &str = "practice_logged_out";

#[derive(Clone, Debug)]
pub struct AuthUser {
    pub id: String,
    pub display_name: String,
    pub role: String,
}

pub fn hash_password(password: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(hash) => Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok(),
        Err(_) => false,
    }
}

pub async fn authenticate_credentials(
    state: &AppState,
    username: &str,
    password: &str,
) -> Option<AuthUser> {
    let user = sqlx::query_as::<_, UserRow>(
        r#"SELECT id, username, display_name, role, password_hash, active, created_at
           FROM users
           WHERE username = ? AND active = 1
           LIMIT 1"#,
    )
    .bind(username)
    .fetch_optional(&state.db)
    .await
    .map_err(|err| log::error!("User lookup failed: {err}"))
    .ok()??;

    if !verify_password(password, &user.password_hash) {
        return None;
    }

    Some(AuthUser {
        id: user.id,
        display_name: user.display_name,
        role: user.role,
    })
}

pub async fn admin_validator(
    req: ServiceRequest,
    credentials: BasicAuth,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    let Some(state) = req.app_data::<web::Data<AppState>>().cloned() else {
        return Err((ErrorUnauthorized("Unauthorized"), req));
    };
    let password = credentials.password().unwrap_or_default();
    match authenticate_credentials(&state, credentials.user_id(), password).await {
        Some(user) if user.role == ROLE_ADMIN => {
            req.extensions_mut().insert(user);
            Ok(req)
        }
        Some(_) => Err((ErrorUnauthorized("Admin access required"), req)),
        None => Err((ErrorUnauthorized("Unauthorized"), req)),
    }
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn cookie(req: &HttpRequest, value: &'static str, max_age: Duration) -> Cookie<'static> {
    let mut builder = Cookie::build(LOGOUT_COOKIE, value)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(max_age);
    if req.connection_info().scheme() == "https" {
        builder = builder.secure(true);
    }
    builder.finish()
}

pub fn logout_cookie(req: &HttpRequest) -> Cookie<'static> {
    cookie(req, "1", Duration::days(365))
}

pub fn clear_logout_cookie(req: &HttpRequest) -> Cookie<'static> {
    cookie(req, "", Duration::seconds(0))
}

pub fn is_logged_out(req: &HttpRequest) -> bool {
    req.cookie(LOGOUT_COOKIE).is_some()
}

/// Browsers keep replaying Basic credentials, so logging out sets a cookie
/// and this guard refuses admin requests until `/login` clears it.
pub async fn logout_guard<B>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<BoxBody>, Error>
where
    B: actix_web::body::MessageBody + 'static,
{
    if is_logged_out(req.request()) {
        let mut response = render(
            LoggedOutPage {
                login_url: "/login?next=/admin/api/dashboard".to_string(),
            },
            StatusCode::UNAUTHORIZED,
        );
        response.headers_mut().insert(
            header::CACHE_CONTROL,
            header::HeaderValue::from_static("no-store"),
        );
        return Ok(req.into_response(response));
    }

    let res = next.call(req).await?;
    Ok(res.map_into_boxed_body())
}
