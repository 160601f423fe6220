use actix_web::{http::StatusCode, HttpResponse};
use askama::Template;

#[derive(Template)]
#[template(path = "notification_email.html")]
pub struct NotificationEmail {
    pub accent: &'static str,
    pub heading: &'static str,
    pub name: String,
    pub intro: &'static str,
    pub date: String,
    pub time: String,
    pub service: String,
    pub outro: Option<&'static str>,
}

#[derive(Template)]
#[template(path = "logged_out.html")]
pub struct LoggedOutPage {
    pub login_url: String,
}

pub fn render<T: Template>(template: T, status: StatusCode) -> HttpResponse {
    match template.render() {
        Ok(body) => HttpResponse::build(status)
            .content_type("text/html; charset=utf-8")
            .body(body),
        Err(err) => {
            log::error!("Template render error: {err}");
            HttpResponse::InternalServerError().finish()
        }
    }
}
