mod appointments;
mod auth;
mod calendar;
mod cms;
mod config;
mod db;
mod email;
mod error;
mod forms;
mod models;
mod notify;
mod otp;
mod quiz;
mod recaptcha;
mod routes;
mod services;
mod settings;
mod slots;
mod sms;
mod state;
mod templates;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use actix_web::{middleware, web, App, HttpServer};
use tokio::sync::broadcast;

use crate::{
    config::AppConfig, email::ResendClient, recaptcha::RecaptchaClient, sms::NetgsmClient,
    state::AppState,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if let Err(err) = run().await {
        eprintln!("Startup error: {err}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .init();

    let config = AppConfig::from_env();
    db::ensure_sqlite_dir(&config.database_url)?;
    let pool = db::connect(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    db::seed_defaults(&pool, &config).await?;

    let http = config.http_client()?;
    let (events, _) = broadcast::channel(64);
    let state = AppState {
        db: pool,
        events,
        sms: Arc::new(NetgsmClient::new(http.clone(), config.netgsm_url.clone())),
        email: Arc::new(ResendClient::new(http.clone(), config.resend_url.clone())),
        bot_score: Arc::new(RecaptchaClient::new(http, config.recaptcha_url.clone())),
    };

    let address = format!("0.0.0.0:{}", config.port);
    log::info!("Starting practice site on http://{address}");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(middleware::Logger::default())
            .configure(routes::public::configure)
            .configure(routes::booking::configure)
            .configure(routes::admin::configure)
            .configure(routes::events::configure)
    })
    .bind(address)?
    .run()
    .await?;

    Ok(())
}
