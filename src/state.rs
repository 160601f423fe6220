use std::sync::Arc;

use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::broadcast;

use crate::{
    email::EmailGateway, models::AppointmentRow, notify::Dispatcher, recaptcha::BotScoreApi,
    settings::Settings, sms::SmsGateway,
};

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub events: broadcast::Sender<ServerEvent>,
    pub sms: Arc<dyn SmsGateway>,
    pub email: Arc<dyn EmailGateway>,
    pub bot_score: Arc<dyn BotScoreApi>,
}

impl AppState {
    pub fn dispatcher<'a>(&'a self, settings: &'a Settings) -> Dispatcher<'a> {
        Dispatcher::new(settings, self.email.as_ref(), self.sms.as_ref())
    }

    pub fn publish(&self, event: ServerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ServerEvent {
    pub kind: String,
    pub appointment_id: Option<String>,
    pub status: Option<String>,
    pub name: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub service: Option<String>,
}

impl ServerEvent {
    pub fn from_row(kind: &str, row: AppointmentRow) -> Self {
        Self {
            kind: kind.to_string(),
            appointment_id: Some(row.id),
            status: Some(row.status),
            name: Some(row.name),
            date: Some(row.date),
            time: Some(row.time),
            service: row.service,
        }
    }

    pub fn removed(appointment_id: &str) -> Self {
        Self {
            kind: "appointment_deleted".to_string(),
            appointment_id: Some(appointment_id.to_string()),
            status: None,
            name: None,
            date: None,
            time: None,
            service: None,
        }
    }
}
