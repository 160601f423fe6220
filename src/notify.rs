//! Best-effort appointment notifications over email and SMS.
//!
//! Each channel is tried independently and reports its own outcome. Nothing
//! here returns an error to the caller or retries; a failed channel is logged
//! and recorded in the [`DispatchReport`].

use askama::Template;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    calendar::{ics_attachment, CalendarEvent},
    email::{sender, EmailGateway, OutgoingEmail},
    settings::Settings,
    slots::{parse_date, parse_time},
    sms::{mask_phone, strip_diacritics, SmsCredentials, SmsGateway},
    templates::NotificationEmail,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    AppointmentConfirmation,
    AppointmentReminder,
    AppointmentCancelled,
}

impl NotificationKind {
    pub fn subject(self) -> &'static str {
        match self {
            NotificationKind::AppointmentConfirmation => "Randevunuz Onaylandı",
            NotificationKind::AppointmentReminder => "Randevu Hatırlatması",
            NotificationKind::AppointmentCancelled => "Randevunuz İptal Edildi",
        }
    }

    fn email_body(self, recipient: &Recipient, details: &AppointmentDetails) -> NotificationEmail {
        let (accent, heading, intro, outro) = match self {
            NotificationKind::AppointmentConfirmation => (
                "#0f172a",
                "Randevunuz Onaylandı",
                "Randevunuz başarıyla oluşturuldu.",
                Some("Görüşmek üzere!"),
            ),
            NotificationKind::AppointmentReminder => (
                "#0f172a",
                "Randevu Hatırlatması",
                "Yaklaşan randevunuzu hatırlatmak isteriz.",
                None,
            ),
            NotificationKind::AppointmentCancelled => (
                "#dc2626",
                "Randevu İptal Edildi",
                "Aşağıdaki randevunuz iptal edilmiştir.",
                Some("Yeni randevu oluşturmak için sitemizi ziyaret edebilirsiniz."),
            ),
        };
        NotificationEmail {
            accent,
            heading,
            name: recipient.name.clone(),
            intro,
            date: details.date.clone(),
            time: details.time.clone(),
            service: details.service.clone(),
            outro,
        }
    }

    pub fn sms_text(self, recipient: &Recipient, details: &AppointmentDetails) -> String {
        let name = &recipient.name;
        let AppointmentDetails { date, time, .. } = details;
        let text = match self {
            NotificationKind::AppointmentConfirmation => {
                format!("Sayin {name}, {date} {time} tarihli randevunuz onaylandi.")
            }
            NotificationKind::AppointmentReminder => format!(
                "Sayin {name}, {date} {time} tarihli randevunuzu hatirlatiriz. Gorusmek uzere!"
            ),
            NotificationKind::AppointmentCancelled => {
                format!("Sayin {name}, {date} {time} tarihli randevunuz iptal edilmistir.")
            }
        };
        strip_diacritics(&text)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Recipient {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppointmentDetails {
    pub date: String,
    pub time: String,
    #[serde(default)]
    pub service: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ChannelOutcome {
    Delivered,
    Failed(String),
    NotAttempted,
}

impl ChannelOutcome {
    pub fn delivered(&self) -> bool {
        matches!(self, ChannelOutcome::Delivered)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub email: ChannelOutcome,
    pub sms: ChannelOutcome,
}

/// The boolean view of a [`DispatchReport`]: which channels delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeliveryFlags {
    pub email: bool,
    pub sms: bool,
}

impl DispatchReport {
    pub fn flags(&self) -> DeliveryFlags {
        DeliveryFlags {
            email: self.email.delivered(),
            sms: self.sms.delivered(),
        }
    }
}

pub struct Dispatcher<'a> {
    settings: &'a Settings,
    email: &'a dyn EmailGateway,
    sms: &'a dyn SmsGateway,
}

impl<'a> Dispatcher<'a> {
    pub fn new(settings: &'a Settings, email: &'a dyn EmailGateway, sms: &'a dyn SmsGateway) -> Self {
        Self { settings, email, sms }
    }

    pub async fn dispatch(
        &self,
        kind: NotificationKind,
        recipient: &Recipient,
        details: &AppointmentDetails,
        now: DateTime<Utc>,
    ) -> DispatchReport {
        let (email, sms) = tokio::join!(
            self.send_email(kind, recipient, details, now),
            self.send_sms(kind, recipient, details)
        );
        DispatchReport { email, sms }
    }

    async fn send_email(
        &self,
        kind: NotificationKind,
        recipient: &Recipient,
        details: &AppointmentDetails,
        now: DateTime<Utc>,
    ) -> ChannelOutcome {
        let Some(address) = non_blank(recipient.email.as_deref()) else {
            return ChannelOutcome::NotAttempted;
        };
        if !self.settings.email_enabled {
            return ChannelOutcome::NotAttempted;
        }
        if self.settings.email_provider != "resend" {
            let reason = format!("{} transport not configured", self.settings.email_provider);
            log::warn!("Email notification skipped: {reason}");
            return ChannelOutcome::Failed(reason);
        }

        let html = match kind.email_body(recipient, details).render() {
            Ok(html) => html,
            Err(err) => {
                log::error!("Email template render failed: {err}");
                return ChannelOutcome::Failed(err.to_string());
            }
        };

        let mut attachments = Vec::new();
        if kind == NotificationKind::AppointmentConfirmation {
            if let Some(event) = self.calendar_event(recipient, details, address) {
                attachments.push(ics_attachment(&event, now));
            }
        }

        let message = OutgoingEmail {
            from: sender(&self.settings.email_from_name, &self.settings.email_from),
            to: address.to_string(),
            subject: kind.subject().to_string(),
            html,
            attachments,
        };
        match self.email.send(&self.settings.resend_api_key, &message).await {
            Ok(()) => ChannelOutcome::Delivered,
            Err(err) => {
                log::warn!("Email notification failed: {err}");
                ChannelOutcome::Failed(err.to_string())
            }
        }
    }

    async fn send_sms(
        &self,
        kind: NotificationKind,
        recipient: &Recipient,
        details: &AppointmentDetails,
    ) -> ChannelOutcome {
        let Some(phone) = non_blank(recipient.phone.as_deref()) else {
            return ChannelOutcome::NotAttempted;
        };
        if !self.settings.sms_enabled {
            return ChannelOutcome::NotAttempted;
        }
        if self.settings.sms_provider != "netgsm" {
            let reason = format!("{} gateway not supported", self.settings.sms_provider);
            log::warn!("SMS notification skipped: {reason}");
            return ChannelOutcome::Failed(reason);
        }

        let credentials = SmsCredentials::from_settings(self.settings);
        match self
            .sms
            .send(&credentials, phone, &kind.sms_text(recipient, details))
            .await
        {
            Ok(()) => ChannelOutcome::Delivered,
            Err(err) => {
                log::warn!("SMS notification to {} failed: {err}", mask_phone(phone));
                ChannelOutcome::Failed(err.to_string())
            }
        }
    }

    fn calendar_event(
        &self,
        recipient: &Recipient,
        details: &AppointmentDetails,
        address: &str,
    ) -> Option<CalendarEvent> {
        let start = parse_date(&details.date)?.and_time(parse_time(&details.time)?);
        let title = if details.service.trim().is_empty() {
            "Randevu".to_string()
        } else {
            format!("Randevu: {}", details.service.trim())
        };
        Some(CalendarEvent {
            uid: format!("{}@{}", uuid::Uuid::new_v4(), uid_domain(&self.settings.site_url)),
            title,
            description: format!(
                "Danışan: {}\nTarih: {}\nSaat: {}",
                recipient.name, details.date, details.time
            ),
            location: None,
            start,
            organizer_email: self.settings.admin_email.clone(),
            attendee_email: address.to_string(),
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn uid_domain(site_url: &str) -> &str {
    let host = site_url
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .split('/')
        .next()
        .unwrap_or_default();
    if host.is_empty() {
        "randevu.local"
    } else {
        host
    }
}
