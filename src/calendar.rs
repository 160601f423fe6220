use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};

use crate::email::Attachment;

pub const SESSION_MINUTES: i64 = 50;
pub const ALARM_MINUTES: i64 = 30;
pub const ICS_FILENAME: &str = "randevu.ics";

#[derive(Clone, Debug)]
pub struct CalendarEvent {
    pub uid: String,
    pub title: String,
    pub description: String,
    pub location: Option<String>,
    /// Wall-clock start at the practice. Written as a floating time.
    pub start: NaiveDateTime,
    pub organizer_email: String,
    pub attendee_email: String,
}

pub fn render_ics(event: &CalendarEvent, stamp: DateTime<Utc>) -> String {
    let end = event.start + Duration::minutes(SESSION_MINUTES);
    let mut lines = vec![
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        "PRODID:-//Practice Site//Randevu//TR".to_string(),
        "CALSCALE:GREGORIAN".to_string(),
        "METHOD:REQUEST".to_string(),
        "BEGIN:VEVENT".to_string(),
        format!("UID:{}", event.uid),
        format!("DTSTAMP:{}", stamp.format("%Y%m%dT%H%M%SZ")),
        format!("DTSTART:{}", event.start.format("%Y%m%dT%H%M%S")),
        format!("DTEND:{}", end.format("%Y%m%dT%H%M%S")),
        format!("SUMMARY:{}", escape_text(&event.title)),
        format!("DESCRIPTION:{}", escape_text(&event.description)),
    ];
    if let Some(location) = event.location.as_deref().filter(|value| !value.trim().is_empty()) {
        lines.push(format!("LOCATION:{}", escape_text(location)));
    }
    if !event.organizer_email.trim().is_empty() {
        lines.push(format!("ORGANIZER;CN=Admin:mailto:{}", event.organizer_email));
    }
    lines.extend([
        format!(
            "ATTENDEE;CN={0};RSVP=TRUE:mailto:{0}",
            event.attendee_email
        ),
        "STATUS:CONFIRMED".to_string(),
        "SEQUENCE:0".to_string(),
        "BEGIN:VALARM".to_string(),
        format!("TRIGGER:-PT{ALARM_MINUTES}M"),
        "ACTION:DISPLAY".to_string(),
        format!("DESCRIPTION:Randevunuz {ALARM_MINUTES} dakika sonra"),
        "END:VALARM".to_string(),
        "END:VEVENT".to_string(),
        "END:VCALENDAR".to_string(),
    ]);

    let mut body = lines.join("\r\n");
    body.push_str("\r\n");
    body
}

pub fn ics_attachment(event: &CalendarEvent, stamp: DateTime<Utc>) -> Attachment {
    Attachment {
        filename: ICS_FILENAME.to_string(),
        content: STANDARD.encode(render_ics(event, stamp)),
    }
}

fn escape_text(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace('\n', "\\n")
}
