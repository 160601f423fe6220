use chrono::{Datelike, Duration, NaiveDate, NaiveTime};

use crate::settings::{Settings, WEEKDAYS};

pub const SLOT_MINUTES: i64 = 30;

/// Bookable start times for `date`, as zero-padded `HH:MM` strings.
///
/// Holidays and disabled or unknown weekdays yield nothing. Slots run every
/// 30 minutes from the day's start up to, not including, its end. Existing
/// bookings are not taken into account.
pub fn generate_slots(date: NaiveDate, settings: &Settings) -> Vec<String> {
    let iso = date.format("%Y-%m-%d").to_string();
    if settings.is_holiday(&iso) {
        return Vec::new();
    }

    let weekday = WEEKDAYS[date.weekday().num_days_from_monday() as usize];
    let Some(day) = settings.working_hours.get(weekday) else {
        return Vec::new();
    };
    if !day.enabled {
        return Vec::new();
    }

    let (Some(start), Some(end)) = (parse_time(&day.start), parse_time(&day.end)) else {
        log::warn!("Working hours for {weekday} are malformed: {} - {}", day.start, day.end);
        return Vec::new();
    };

    let mut slots = Vec::new();
    let mut current = start;
    while current < end {
        slots.push(current.format("%H:%M").to_string());
        let (next, wrapped) = current.overflowing_add_signed(Duration::minutes(SLOT_MINUTES));
        if wrapped != 0 {
            break;
        }
        current = next;
    }
    slots
}

pub fn parse_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}
