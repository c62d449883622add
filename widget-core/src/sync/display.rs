//! Presentation strings derived from a voicemail record.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use shared_types::{DisplayFields, VoicemailRecord};

const CALLER_DISPLAY_MAX_CHARS: usize = 24;

pub fn derive(record: &VoicemailRecord, now: DateTime<Utc>) -> DisplayFields {
    DisplayFields {
        duration_label: duration_label(record.audio_recording_duration_seconds),
        date_label: date_label(record.created_date),
        relative_time: relative_time(record.created_date, now),
        caller_display: caller_display(&record.caller_address),
        phone_number: phone_number(&record.caller_address),
        menu_label: menu_label(record.read).to_string(),
        css_class: css_class(record.read).to_string(),
    }
}

pub fn duration_label(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

pub fn date_label(at: DateTime<Utc>) -> String {
    at.format("%b %-d, %Y %-I:%M %p").to_string()
}

pub fn relative_time(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(at);
    let minutes = elapsed.num_minutes();
    let hours = elapsed.num_hours();
    let days = elapsed.num_days();

    if elapsed.num_seconds() < 60 {
        "just now".to_string()
    } else if minutes < 60 {
        plural(minutes, "minute")
    } else if hours < 24 {
        plural(hours, "hour")
    } else if days < 2 {
        "yesterday".to_string()
    } else if days < 30 {
        plural(days, "day")
    } else {
        date_label(at)
    }
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{n} {unit}s ago")
    }
}

/// Caller address without URI scheme or host, shortened for the card header.
pub fn caller_display(address: &str) -> String {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return "Unknown caller".to_string();
    }

    let without_scheme = ["tel:", "sip:", "sips:"]
        .iter()
        .find_map(|scheme| trimmed.strip_prefix(scheme))
        .unwrap_or(trimmed);
    let local = without_scheme
        .split_once('@')
        .map(|(user, _host)| user)
        .unwrap_or(without_scheme);

    if local.chars().count() > CALLER_DISPLAY_MAX_CHARS {
        let head: String = local.chars().take(CALLER_DISPLAY_MAX_CHARS - 1).collect();
        format!("{head}…")
    } else {
        local.to_string()
    }
}

fn phone_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\+?\d[\d\s().-]{5,}\d").expect("valid regex"))
}

/// First dialable number in the caller address, normalized to `+` and digits.
pub fn phone_number(address: &str) -> Option<String> {
    let found = phone_pattern().find(address)?;
    let normalized: String = found
        .as_str()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();
    let digits = normalized.chars().filter(char::is_ascii_digit).count();
    (digits >= 7).then_some(normalized)
}

pub fn menu_label(read: bool) -> &'static str {
    if read {
        "Mark as unread"
    } else {
        "Mark as read"
    }
}

pub fn css_class(read: bool) -> &'static str {
    if read {
        "voicemail read"
    } else {
        "voicemail unread"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_duration_label() {
        assert_eq!(duration_label(0), "0:00");
        assert_eq!(duration_label(65), "1:05");
        assert_eq!(duration_label(3600), "60:00");
    }

    #[test]
    fn test_date_label() {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 15, 4, 0).unwrap();
        assert_eq!(date_label(at), "Mar 5, 2024 3:04 PM");
    }

    #[test]
    fn test_relative_time_buckets() {
        let now = Utc.with_ymd_and_hms(2024, 3, 30, 12, 0, 0).unwrap();
        assert_eq!(relative_time(now - Duration::seconds(10), now), "just now");
        assert_eq!(relative_time(now - Duration::minutes(1), now), "1 minute ago");
        assert_eq!(relative_time(now - Duration::minutes(5), now), "5 minutes ago");
        assert_eq!(relative_time(now - Duration::hours(3), now), "3 hours ago");
        assert_eq!(relative_time(now - Duration::hours(30), now), "yesterday");
        assert_eq!(relative_time(now - Duration::days(4), now), "4 days ago");
        let old = now - Duration::days(45);
        assert_eq!(relative_time(old, now), date_label(old));
        // Clock skew: a record from the future is still "just now".
        assert_eq!(relative_time(now + Duration::minutes(2), now), "just now");
    }

    #[test]
    fn test_caller_display() {
        assert_eq!(caller_display("tel:+13175551234"), "+13175551234");
        assert_eq!(caller_display("sip:+13175551234@edge.example.com"), "+13175551234");
        assert_eq!(caller_display(""), "Unknown caller");
        let long = caller_display("sip:a-very-long-user-name-for-a-caller@host");
        assert_eq!(long.chars().count(), CALLER_DISPLAY_MAX_CHARS);
        assert!(long.ends_with('…'));
    }

    #[test]
    fn test_phone_number() {
        assert_eq!(phone_number("tel:+13175551234").as_deref(), Some("+13175551234"));
        assert_eq!(
            phone_number("Jane <sip:+1 (317) 555-1234@edge>").as_deref(),
            Some("+13175551234")
        );
        assert_eq!(phone_number("sip:agent@edge.example.com"), None);
        assert_eq!(phone_number("ext 12"), None);
    }

    #[test]
    fn test_read_dependent_labels() {
        assert_eq!(menu_label(false), "Mark as read");
        assert_eq!(menu_label(true), "Mark as unread");
        assert_eq!(css_class(false), "voicemail unread");
    }
}
