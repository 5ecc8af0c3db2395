use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::constants::DEFAULT_TIMEZONE;

/// Resolve an IANA zone name, falling back to the plant's default zone
pub fn parse_timezone(name: &str) -> Tz {
    name.trim().parse::<Tz>().unwrap_or_else(|_| {
        tracing::warn!("⚠️ Unknown timezone '{}', using {}", name, DEFAULT_TIMEZONE);
        default_timezone()
    })
}

pub fn default_timezone() -> Tz {
    DEFAULT_TIMEZONE.parse().unwrap_or(chrono_tz::America::Chicago)
}

/// Current time in the display timezone
pub fn local_now(tz: Tz) -> DateTime<Tz> {
    Utc::now().with_timezone(&tz)
}

/// Render a stored UTC instant for spreadsheets and labels
pub fn format_local(at: DateTime<Utc>, tz: Tz) -> String {
    at.with_timezone(&tz).format("%Y-%m-%d %H:%M").to_string()
}
