use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub mod admin;
/// Answer submission bodies.
pub mod answers;
/// Health payload.
pub mod health;
pub mod leaderboard;
/// User statistics payloads.
pub mod users;
pub mod validation;

/// RFC 3339 rendering used by every response timestamp.
pub fn format_timestamp(time: OffsetDateTime) -> String {
    time.format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}

/// `YYYY-MM-DD` rendering of a period start.
pub fn format_day(time: OffsetDateTime) -> String {
    time.date().to_string()
}
