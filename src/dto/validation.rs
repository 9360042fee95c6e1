//! Validation helpers for DTOs.

use time::{Date, format_description::FormatItem, macros::format_description};
use validator::ValidationError;

/// Longest display name accepted, in characters.
pub const MAX_DISPLAY_NAME_CHARS: usize = 64;

const DAY_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Validates that a display name fits on one line and within [`MAX_DISPLAY_NAME_CHARS`].
///
/// An empty name is accepted; the user then shows up as `User_<id>`.
///
/// # Examples
///
/// ```ignore
/// validate_display_name("Ada")        // Ok
/// validate_display_name("Ada\nLove")  // Err - control character
/// ```
pub fn validate_display_name(name: &str) -> Result<(), ValidationError> {
    let count = name.chars().count();
    if count > MAX_DISPLAY_NAME_CHARS {
        let mut err = ValidationError::new("display_name_length");
        err.message = Some(
            format!("Display name must be at most {MAX_DISPLAY_NAME_CHARS} characters (got {count})")
                .into(),
        );
        return Err(err);
    }

    if name.chars().any(char::is_control) {
        let mut err = ValidationError::new("display_name_format");
        err.message = Some("Display name must not contain control characters".into());
        return Err(err);
    }

    Ok(())
}

/// Validates a calendar day written as `YYYY-MM-DD`.
pub fn validate_day(day: &str) -> Result<(), ValidationError> {
    parse_day(day).map(|_| ()).ok_or_else(|| {
        let mut err = ValidationError::new("day_format");
        err.message = Some(format!("`{day}` is not a YYYY-MM-DD date").into());
        err
    })
}

/// Parse a `YYYY-MM-DD` day.
pub fn parse_day(day: &str) -> Option<Date> {
    Date::parse(day, DAY_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn test_validate_display_name_valid() {
        assert!(validate_display_name("Ada").is_ok());
        assert!(validate_display_name("").is_ok());
        assert!(validate_display_name("Élodie 🎲").is_ok());
    }

    #[test]
    fn test_validate_display_name_invalid() {
        assert!(validate_display_name(&"x".repeat(65)).is_err()); // too long
        assert!(validate_display_name("Ada\nLovelace").is_err()); // newline
        assert!(validate_display_name("tab\there").is_err());
    }

    #[test]
    fn test_parse_day() {
        assert_eq!(parse_day("2025-07-07"), Some(date!(2025 - 07 - 07)));
        assert!(parse_day("2025-02-30").is_none());
        assert!(parse_day("07/07/2025").is_none());
        assert!(validate_day("2025-7-7").is_err());
    }
}
