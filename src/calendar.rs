//! UTC calendar arithmetic for leaderboard periods and ceremony schedules.

use time::{Date, Duration, OffsetDateTime, Time, UtcOffset, Weekday};

use crate::dao::models::WindowKind;

/// Start of the period of `window` that contains `now`.
pub fn period_start(window: WindowKind, now: OffsetDateTime) -> OffsetDateTime {
    let date = now.to_offset(UtcOffset::UTC).date();
    let start = match window {
        WindowKind::Daily => date,
        WindowKind::Weekly => week_start(date),
        WindowKind::Monthly => month_start(date),
    };
    midnight(start)
}

/// Monday of the ISO week containing `date`.
pub fn week_start(date: Date) -> Date {
    date - Duration::days(i64::from(date.weekday().number_days_from_monday()))
}

/// First day of the month containing `date`.
pub fn month_start(date: Date) -> Date {
    date - Duration::days(i64::from(date.day()) - 1)
}

/// Last calendar day of the month containing `date`.
pub fn month_end(date: Date) -> Date {
    // 32 days past the 1st always lands in the following month.
    let next_month = month_start(month_start(date) + Duration::days(32));
    next_month - Duration::days(1)
}

/// Whether `date` is the last calendar day of its month.
pub fn is_month_end(date: Date) -> bool {
    month_end(date) == date
}

/// Next instant strictly after `now` that falls on `weekday` at `at` (UTC).
pub fn next_weekly(now: OffsetDateTime, weekday: Weekday, at: Time) -> OffsetDateTime {
    let now = now.to_offset(UtcOffset::UTC);
    let today = now.date();
    let days_ahead = (i64::from(weekday.number_days_from_monday())
        - i64::from(today.weekday().number_days_from_monday()))
    .rem_euclid(7);

    let candidate = (today + Duration::days(days_ahead)).with_time(at).assume_utc();
    if candidate > now {
        candidate
    } else {
        candidate + Duration::weeks(1)
    }
}

/// Latest instant at or before `now` that falls on `weekday` at `at` (UTC).
pub fn previous_weekly(now: OffsetDateTime, weekday: Weekday, at: Time) -> OffsetDateTime {
    next_weekly(now, weekday, at) - Duration::weeks(1)
}

/// Start of the week closed by a weekly ceremony scheduled on `weekday` at `at`, run at `now`.
///
/// A slot in the first half of the week (before Thursday noon) belongs to the week that just
/// ended; a later slot closes the week in progress.
pub fn closing_week_start(now: OffsetDateTime, weekday: Weekday, at: Time) -> OffsetDateTime {
    let slot = Duration::days(i64::from(weekday.number_days_from_monday())) + (at - Time::MIDNIGHT);
    let current = period_start(WindowKind::Weekly, now);
    if slot < Duration::hours(84) {
        current - Duration::weeks(1)
    } else {
        current
    }
}

/// Next instant strictly after `now` that falls on the last day of a month at `at` (UTC).
pub fn next_month_end(now: OffsetDateTime, at: Time) -> OffsetDateTime {
    let now = now.to_offset(UtcOffset::UTC);
    let candidate = month_end(now.date()).with_time(at).assume_utc();
    if candidate > now {
        return candidate;
    }

    let following = month_end(month_end(now.date()) + Duration::days(1));
    following.with_time(at).assume_utc()
}

/// Latest instant at or before `now` that falls on the last day of a month at `at` (UTC).
pub fn previous_month_end(now: OffsetDateTime, at: Time) -> OffsetDateTime {
    let now = now.to_offset(UtcOffset::UTC);
    let today = now.date();
    let candidate = today.with_time(at).assume_utc();
    if is_month_end(today) && candidate <= now {
        return candidate;
    }
    (month_start(today) - Duration::days(1)).with_time(at).assume_utc()
}

fn midnight(date: Date) -> OffsetDateTime {
    date.with_time(Time::MIDNIGHT).assume_utc()
}
