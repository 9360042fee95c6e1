use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    dao::models::{UserId, WindowKind},
    dto::{format_day, format_timestamp},
    services::leaderboard_service::UserStats,
};

/// A user's figures in the current period of one window.
#[derive(Debug, Serialize, ToSchema)]
pub struct PeriodStats {
    /// Window of the row.
    pub window: WindowKind,
    /// First day of the current period.
    pub period_start: String,
    /// Points in the period.
    pub score: u32,
    /// Answers given in the period.
    pub answered: u32,
    /// Correct answers in the period.
    pub correct: u32,
}

/// Response of `GET /users/{id}/stats`.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserStatsResponse {
    /// Chat user id.
    pub user_id: UserId,
    /// Latest display name.
    pub display_name: String,
    /// Lifetime score, never below zero.
    pub total_score: u32,
    /// Lifetime answers.
    pub answered: u32,
    /// Lifetime correct answers.
    pub correct: u32,
    /// Percentage of correct answers.
    pub accuracy: f64,
    /// First answer.
    pub registered_at: String,
    /// Latest answer.
    pub last_activity: String,
    /// One row per window; zeros when the user has not answered in the period.
    pub current: Vec<PeriodStats>,
}

impl UserStatsResponse {
    /// Build the response, filling windows without an entry with zeros as of `now`.
    pub fn new(stats: UserStats, now: time::OffsetDateTime) -> Self {
        let current = stats
            .current
            .into_iter()
            .map(|(window, entry)| match entry {
                Some(entry) => PeriodStats {
                    window,
                    period_start: format_day(entry.period_start),
                    score: entry.score,
                    answered: entry.answered,
                    correct: entry.correct,
                },
                None => PeriodStats {
                    window,
                    period_start: format_day(window.period_start(now)),
                    score: 0,
                    answered: 0,
                    correct: 0,
                },
            })
            .collect();

        Self {
            user_id: stats.user.id,
            display_name: stats.user.display_name,
            total_score: stats.user.total_score,
            answered: stats.user.answered,
            correct: stats.user.correct,
            accuracy: stats.accuracy,
            registered_at: format_timestamp(stats.user.registered_at),
            last_activity: format_timestamp(stats.user.last_activity),
            current,
        }
    }
}
