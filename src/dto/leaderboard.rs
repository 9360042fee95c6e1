//! DTOs for the leaderboard routes.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    dao::models::{CeremonyEntity, StandingEntity, UserId, WindowKind},
    delivery::render,
    dto::{format_day, format_timestamp, validation::validate_day},
};

/// Rows returned when `n` is omitted.
pub const DEFAULT_TOP: usize = 10;

/// Query of `GET /leaderboard/{window}`.
#[derive(Debug, Deserialize, IntoParams, Validate)]
#[into_params(parameter_in = Query)]
pub struct TopQuery {
    /// Number of rows, 1 to 50.
    #[validate(range(min = 1, max = 50))]
    pub n: Option<usize>,
}

/// Query of `GET /leaderboard/{window}/history`.
#[derive(Debug, Deserialize, IntoParams, Validate)]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    /// Any day of the closed period, `YYYY-MM-DD`.
    #[validate(custom(function = "validate_day"))]
    pub period_start: String,
}

/// One ranked row.
#[derive(Debug, Serialize, ToSchema)]
pub struct StandingRow {
    /// 1-based position.
    pub rank: usize,
    /// Chat user id.
    pub user_id: UserId,
    /// Latest display name.
    pub display_name: String,
    /// Points in the period.
    pub score: u32,
    /// Answers given in the period.
    pub answered: u32,
    /// Correct answers in the period.
    pub correct: u32,
    /// Percentage of correct answers in the period.
    pub accuracy: f64,
    /// When the score was reached; earlier wins ties.
    pub reached_at: String,
}

impl StandingRow {
    /// Number a ranked list from 1.
    pub fn ranked(standings: &[StandingEntity]) -> Vec<Self> {
        standings
            .iter()
            .enumerate()
            .map(|(index, standing)| Self {
                rank: index + 1,
                user_id: standing.user_id,
                display_name: standing.display_name.clone(),
                score: standing.score,
                answered: standing.answered,
                correct: standing.correct,
                accuracy: render::accuracy(standing.correct, standing.answered),
                reached_at: format_timestamp(standing.reached_at),
            })
            .collect()
    }
}

/// Current-period ranking of one window.
#[derive(Debug, Serialize, ToSchema)]
pub struct LeaderboardResponse {
    /// Ranked window.
    pub window: WindowKind,
    /// First day of the period.
    pub period_start: String,
    /// Ranked rows, best first.
    pub standings: Vec<StandingRow>,
}

/// Standings archived when a period was closed.
#[derive(Debug, Serialize, ToSchema)]
pub struct HistoryResponse {
    /// Closed window.
    pub window: WindowKind,
    /// First day of the period.
    pub period_start: String,
    /// When the ceremony ran.
    pub closed_at: String,
    /// Standings at close, best first.
    pub standings: Vec<StandingRow>,
}

impl From<CeremonyEntity> for HistoryResponse {
    fn from(ceremony: CeremonyEntity) -> Self {
        Self {
            window: ceremony.window,
            period_start: format_day(ceremony.period_start),
            closed_at: format_timestamp(ceremony.closed_at),
            standings: StandingRow::ranked(&ceremony.standings),
        }
    }
}
