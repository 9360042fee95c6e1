use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use axum_valid::Valid;
use time::OffsetDateTime;

use crate::{
    dao::models::WindowKind,
    dto::{
        format_day,
        leaderboard::{
            DEFAULT_TOP, HistoryQuery, HistoryResponse, LeaderboardResponse, StandingRow, TopQuery,
        },
        validation::parse_day,
    },
    error::AppError,
    services::leaderboard_service,
    state::SharedState,
};

/// Public read-only leaderboard endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/leaderboard/{window}", get(top))
        .route("/leaderboard/{window}/history", get(history))
}

/// Ranking of the current period of a window.
#[utoipa::path(
    get,
    path = "/leaderboard/{window}",
    tag = "leaderboard",
    params(
        ("window" = WindowKind, Path, description = "daily, weekly or monthly"),
        TopQuery,
    ),
    responses(
        (status = 200, description = "Current standings, best first", body = LeaderboardResponse),
        (status = 400, description = "Unknown window or n outside 1..=50"),
        (status = 503, description = "Storage unavailable; try again")
    )
)]
pub async fn top(
    State(state): State<SharedState>,
    Path(window): Path<WindowKind>,
    Valid(Query(query)): Valid<Query<TopQuery>>,
) -> Result<Json<LeaderboardResponse>, AppError> {
    let now = OffsetDateTime::now_utc();
    let n = query.n.unwrap_or(DEFAULT_TOP);
    let standings = leaderboard_service::top_n(&state, window, n, now).await?;

    Ok(Json(LeaderboardResponse {
        window,
        period_start: format_day(window.period_start(now)),
        standings: StandingRow::ranked(&standings),
    }))
}

/// Standings archived when a period was closed.
#[utoipa::path(
    get,
    path = "/leaderboard/{window}/history",
    tag = "leaderboard",
    params(
        ("window" = WindowKind, Path, description = "daily, weekly or monthly"),
        HistoryQuery,
    ),
    responses(
        (status = 200, description = "Archived standings", body = HistoryResponse),
        (status = 400, description = "Malformed day"),
        (status = 404, description = "Period not closed yet or purged"),
        (status = 503, description = "Storage unavailable; try again")
    )
)]
pub async fn history(
    State(state): State<SharedState>,
    Path(window): Path<WindowKind>,
    Valid(Query(query)): Valid<Query<HistoryQuery>>,
) -> Result<Json<HistoryResponse>, AppError> {
    let day = parse_day(&query.period_start)
        .ok_or_else(|| AppError::BadRequest(format!("invalid day `{}`", query.period_start)))?;
    let ceremony =
        leaderboard_service::history(&state, window, day.midnight().assume_utc()).await?;
    Ok(Json(ceremony.into()))
}
