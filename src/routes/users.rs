use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use time::OffsetDateTime;

use crate::{
    dao::models::UserId, dto::users::UserStatsResponse, error::AppError,
    services::leaderboard_service, state::SharedState,
};

/// Routes under `/users`.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/users/{id}/stats", get(user_stats))
}

/// Lifetime and current-period statistics of one user.
#[utoipa::path(
    get,
    path = "/users/{id}/stats",
    tag = "users",
    params(("id" = i64, Path, description = "Channel user id")),
    responses(
        (status = 200, description = "User statistics", body = UserStatsResponse),
        (status = 404, description = "User has not answered yet"),
        (status = 503, description = "Storage unavailable; try again")
    )
)]
pub async fn user_stats(
    State(state): State<SharedState>,
    Path(id): Path<UserId>,
) -> Result<Json<UserStatsResponse>, AppError> {
    let now = OffsetDateTime::now_utc();
    let stats = leaderboard_service::user_stats(&state, id, now).await?;
    Ok(Json(UserStatsResponse::new(stats, now)))
}
