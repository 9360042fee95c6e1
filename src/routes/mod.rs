use axum::Router;

use crate::state::SharedState;

/// Manual job triggers behind the admin token.
pub mod admin;
/// Answer submission.
pub mod answers;
pub mod docs;
/// Liveness and readiness.
pub mod health;
/// Current and archived rankings.
pub mod leaderboard;
/// Per-user statistics.
pub mod users;

/// Every public, admin and documentation route bound to one state.
pub fn router(state: SharedState) -> Router<()> {
    health::router()
        .merge(leaderboard::router())
        .merge(answers::router())
        .merge(users::router())
        .merge(admin::router(state.clone()))
        .merge(docs::router())
        .with_state(state)
}
