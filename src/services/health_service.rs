use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report the degraded flag, pinging the installed store through the pool to log
/// connectivity issues. Nothing is pinged while no store is installed.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    if state.store().await.is_some() {
        if let Err(err) = state.pool().run(|store| store.health_check()).await {
            warn!(error = %err, "storage health check failed");
        }
    }

    let catalog = state.catalog();
    if state.is_degraded() {
        HealthResponse::degraded(catalog.batch_count(), catalog.question_count())
    } else {
        HealthResponse::ok(catalog.batch_count(), catalog.question_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::test_state;

    #[tokio::test]
    async fn reports_degraded_once_the_store_is_gone() {
        let (state, _, _) = test_state().await;
        assert_eq!(health_status(&state).await.status, "ok");

        state.clear_store().await;

        let health = health_status(&state).await;
        assert_eq!(health.status, "degraded");
        assert_eq!((health.batches, health.questions), (3, 6));
    }
}
