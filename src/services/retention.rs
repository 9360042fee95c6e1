use serde::Serialize;
use time::OffsetDateTime;
use tracing::info;
use utoipa::ToSchema;

use crate::{error::ServiceError, state::SharedState};

/// Rows removed by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct SweepReport {
    /// Answers deleted.
    pub answers: u64,
    /// Leaderboard entries deleted.
    pub entries: u64,
    /// Ceremony records deleted.
    pub ceremonies: u64,
}

/// Purge answers and leaderboard periods older than their retention horizons.
///
/// Running it twice in a row removes nothing the second time.
pub async fn sweep(state: &SharedState, now: OffsetDateTime) -> Result<SweepReport, ServiceError> {
    let answer_cutoff = now - state.config().answer_retention;
    let leaderboard_cutoff = now - state.config().leaderboard_retention;

    let answers = state
        .pool()
        .run(move |store| store.delete_answers_before(answer_cutoff))
        .await?;
    let entries = state
        .pool()
        .run(move |store| store.delete_entries_before(leaderboard_cutoff))
        .await?;
    let ceremonies = state
        .pool()
        .run(move |store| store.delete_ceremonies_before(leaderboard_cutoff))
        .await?;

    let report = SweepReport {
        answers,
        entries,
        ceremonies,
    };
    info!(
        answers = report.answers,
        entries = report.entries,
        ceremonies = report.ceremonies,
        "retention sweep finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::{models::WindowKind, quiz_store::QuizStore},
        services::{
            answer_service::{AnswerSubmission, submit},
            leaderboard_service::run_ceremony,
        },
        state::tests::test_state,
    };
    use time::{Duration, macros::datetime};

    const NOW: OffsetDateTime = datetime!(2025-07-10 10:00 UTC);

    fn answer(question_id: u32) -> AnswerSubmission {
        AnswerSubmission {
            user_id: 1,
            display_name: "Ada".into(),
            question_id,
            chosen_index: 1,
        }
    }

    #[tokio::test]
    async fn sweep_keeps_recent_rows_and_is_idempotent() {
        let (state, store, _) = test_state().await;
        let long_ago = NOW - Duration::days(120);
        submit(&state, answer(1), long_ago).await.unwrap();
        run_ceremony(&state, WindowKind::Weekly, long_ago).await.unwrap();
        submit(&state, answer(2), NOW - Duration::days(40)).await.unwrap();
        submit(&state, answer(3), NOW - Duration::days(1)).await.unwrap();

        let first = sweep(&state, NOW).await.unwrap();

        assert_eq!(first.answers, 2);
        // Daily, weekly and monthly periods of the oldest answer.
        assert_eq!(first.entries, 3);
        assert_eq!(first.ceremonies, 1);
        assert_eq!(store.answers_for(1, 3).await.len(), 1);
        assert_eq!(store.answers_for(1, 2).await.len(), 0);

        let second = sweep(&state, NOW).await.unwrap();
        assert_eq!(second, SweepReport::default());

        // Lifetime totals survive the purge.
        let user = store.find_user(1).await.unwrap().unwrap();
        assert_eq!(user.answered, 3);
    }

    #[tokio::test]
    async fn sweep_fails_cleanly_when_degraded() {
        let (state, _, _) = test_state().await;
        state.clear_store().await;

        assert!(matches!(sweep(&state, NOW).await, Err(ServiceError::Degraded)));
    }
}
