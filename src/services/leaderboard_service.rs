use time::OffsetDateTime;
use tracing::{info, warn};

use crate::{
    calendar,
    dao::{
        models::{CeremonyEntity, LeaderboardEntryEntity, StandingEntity, UserEntity, UserId, WindowKind},
        storage::StorageError,
    },
    delivery::{BroadcastReport, broadcast, render},
    error::ServiceError,
    state::SharedState,
};

/// Upper bound on the size of a ranking query, and on archived standings.
pub const MAX_TOP: usize = 50;

/// Lifetime and current-period figures for one user.
#[derive(Debug, Clone, PartialEq)]
pub struct UserStats {
    /// Lifetime record.
    pub user: UserEntity,
    /// Percentage of correct answers.
    pub accuracy: f64,
    /// Current-period entry of each window, absent when the user has not answered in it.
    pub current: Vec<(WindowKind, Option<LeaderboardEntryEntity>)>,
}

/// Result of [`run_ceremony`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CeremonyOutcome {
    /// Standings were archived and the period reset.
    Closed {
        /// First instant of the closed period.
        period_start: OffsetDateTime,
        /// Announced winners, best first; empty when nobody took part.
        winners: Vec<StandingEntity>,
        /// Entries zeroed by the reset.
        reset: u64,
        /// Delivery counts; `None` when there was nothing to announce.
        announcement: Option<BroadcastReport>,
    },
    /// The period had already been closed.
    AlreadyClosed {
        /// First instant of the period.
        period_start: OffsetDateTime,
    },
}

/// Current-period ranking of `window`, best first, at most `n` rows.
pub async fn top_n(
    state: &SharedState,
    window: WindowKind,
    n: usize,
    now: OffsetDateTime,
) -> Result<Vec<StandingEntity>, ServiceError> {
    let period_start = window.period_start(now);
    let limit = n.clamp(1, MAX_TOP);
    state
        .pool()
        .run(move |store| store.top_standings(window, period_start, limit))
        .await
}

/// Archived standings of the period of `window` containing `day`.
pub async fn history(
    state: &SharedState,
    window: WindowKind,
    day: OffsetDateTime,
) -> Result<CeremonyEntity, ServiceError> {
    let period_start = window.period_start(day);
    state
        .pool()
        .run(move |store| store.find_ceremony(window, period_start))
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!(
                "no closed {} period starting {}",
                window.as_str(),
                period_start.date()
            ))
        })
}

/// Lifetime counters and current-period entries of `user_id`.
pub async fn user_stats(
    state: &SharedState,
    user_id: UserId,
    now: OffsetDateTime,
) -> Result<UserStats, ServiceError> {
    let user = state
        .pool()
        .run(move |store| store.find_user(user_id))
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("user {user_id} has not answered yet")))?;
    let entries = state
        .pool()
        .run(move |store| store.user_entries(user_id))
        .await?;

    let current = WindowKind::ALL
        .into_iter()
        .map(|window| {
            let period_start = window.period_start(now);
            let entry = entries
                .iter()
                .find(|entry| entry.window == window && entry.period_start == period_start)
                .cloned();
            (window, entry)
        })
        .collect();

    Ok(UserStats {
        accuracy: render::accuracy(user.correct, user.answered),
        user,
        current,
    })
}

/// Start of the period of `window` a ceremony run at `now` closes.
///
/// Weekly slots early in the week close the week that just ended. Monthly ceremonies fire on
/// the last day of the month and close that month.
pub fn closing_period(state: &SharedState, window: WindowKind, now: OffsetDateTime) -> OffsetDateTime {
    match window {
        WindowKind::Weekly => {
            let schedule = &state.config().weekly_ceremony;
            calendar::closing_week_start(now, schedule.weekday, schedule.at)
        }
        WindowKind::Daily | WindowKind::Monthly => window.period_start(now),
    }
}

/// Announce the winners of the period closed at `now`, then archive and reset it.
///
/// Runs at most once per period; later calls return [`CeremonyOutcome::AlreadyClosed`].
pub async fn run_ceremony(
    state: &SharedState,
    window: WindowKind,
    now: OffsetDateTime,
) -> Result<CeremonyOutcome, ServiceError> {
    let period_start = closing_period(state, window, now);

    let existing = state
        .pool()
        .run(move |store| store.find_ceremony(window, period_start))
        .await?;
    if existing.is_some() {
        info!(window = window.as_str(), %period_start, "period already closed");
        return Ok(CeremonyOutcome::AlreadyClosed { period_start });
    }

    let standings = state
        .pool()
        .run(move |store| store.top_standings(window, period_start, MAX_TOP))
        .await?;
    let winners: Vec<StandingEntity> = standings
        .iter()
        .filter(|standing| standing.answered > 0)
        .take(state.config().announce_top)
        .cloned()
        .collect();

    let announcement = if winners.is_empty() {
        info!(window = window.as_str(), %period_start, "no participants; skipping announcement");
        None
    } else {
        let message = render::ceremony_message(window, period_start, &winners);
        Some(
            broadcast(
                state.delivery().as_ref(),
                &state.config().destinations,
                &message,
                state.config().delivery_timeout,
            )
            .await,
        )
    };

    let ceremony = CeremonyEntity {
        window,
        period_start,
        closed_at: now,
        standings,
    };
    match state
        .pool()
        .run(move |store| store.close_period(ceremony))
        .await
    {
        Ok(reset) => {
            info!(
                window = window.as_str(),
                %period_start,
                winners = winners.len(),
                reset,
                "ceremony completed"
            );
            Ok(CeremonyOutcome::Closed {
                period_start,
                winners,
                reset,
                announcement,
            })
        }
        Err(ServiceError::Unavailable(StorageError::AlreadyExists { .. })) => {
            warn!(window = window.as_str(), %period_start, "period closed concurrently");
            Ok(CeremonyOutcome::AlreadyClosed { period_start })
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        services::answer_service::{AnswerSubmission, submit},
        state::tests::{test_state, test_state_with},
    };
    use time::{Duration, macros::datetime};

    // Thursday; the week started on Monday 2025-07-07.
    const THURSDAY: OffsetDateTime = datetime!(2025-07-10 09:00 UTC);
    const SUNDAY_EVENING: OffsetDateTime = datetime!(2025-07-13 21:00 UTC);

    async fn answer(state: &SharedState, user_id: UserId, name: &str, question_id: u32, correct: bool, at: OffsetDateTime) {
        submit(
            state,
            AnswerSubmission {
                user_id,
                display_name: name.into(),
                question_id,
                chosen_index: if correct { 1 } else { 0 },
            },
            at,
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn ranking_breaks_ties_by_first_to_reach_then_id() {
        let (state, _, _) = test_state().await;
        answer(&state, 20, "Late", 1, true, THURSDAY + Duration::minutes(5)).await;
        answer(&state, 10, "Early", 1, true, THURSDAY).await;
        answer(&state, 30, "Top", 1, true, THURSDAY + Duration::minutes(9)).await;
        answer(&state, 30, "Top", 2, true, THURSDAY + Duration::minutes(10)).await;
        answer(&state, 5, "SameTime", 1, true, THURSDAY).await;

        let top = top_n(&state, WindowKind::Weekly, 10, THURSDAY + Duration::hours(1))
            .await
            .unwrap();

        let ids: Vec<_> = top.iter().map(|standing| standing.user_id).collect();
        assert_eq!(ids, vec![30, 5, 10, 20]);
        assert_eq!(top[0].display_name, "Top");
        assert_eq!(top[0].score, 6);
    }

    #[tokio::test]
    async fn top_n_is_limited() {
        let (state, _, _) = test_state().await;
        for user_id in 1..=4 {
            answer(&state, user_id, "u", 1, true, THURSDAY).await;
        }

        let top = top_n(&state, WindowKind::Daily, 2, THURSDAY).await.unwrap();

        assert_eq!(top.len(), 2);
    }

    #[tokio::test]
    async fn weekly_ceremony_announces_archives_and_resets() {
        let (state, _, delivery) = test_state().await;
        answer(&state, 1, "Ada", 1, true, THURSDAY).await;
        answer(&state, 1, "Ada", 2, true, THURSDAY).await;
        answer(&state, 2, "Bob", 1, true, THURSDAY).await;

        let outcome = run_ceremony(&state, WindowKind::Weekly, SUNDAY_EVENING)
            .await
            .unwrap();

        let CeremonyOutcome::Closed {
            winners,
            reset,
            announcement,
            ..
        } = outcome
        else {
            panic!("expected the ceremony to close the week");
        };
        assert_eq!(winners.iter().map(|w| w.user_id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(reset, 2);
        assert_eq!(announcement, Some(BroadcastReport { delivered: 2, failed: 0 }));
        let sent = delivery.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].1.text.contains("Ada: 6 pts"));

        let after = top_n(&state, WindowKind::Weekly, 3, SUNDAY_EVENING).await.unwrap();
        assert!(after.iter().all(|standing| standing.score == 0));

        let archived = history(&state, WindowKind::Weekly, THURSDAY).await.unwrap();
        assert_eq!(archived.standings[0].user_id, 1);
        assert_eq!(archived.standings[0].score, 6);

        // Monthly and daily windows are untouched.
        let monthly = top_n(&state, WindowKind::Monthly, 3, SUNDAY_EVENING).await.unwrap();
        assert_eq!(monthly[0].score, 6);
    }

    #[tokio::test]
    async fn ceremony_runs_once_per_period() {
        let (state, _, delivery) = test_state().await;
        answer(&state, 1, "Ada", 1, true, THURSDAY).await;
        run_ceremony(&state, WindowKind::Weekly, SUNDAY_EVENING).await.unwrap();

        let again = run_ceremony(&state, WindowKind::Weekly, SUNDAY_EVENING + Duration::minutes(1))
            .await
            .unwrap();

        assert!(matches!(again, CeremonyOutcome::AlreadyClosed { .. }));
        assert_eq!(delivery.sent().len(), 2);
    }

    #[tokio::test]
    async fn empty_period_closes_without_announcement() {
        let (state, _, delivery) = test_state().await;

        let outcome = run_ceremony(&state, WindowKind::Monthly, datetime!(2025-02-28 23:00 UTC))
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            CeremonyOutcome::Closed {
                reset: 0,
                announcement: None,
                ..
            }
        ));
        assert!(delivery.sent().is_empty());
    }

    #[tokio::test]
    async fn history_of_open_period_is_not_found() {
        let (state, _, _) = test_state().await;

        assert!(matches!(
            history(&state, WindowKind::Weekly, THURSDAY).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn user_stats_report_current_periods() {
        let (state, _, _) = test_state().await;
        answer(&state, 1, "Ada", 1, true, THURSDAY - Duration::days(1)).await;
        answer(&state, 1, "Ada", 2, false, THURSDAY).await;

        let stats = user_stats(&state, 1, THURSDAY).await.unwrap();

        assert_eq!(stats.user.total_score, 2);
        assert_eq!(stats.accuracy, 50.0);
        let daily = stats.current[0].1.as_ref().unwrap();
        assert_eq!((daily.window, daily.score, daily.answered), (WindowKind::Daily, 0, 1));
        let weekly = stats.current[1].1.as_ref().unwrap();
        assert_eq!(weekly.score, 2);

        assert!(matches!(
            user_stats(&state, 99, THURSDAY).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn monday_morning_ceremony_closes_the_previous_week() {
        let config = AppConfig::from_json(
            r#"{"destinations": ["chat-a"], "weekly_ceremony": {"weekday": "monday", "hour": 9}}"#,
        )
        .unwrap();
        let (state, _, delivery) = test_state_with(config).await;
        answer(&state, 1, "Ada", 1, true, THURSDAY).await;

        let fire = calendar::next_weekly(
            THURSDAY,
            state.config().weekly_ceremony.weekday,
            state.config().weekly_ceremony.at,
        );
        assert_eq!(fire, datetime!(2025-07-14 09:00 UTC));

        let outcome = run_ceremony(&state, WindowKind::Weekly, fire).await.unwrap();

        let CeremonyOutcome::Closed { period_start, winners, reset, .. } = outcome else {
            panic!("expected the previous week to be closed");
        };
        assert_eq!(period_start, datetime!(2025-07-07 00:00 UTC));
        assert_eq!(winners[0].user_id, 1);
        assert_eq!(reset, 1);
        assert_eq!(delivery.sent().len(), 1);

        let archived = history(&state, WindowKind::Weekly, THURSDAY).await.unwrap();
        assert_eq!(archived.standings[0].score, 3);
        let reset_week = top_n(&state, WindowKind::Weekly, 3, THURSDAY).await.unwrap();
        assert!(reset_week.iter().all(|standing| standing.score == 0));
    }
}
