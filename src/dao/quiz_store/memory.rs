//! In-process [`QuizStore`] used by tests and by deployments without a database.
//!
//! Every table lives behind one async mutex, so each trait call is trivially atomic.

use std::{collections::HashMap, sync::Arc};

use futures::future::BoxFuture;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::dao::{
    models::{
        AnswerAttempt, AnswerEntity, BatchCursorEntity, CeremonyEntity, LeaderboardEntryEntity,
        QuestionId, RecordOutcome, StandingEntity, UserEntity, UserId, WindowKind,
        standings_order,
    },
    quiz_store::QuizStore,
    storage::{StorageError, StorageResult},
};

type EntryKey = (UserId, WindowKind, OffsetDateTime);

#[derive(Debug, Error)]
#[error("in-memory store is offline")]
struct Offline;

#[derive(Default)]
struct MemoryTables {
    users: HashMap<UserId, UserEntity>,
    answers: Vec<AnswerEntity>,
    entries: HashMap<EntryKey, LeaderboardEntryEntity>,
    ceremonies: HashMap<(WindowKind, OffsetDateTime), CeremonyEntity>,
    cursor: Option<BatchCursorEntity>,
    offline: bool,
}

impl MemoryTables {
    fn ensure_online(&self) -> StorageResult<()> {
        if self.offline {
            return Err(StorageError::unavailable(
                "memory store offline".into(),
                Offline,
            ));
        }
        Ok(())
    }

    fn record_answer(&mut self, attempt: AnswerAttempt) -> RecordOutcome {
        let cutoff = attempt.dedup_cutoff();
        let AnswerAttempt {
            answer,
            display_name,
            delta,
            periods,
            ..
        } = attempt;

        let blocking = self
            .answers
            .iter()
            .filter(|existing| {
                existing.user_id == answer.user_id
                    && existing.question_id == answer.question_id
                    && existing.answered_at > cutoff
            })
            .map(|existing| existing.answered_at)
            .max();
        if let Some(last_answered_at) = blocking {
            return RecordOutcome::Duplicate { last_answered_at };
        }

        let now = answer.answered_at;
        let user = {
            let user = self
                .users
                .entry(answer.user_id)
                .or_insert_with(|| UserEntity::new(answer.user_id, display_name.clone(), now));
            user.display_name = display_name;
            user.apply(delta, answer.is_correct, now);
            user.clone()
        };

        for (window, period_start) in periods {
            self.entries
                .entry((answer.user_id, window, period_start))
                .or_insert_with(|| {
                    LeaderboardEntryEntity::new(answer.user_id, window, period_start, now)
                })
                .apply(delta, answer.is_correct, now);
        }

        self.answers.push(answer);
        RecordOutcome::Recorded { user }
    }

    fn display_name(&self, id: UserId) -> String {
        self.users
            .get(&id)
            .map(|user| user.display_name.clone())
            .unwrap_or_else(|| format!("User_{id}"))
    }

    fn top_standings(
        &self,
        window: WindowKind,
        period_start: OffsetDateTime,
        limit: usize,
    ) -> Vec<StandingEntity> {
        let mut standings: Vec<StandingEntity> = self
            .entries
            .values()
            .filter(|entry| entry.window == window && entry.period_start == period_start)
            .map(|entry| StandingEntity::from_entry(entry, self.display_name(entry.user_id)))
            .collect();
        standings.sort_by(standings_order);
        standings.truncate(limit);
        standings
    }

    fn close_period(&mut self, ceremony: CeremonyEntity) -> StorageResult<u64> {
        let key = (ceremony.window, ceremony.period_start);
        if self.ceremonies.contains_key(&key) {
            return Err(StorageError::AlreadyExists {
                what: format!(
                    "{} ceremony for period starting {}",
                    ceremony.window.as_str(),
                    ceremony.period_start
                ),
            });
        }

        let mut reset = 0;
        for entry in self.entries.values_mut() {
            if entry.window == ceremony.window && entry.period_start == ceremony.period_start {
                entry.score = 0;
                entry.answered = 0;
                entry.correct = 0;
                entry.reached_at = ceremony.closed_at;
                entry.updated_at = ceremony.closed_at;
                reset += 1;
            }
        }

        self.ceremonies.insert(key, ceremony);
        Ok(reset)
    }

    fn save_cursor(
        &mut self,
        cursor: BatchCursorEntity,
        expected_version: Option<u64>,
    ) -> StorageResult<()> {
        let stored_version = self.cursor.as_ref().map(|stored| stored.version);
        if stored_version != expected_version {
            return Err(StorageError::VersionConflict {
                expected: expected_version,
            });
        }
        self.cursor = Some(cursor);
        Ok(())
    }
}

/// Shared, cloneable handle over the in-memory tables.
#[derive(Clone, Default)]
pub struct MemoryQuizStore {
    tables: Arc<Mutex<MemoryTables>>,
}

impl MemoryQuizStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails with [`StorageError::Unavailable`] while offline.
    pub async fn set_offline(&self, offline: bool) {
        self.tables.lock().await.offline = offline;
    }

    /// Accepted answers for one user and question, oldest first.
    pub async fn answers_for(&self, user_id: UserId, question_id: QuestionId) -> Vec<AnswerEntity> {
        let tables = self.tables.lock().await;
        tables
            .answers
            .iter()
            .filter(|answer| answer.user_id == user_id && answer.question_id == question_id)
            .cloned()
            .collect()
    }

    /// Number of leaderboard entries currently stored.
    pub async fn entry_count(&self) -> usize {
        self.tables.lock().await.entries.len()
    }

    /// Run `op` against the tables while holding the lock, after checking the store is online.
    fn with_tables<T, F>(&self, op: F) -> BoxFuture<'static, StorageResult<T>>
    where
        T: Send + 'static,
        F: FnOnce(&mut MemoryTables) -> StorageResult<T> + Send + 'static,
    {
        let tables = Arc::clone(&self.tables);
        Box::pin(async move {
            let mut guard = tables.lock().await;
            guard.ensure_online()?;
            op(&mut guard)
        })
    }
}

impl QuizStore for MemoryQuizStore {
    fn record_answer(&self, attempt: AnswerAttempt) -> BoxFuture<'static, StorageResult<RecordOutcome>> {
        self.with_tables(move |tables| Ok(tables.record_answer(attempt)))
    }

    fn find_user(&self, id: UserId) -> BoxFuture<'static, StorageResult<Option<UserEntity>>> {
        self.with_tables(move |tables| Ok(tables.users.get(&id).cloned()))
    }

    fn user_entries(
        &self,
        id: UserId,
    ) -> BoxFuture<'static, StorageResult<Vec<LeaderboardEntryEntity>>> {
        self.with_tables(move |tables| {
            Ok(tables
                .entries
                .values()
                .filter(|entry| entry.user_id == id)
                .cloned()
                .collect())
        })
    }

    fn top_standings(
        &self,
        window: WindowKind,
        period_start: OffsetDateTime,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<StandingEntity>>> {
        self.with_tables(move |tables| Ok(tables.top_standings(window, period_start, limit)))
    }

    fn close_period(&self, ceremony: CeremonyEntity) -> BoxFuture<'static, StorageResult<u64>> {
        self.with_tables(move |tables| tables.close_period(ceremony))
    }

    fn find_ceremony(
        &self,
        window: WindowKind,
        period_start: OffsetDateTime,
    ) -> BoxFuture<'static, StorageResult<Option<CeremonyEntity>>> {
        self.with_tables(move |tables| Ok(tables.ceremonies.get(&(window, period_start)).cloned()))
    }

    fn load_cursor(&self) -> BoxFuture<'static, StorageResult<Option<BatchCursorEntity>>> {
        self.with_tables(|tables| Ok(tables.cursor.clone()))
    }

    fn save_cursor(
        &self,
        cursor: BatchCursorEntity,
        expected_version: Option<u64>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.with_tables(move |tables| tables.save_cursor(cursor, expected_version))
    }

    fn delete_answers_before(&self, cutoff: OffsetDateTime) -> BoxFuture<'static, StorageResult<u64>> {
        self.with_tables(move |tables| {
            let before = tables.answers.len();
            tables.answers.retain(|answer| answer.answered_at >= cutoff);
            Ok((before - tables.answers.len()) as u64)
        })
    }

    fn delete_entries_before(&self, cutoff: OffsetDateTime) -> BoxFuture<'static, StorageResult<u64>> {
        self.with_tables(move |tables| {
            let before = tables.entries.len();
            tables.entries.retain(|_, entry| entry.period_start >= cutoff);
            Ok((before - tables.entries.len()) as u64)
        })
    }

    fn delete_ceremonies_before(
        &self,
        cutoff: OffsetDateTime,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        self.with_tables(move |tables| {
            let before = tables.ceremonies.len();
            tables
                .ceremonies
                .retain(|_, ceremony| ceremony.period_start >= cutoff);
            Ok((before - tables.ceremonies.len()) as u64)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.with_tables(|_| Ok(()))
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.with_tables(|_| Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::ScoreDelta;
    use time::{Duration, macros::datetime};
    use uuid::Uuid;

    fn attempt(user_id: UserId, question_id: QuestionId, at: OffsetDateTime) -> AnswerAttempt {
        AnswerAttempt {
            answer: AnswerEntity {
                id: Uuid::new_v4(),
                user_id,
                question_id,
                batch_id: "b1".into(),
                chosen_index: 0,
                is_correct: true,
                points_delta: 3,
                answered_at: at,
            },
            display_name: format!("player {user_id}"),
            delta: ScoreDelta {
                participation: 1,
                correctness: 2,
            },
            periods: WindowKind::ALL.map(|window| (window, window.period_start(at))),
            dedup_window: Duration::hours(24),
        }
    }

    #[tokio::test]
    async fn record_answer_updates_user_and_all_windows() {
        let store = MemoryQuizStore::new();
        let at = datetime!(2025-07-10 10:00 UTC);

        let outcome = store.record_answer(attempt(1, 10, at)).await.unwrap();

        let RecordOutcome::Recorded { user } = outcome else {
            panic!("expected the answer to be recorded");
        };
        assert_eq!(user.total_score, 3);
        assert_eq!(store.entry_count().await, 3);
        let entries = store.user_entries(1).await.unwrap();
        assert!(entries.iter().all(|entry| entry.score == 3));
    }

    #[tokio::test]
    async fn duplicate_inside_window_changes_nothing() {
        let store = MemoryQuizStore::new();
        let at = datetime!(2025-07-10 10:00 UTC);
        store.record_answer(attempt(1, 10, at)).await.unwrap();

        let outcome = store
            .record_answer(attempt(1, 10, at + Duration::hours(23)))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            RecordOutcome::Duplicate {
                last_answered_at: at
            }
        );
        assert_eq!(store.answers_for(1, 10).await.len(), 1);
        assert_eq!(store.find_user(1).await.unwrap().unwrap().total_score, 3);
    }

    #[tokio::test]
    async fn cursor_write_requires_matching_version() {
        let store = MemoryQuizStore::new();
        let cursor = BatchCursorEntity {
            shuffled_order: vec!["b1".into()],
            position: 0,
            next_question: 0,
            cycle: 0,
            version: 1,
            updated_at: datetime!(2025-07-10 10:00 UTC),
        };

        store.save_cursor(cursor.clone(), None).await.unwrap();
        let err = store.save_cursor(cursor.clone(), None).await.unwrap_err();
        assert!(matches!(err, StorageError::VersionConflict { expected: None }));

        let next = BatchCursorEntity {
            version: 2,
            ..cursor
        };
        store.save_cursor(next, Some(1)).await.unwrap();
        assert_eq!(store.load_cursor().await.unwrap().unwrap().version, 2);
    }

    #[tokio::test]
    async fn closing_a_period_twice_is_rejected() {
        let store = MemoryQuizStore::new();
        let at = datetime!(2025-07-10 10:00 UTC);
        store.record_answer(attempt(1, 10, at)).await.unwrap();

        let ceremony = CeremonyEntity {
            window: WindowKind::Weekly,
            period_start: WindowKind::Weekly.period_start(at),
            closed_at: at,
            standings: vec![],
        };
        assert_eq!(store.close_period(ceremony.clone()).await.unwrap(), 1);
        assert!(matches!(
            store.close_period(ceremony).await,
            Err(StorageError::AlreadyExists { .. })
        ));
    }

    #[tokio::test]
    async fn offline_store_reports_unavailable() {
        let store = MemoryQuizStore::new();
        store.set_offline(true).await;

        assert!(matches!(
            store.health_check().await,
            Err(StorageError::Unavailable { .. })
        ));

        store.set_offline(false).await;
        assert!(store.health_check().await.is_ok());
    }
}
