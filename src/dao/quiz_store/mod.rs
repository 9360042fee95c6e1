pub mod memory;
/// MongoDB backend.
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::future::BoxFuture;
use time::OffsetDateTime;

use crate::dao::models::{
    AnswerAttempt, BatchCursorEntity, CeremonyEntity, LeaderboardEntryEntity, RecordOutcome,
    StandingEntity, UserEntity, UserId, WindowKind,
};
use crate::dao::storage::StorageResult;

pub use memory::MemoryQuizStore;

/// Abstraction over the persistence layer shared by every quiz component.
///
/// Each method is one atomic unit on the backend: callers never observe a partially applied
/// answer, ceremony or cursor write.
pub trait QuizStore: Send + Sync {
    /// Dedup-check, score and persist an answer, updating the user and all three windows.
    fn record_answer(&self, attempt: AnswerAttempt) -> BoxFuture<'static, StorageResult<RecordOutcome>>;
    /// Lifetime record of a user, if they ever answered.
    fn find_user(&self, id: UserId) -> BoxFuture<'static, StorageResult<Option<UserEntity>>>;
    /// Every leaderboard entry still stored for the user, any period.
    fn user_entries(
        &self,
        id: UserId,
    ) -> BoxFuture<'static, StorageResult<Vec<LeaderboardEntryEntity>>>;
    /// Best `limit` standings of one period, ordered by [`crate::dao::models::standings_order`].
    fn top_standings(
        &self,
        window: WindowKind,
        period_start: OffsetDateTime,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<StandingEntity>>>;
    /// Archive the ceremony and zero every entry of its period. Returns the number of entries
    /// reset, or [`crate::dao::storage::StorageError::AlreadyExists`] if the period was closed.
    fn close_period(&self, ceremony: CeremonyEntity) -> BoxFuture<'static, StorageResult<u64>>;
    /// Archived ceremony of one period, if it was closed.
    fn find_ceremony(
        &self,
        window: WindowKind,
        period_start: OffsetDateTime,
    ) -> BoxFuture<'static, StorageResult<Option<CeremonyEntity>>>;
    /// The batch cursor, or `None` before the first tick.
    fn load_cursor(&self) -> BoxFuture<'static, StorageResult<Option<BatchCursorEntity>>>;
    /// Write the cursor only if the stored version still equals `expected_version`
    /// (`None` meaning no cursor exists yet).
    fn save_cursor(
        &self,
        cursor: BatchCursorEntity,
        expected_version: Option<u64>,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Delete answers given before `cutoff`; returns the number removed.
    fn delete_answers_before(&self, cutoff: OffsetDateTime) -> BoxFuture<'static, StorageResult<u64>>;
    /// Delete leaderboard entries whose period started before `cutoff`.
    fn delete_entries_before(&self, cutoff: OffsetDateTime) -> BoxFuture<'static, StorageResult<u64>>;
    /// Delete ceremonies of periods that started before `cutoff`.
    fn delete_ceremonies_before(
        &self,
        cutoff: OffsetDateTime,
    ) -> BoxFuture<'static, StorageResult<u64>>;
    /// Cheap round trip to the backend.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the backend connection in place.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
