use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::calendar;

/// Identifier of a chat participant as assigned by the delivery channel.
pub type UserId = i64;
/// Identifier of a question, unique across the whole quiz bank.
pub type QuestionId = u32;
/// Identifier of a quiz batch.
pub type BatchId = String;

/// Leaderboard accounting period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    /// Rolls at UTC midnight.
    Daily,
    /// ISO week, starting Monday.
    Weekly,
    /// Calendar month.
    Monthly,
}

impl WindowKind {
    /// Every window, in reporting order.
    pub const ALL: [WindowKind; 3] = [WindowKind::Daily, WindowKind::Weekly, WindowKind::Monthly];

    /// Stable lowercase name used in persisted keys and URLs.
    pub fn as_str(self) -> &'static str {
        match self {
            WindowKind::Daily => "daily",
            WindowKind::Weekly => "weekly",
            WindowKind::Monthly => "monthly",
        }
    }

    /// Start of the period of this window that contains `now`.
    pub fn period_start(self, now: OffsetDateTime) -> OffsetDateTime {
        calendar::period_start(self, now)
    }
}

/// Points awarded for one answer, split into the components applied in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreDelta {
    /// Awarded for taking part, applied first.
    pub participation: i32,
    /// Reward or penalty for the chosen option, applied second.
    pub correctness: i32,
}

impl ScoreDelta {
    /// Nominal change before any floor is applied.
    pub fn net(self) -> i32 {
        self.participation + self.correctness
    }

    /// Apply each component in turn, never letting the score drop below zero.
    pub fn apply(self, score: u32) -> u32 {
        [self.participation, self.correctness]
            .into_iter()
            .fold(score, |acc, component| acc.saturating_add_signed(component))
    }
}

/// Participant record holding lifetime totals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntity {
    /// Channel-assigned identifier.
    pub id: UserId,
    /// Latest name seen for the participant.
    pub display_name: String,
    /// Lifetime score, floored at zero.
    pub total_score: u32,
    /// Number of accepted answers.
    pub answered: u32,
    /// Number of accepted correct answers.
    pub correct: u32,
    /// First accepted answer.
    pub registered_at: OffsetDateTime,
    /// Latest accepted answer.
    pub last_activity: OffsetDateTime,
}

impl UserEntity {
    /// Fresh participant with no score.
    pub fn new(id: UserId, display_name: String, now: OffsetDateTime) -> Self {
        Self {
            id,
            display_name,
            total_score: 0,
            answered: 0,
            correct: 0,
            registered_at: now,
            last_activity: now,
        }
    }

    /// Fold an accepted answer into the lifetime totals.
    pub fn apply(&mut self, delta: ScoreDelta, is_correct: bool, now: OffsetDateTime) {
        self.total_score = delta.apply(self.total_score);
        self.answered += 1;
        if is_correct {
            self.correct += 1;
        }
        self.last_activity = now;
    }
}

/// A single accepted answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerEntity {
    /// Primary key.
    pub id: Uuid,
    /// Who answered.
    pub user_id: UserId,
    /// Which question was answered.
    pub question_id: QuestionId,
    /// Batch the question belongs to.
    pub batch_id: BatchId,
    /// Option picked by the user.
    pub chosen_index: u32,
    /// Whether the picked option was the correct one.
    pub is_correct: bool,
    /// Nominal points for the answer, before flooring.
    pub points_delta: i32,
    /// When the answer was accepted.
    pub answered_at: OffsetDateTime,
}

/// Everything a store needs to record an answer in one atomic step.
#[derive(Debug, Clone)]
pub struct AnswerAttempt {
    /// Answer row to insert.
    pub answer: AnswerEntity,
    /// Name to create or refresh the user with.
    pub display_name: String,
    /// Score components to apply to the user and each window.
    pub delta: ScoreDelta,
    /// Current period start of each window at `answer.answered_at`.
    pub periods: [(WindowKind, OffsetDateTime); 3],
    /// Trailing interval in which a repeat answer is rejected.
    pub dedup_window: Duration,
}

impl AnswerAttempt {
    /// Answers accepted strictly after this instant block the attempt.
    pub fn dedup_cutoff(&self) -> OffsetDateTime {
        self.answer.answered_at - self.dedup_window
    }
}

/// Result of [`crate::dao::quiz_store::QuizStore::record_answer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The answer was stored and every aggregate updated.
    Recorded {
        /// User row after the update.
        user: UserEntity,
    },
    /// An answer to the same question is still inside the dedup window; nothing changed.
    Duplicate {
        /// When the blocking answer was accepted.
        last_answered_at: OffsetDateTime,
    },
}

/// Per-user score inside one leaderboard period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardEntryEntity {
    /// Owning user.
    pub user_id: UserId,
    /// Window the entry accounts for.
    pub window: WindowKind,
    /// Start of the period.
    pub period_start: OffsetDateTime,
    /// Score inside the period, floored at zero.
    pub score: u32,
    /// Answers counted in the period.
    pub answered: u32,
    /// Correct answers counted in the period.
    pub correct: u32,
    /// Last time the score value changed; earlier wins ties.
    pub reached_at: OffsetDateTime,
    /// Last time the entry was touched.
    pub updated_at: OffsetDateTime,
}

impl LeaderboardEntryEntity {
    /// Empty entry for a user's first answer in a period.
    pub fn new(
        user_id: UserId,
        window: WindowKind,
        period_start: OffsetDateTime,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            user_id,
            window,
            period_start,
            score: 0,
            answered: 0,
            correct: 0,
            reached_at: now,
            updated_at: now,
        }
    }

    /// Fold an accepted answer into the entry.
    pub fn apply(&mut self, delta: ScoreDelta, is_correct: bool, now: OffsetDateTime) {
        let next = delta.apply(self.score);
        if next != self.score {
            self.reached_at = now;
        }
        self.score = next;
        self.answered += 1;
        if is_correct {
            self.correct += 1;
        }
        self.updated_at = now;
    }
}

/// Leaderboard row joined with the user's display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandingEntity {
    /// Ranked user.
    pub user_id: UserId,
    /// Display name at query time.
    pub display_name: String,
    /// Score inside the period.
    pub score: u32,
    /// Answers counted in the period.
    pub answered: u32,
    /// Correct answers counted in the period.
    pub correct: u32,
    /// Tie-break instant.
    pub reached_at: OffsetDateTime,
}

impl StandingEntity {
    /// Build a standing from an entry and the owner's name.
    pub fn from_entry(entry: &LeaderboardEntryEntity, display_name: String) -> Self {
        Self {
            user_id: entry.user_id,
            display_name,
            score: entry.score,
            answered: entry.answered,
            correct: entry.correct,
            reached_at: entry.reached_at,
        }
    }
}

/// Ranking order: higher score first, then whoever reached it first, then lower id.
pub fn standings_order(a: &StandingEntity, b: &StandingEntity) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| a.reached_at.cmp(&b.reached_at))
        .then_with(|| a.user_id.cmp(&b.user_id))
}

/// Archived result of a ceremony.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CeremonyEntity {
    /// Window that was closed.
    pub window: WindowKind,
    /// Start of the closed period.
    pub period_start: OffsetDateTime,
    /// When the ceremony ran.
    pub closed_at: OffsetDateTime,
    /// Standings captured just before the reset, best first.
    pub standings: Vec<StandingEntity>,
}

/// Persisted position of the quiz scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchCursorEntity {
    /// Permutation of batch ids for the current cycle.
    pub shuffled_order: Vec<BatchId>,
    /// Index into `shuffled_order` of the batch being delivered.
    pub position: usize,
    /// Index of the next question to deliver inside the current batch.
    pub next_question: usize,
    /// Number of completed reshuffles.
    pub cycle: u64,
    /// Optimistic concurrency token, bumped on every write.
    pub version: u64,
    /// Time of the last write.
    pub updated_at: OffsetDateTime,
}
