use time::{Duration, OffsetDateTime};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dao::models::{
        AnswerAttempt, AnswerEntity, QuestionId, RecordOutcome, ScoreDelta, UserId, WindowKind,
    },
    error::ServiceError,
    state::SharedState,
};

/// Interval during which a repeat answer to the same question is rejected.
pub const DEDUP_WINDOW: Duration = Duration::hours(24);
/// Delta for a correct answer: +1 participation, +2 correctness.
pub const CORRECT: ScoreDelta = ScoreDelta {
    participation: 1,
    correctness: 2,
};
/// Delta for a wrong answer: +1 participation, -2 correctness.
pub const INCORRECT: ScoreDelta = ScoreDelta {
    participation: 1,
    correctness: -2,
};

/// An answer as received from a user.
#[derive(Debug, Clone)]
pub struct AnswerSubmission {
    /// Chat user id.
    pub user_id: UserId,
    /// Name to show; blank falls back to `User_<id>`.
    pub display_name: String,
    /// Question being answered.
    pub question_id: QuestionId,
    /// 0-based option index.
    pub chosen_index: usize,
}

/// Result of [`submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The answer was stored and scored.
    Accepted {
        /// Whether the chosen option was correct.
        is_correct: bool,
        /// Nominal points, before the zero floor.
        points_delta: i32,
        /// Lifetime score after the answer.
        total_score: u32,
        /// 0-based index of the correct option.
        correct_index: usize,
        /// Explanation from the bank.
        explanation: String,
    },
    /// Rejected: the same question was answered inside the dedup window.
    Duplicate {
        /// When the blocking answer was accepted.
        last_answered_at: OffsetDateTime,
        /// Time until the blocking answer leaves the window.
        retry_after: Duration,
    },
}

/// Validate, score and persist an answer in one atomic storage operation.
pub async fn submit(
    state: &SharedState,
    submission: AnswerSubmission,
    now: OffsetDateTime,
) -> Result<SubmitOutcome, ServiceError> {
    let question = state
        .catalog()
        .question(submission.question_id)
        .ok_or_else(|| {
            ServiceError::NotFound(format!("question {} does not exist", submission.question_id))
        })?;
    if submission.chosen_index >= question.options.len() {
        return Err(ServiceError::InvalidInput(format!(
            "option {} is out of range for question {} ({} options)",
            submission.chosen_index,
            question.id,
            question.options.len()
        )));
    }

    let is_correct = submission.chosen_index == question.correct_index;
    let delta = if is_correct { CORRECT } else { INCORRECT };
    let display_name = match submission.display_name.trim() {
        "" => format!("User_{}", submission.user_id),
        name => name.to_owned(),
    };

    let attempt = AnswerAttempt {
        answer: AnswerEntity {
            id: Uuid::new_v4(),
            user_id: submission.user_id,
            question_id: question.id,
            batch_id: question.batch_id.clone(),
            chosen_index: submission.chosen_index as u32,
            is_correct,
            points_delta: delta.net(),
            answered_at: now,
        },
        display_name,
        delta,
        periods: WindowKind::ALL.map(|window| (window, window.period_start(now))),
        dedup_window: DEDUP_WINDOW,
    };

    let outcome = state
        .pool()
        .run(move |store| store.record_answer(attempt))
        .await?;

    match outcome {
        RecordOutcome::Recorded { user } => {
            info!(
                user_id = user.id,
                question_id = question.id,
                is_correct,
                total_score = user.total_score,
                "answer recorded"
            );
            Ok(SubmitOutcome::Accepted {
                is_correct,
                points_delta: delta.net(),
                total_score: user.total_score,
                correct_index: question.correct_index,
                explanation: question.explanation.clone(),
            })
        }
        RecordOutcome::Duplicate { last_answered_at } => {
            let retry_after = (last_answered_at + DEDUP_WINDOW - now).max(Duration::ZERO);
            debug!(
                user_id = submission.user_id,
                question_id = question.id,
                retry_after_secs = retry_after.whole_seconds(),
                "duplicate answer rejected"
            );
            Ok(SubmitOutcome::Duplicate {
                last_answered_at,
                retry_after,
            })
        }
    }
}
