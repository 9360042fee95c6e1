use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dao::models::{QuestionId, UserId},
    dto::validation::validate_display_name,
    services::answer_service::AnswerSubmission,
};

/// Body of `POST /answers`, as relayed from the delivery channel's button callback.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct AnswerRequest {
    /// Chat user id of the sender.
    #[validate(range(min = 1))]
    pub user_id: UserId,
    /// Name shown on leaderboards; defaults to `User_<id>`.
    #[serde(default)]
    #[validate(custom(function = "validate_display_name"))]
    pub display_name: String,
    /// Question being answered.
    pub question_id: QuestionId,
    /// 0-based option index.
    pub chosen_index: usize,
}

impl From<AnswerRequest> for AnswerSubmission {
    fn from(request: AnswerRequest) -> Self {
        Self {
            user_id: request.user_id,
            display_name: request.display_name,
            question_id: request.question_id,
            chosen_index: request.chosen_index,
        }
    }
}

/// Feedback for an accepted answer.
#[derive(Debug, Serialize, ToSchema)]
pub struct AnswerAccepted {
    /// Whether the chosen option was the right one.
    pub is_correct: bool,
    /// +3 when correct, -1 otherwise; the stored score never drops below zero.
    pub points_delta: i32,
    /// Lifetime score after this answer.
    pub total_score: u32,
    /// 0-based index of the correct option.
    pub correct_index: usize,
    /// Letter of the correct option.
    pub correct_option: String,
    /// Why that option is correct.
    pub explanation: String,
}

/// Body of the 409 returned for a repeat answer.
#[derive(Debug, Serialize, ToSchema)]
pub struct DuplicateAnswer {
    /// Human-readable reason.
    pub message: String,
    /// When the blocking answer was accepted.
    pub last_answered_at: String,
    /// Seconds until the question can be answered again.
    pub retry_after_secs: i64,
}
