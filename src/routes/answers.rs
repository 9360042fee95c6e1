use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use axum_valid::Valid;
use time::OffsetDateTime;

use crate::{
    delivery::render,
    dto::{
        answers::{AnswerAccepted, AnswerRequest, DuplicateAnswer},
        format_timestamp,
    },
    error::AppError,
    services::answer_service::{self, SubmitOutcome},
    state::SharedState,
};

/// Answer intake.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/answers", post(submit_answer))
}

/// Score one answer; repeats within 24 hours are rejected.
#[utoipa::path(
    post,
    path = "/answers",
    tag = "answers",
    request_body = AnswerRequest,
    responses(
        (status = 200, description = "Answer accepted and scored", body = AnswerAccepted),
        (status = 400, description = "Invalid payload or option out of range"),
        (status = 404, description = "Unknown question"),
        (status = 409, description = "Question already answered in the last 24 hours", body = DuplicateAnswer),
        (status = 503, description = "Storage unavailable; try again")
    )
)]
pub async fn submit_answer(
    State(state): State<SharedState>,
    Valid(Json(request)): Valid<Json<AnswerRequest>>,
) -> Result<Response, AppError> {
    let outcome = answer_service::submit(&state, request.into(), OffsetDateTime::now_utc()).await?;

    let response = match outcome {
        SubmitOutcome::Accepted {
            is_correct,
            points_delta,
            total_score,
            correct_index,
            explanation,
        } => Json(AnswerAccepted {
            is_correct,
            points_delta,
            total_score,
            correct_index,
            correct_option: render::option_label(correct_index).to_string(),
            explanation,
        })
        .into_response(),
        SubmitOutcome::Duplicate {
            last_answered_at,
            retry_after,
        } => (
            StatusCode::CONFLICT,
            Json(DuplicateAnswer {
                message: "You already answered this question! Try again later.".into(),
                last_answered_at: format_timestamp(last_answered_at),
                retry_after_secs: retry_after.whole_seconds(),
            }),
        )
            .into_response(),
    };
    Ok(response)
}
