use serde::Serialize;
use time::OffsetDateTime;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::{
    dao::models::{BatchId, QuestionId},
    delivery::{broadcast, render},
    error::ServiceError,
    state::{SharedState, batch_cursor::advance},
};

/// Attempts at persisting the cursor before a tick gives up on concurrent writers.
const MAX_SAVE_ATTEMPTS: usize = 3;

/// Summary of one scheduler tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct TickReport {
    /// Batch the question came from.
    pub batch_id: BatchId,
    /// Question sent.
    pub question_id: QuestionId,
    /// Reshuffle count after this tick.
    pub cycle: u64,
    /// Whether this tick generated a new batch order.
    pub reshuffled: bool,
    /// Destinations reached.
    pub delivered: usize,
    /// Destinations that failed.
    pub failed: usize,
}

/// Advance the persisted cursor and send the next question to every destination.
///
/// The cursor is saved before delivery: a crash mid-broadcast skips the question rather than
/// sending it twice.
pub async fn tick(state: &SharedState, now: OffsetDateTime) -> Result<TickReport, ServiceError> {
    let catalog = state.catalog();

    let mut attempt = 1;
    let (question, cursor, reshuffled) = loop {
        let stored = state.pool().run(|store| store.load_cursor()).await?;
        let step = {
            let mut rng = rand::rng();
            advance(catalog, stored.as_ref(), &mut rng, now)
        };
        let expected = stored.map(|cursor| cursor.version);
        let cursor = step.cursor.clone();

        match state
            .pool()
            .run(move |store| store.save_cursor(cursor, expected))
            .await
        {
            Ok(()) => break (step.question, step.cursor, step.reshuffled),
            Err(ServiceError::Unavailable(err))
                if err.is_version_conflict() && attempt < MAX_SAVE_ATTEMPTS =>
            {
                warn!(attempt, "cursor changed concurrently; retrying");
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    };

    let batch = catalog.batch(&question.batch_id).ok_or_else(|| {
        ServiceError::NotFound(format!("batch {} is not loaded", question.batch_id))
    })?;
    let message = render::question_message(batch, question);
    let report = broadcast(
        state.delivery().as_ref(),
        &state.config().destinations,
        &message,
        state.config().delivery_timeout,
    )
    .await;

    info!(
        batch_id = %question.batch_id,
        question_id = question.id,
        cycle = cursor.cycle,
        reshuffled,
        delivered = report.delivered,
        failed = report.failed,
        "question dispatched"
    );

    Ok(TickReport {
        batch_id: question.batch_id.clone(),
        question_id: question.id,
        cycle: cursor.cycle,
        reshuffled,
        delivered: report.delivered,
        failed: report.failed,
    })
}
