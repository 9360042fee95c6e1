//! Periodic jobs and their non-overlap gates.
//!
//! Every job kind owns one gate. A run that finds its gate taken is skipped, never queued, so
//! a slow tick can never pile up behind itself. Manual triggers from the admin API go through
//! the same gates as the timers.

use std::{str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::{
    sync::{Mutex, MutexGuard, watch},
    task::JoinSet,
    time::{Instant, MissedTickBehavior, interval_at, sleep},
};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::{
    calendar,
    dao::models::WindowKind,
    error::ServiceError,
    services::{
        leaderboard_service::{self, CeremonyOutcome},
        quiz_scheduler::{self, TickReport},
        retention::{self, SweepReport},
    },
    state::SharedState,
};

const SLOT_RETRY_INITIAL: Duration = Duration::from_secs(30);
const SLOT_RETRY_MAX: Duration = Duration::from_secs(15 * 60);

/// Kinds of background work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Deliver the next question.
    QuizTick,
    /// Close the current week.
    WeeklyCeremony,
    /// Close the current month.
    MonthlyCeremony,
    /// Purge expired answers and periods.
    Retention,
}

impl JobKind {
    /// Every job kind.
    pub const ALL: [JobKind; 4] = [
        JobKind::QuizTick,
        JobKind::WeeklyCeremony,
        JobKind::MonthlyCeremony,
        JobKind::Retention,
    ];

    /// Stable identifier used in URLs and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::QuizTick => "quiz_tick",
            JobKind::WeeklyCeremony => "weekly_ceremony",
            JobKind::MonthlyCeremony => "monthly_ceremony",
            JobKind::Retention => "retention",
        }
    }
}

impl FromStr for JobKind {
    type Err = ServiceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        JobKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| ServiceError::NotFound(format!("unknown job `{value}`")))
    }
}

/// One try-lock per [`JobKind`].
#[derive(Default)]
pub struct JobGates {
    quiz_tick: Mutex<()>,
    weekly_ceremony: Mutex<()>,
    monthly_ceremony: Mutex<()>,
    retention: Mutex<()>,
}

impl JobGates {
    /// Take the gate of `kind`, or `None` while a run of that kind is in progress.
    pub fn try_acquire(&self, kind: JobKind) -> Option<MutexGuard<'_, ()>> {
        let gate = match kind {
            JobKind::QuizTick => &self.quiz_tick,
            JobKind::WeeklyCeremony => &self.weekly_ceremony,
            JobKind::MonthlyCeremony => &self.monthly_ceremony,
            JobKind::Retention => &self.retention,
        };
        gate.try_lock().ok()
    }
}

/// What a completed run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSummary {
    /// A question was delivered.
    Tick(TickReport),
    /// A period was closed, or was already.
    Ceremony(CeremonyOutcome),
    /// Retention ran.
    Sweep(SweepReport),
}

/// Result of [`run_job`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobRun {
    /// The job ran.
    Completed(JobSummary),
    /// Another run of the same kind held the gate.
    Skipped,
}

/// Run one job of `kind` as of `now`, unless one is already running.
pub async fn run_job(
    state: &SharedState,
    kind: JobKind,
    now: OffsetDateTime,
) -> Result<JobRun, ServiceError> {
    let Some(_gate) = state.gates().try_acquire(kind) else {
        info!(job = kind.as_str(), "previous run still in progress; skipping");
        return Ok(JobRun::Skipped);
    };

    let summary = match kind {
        JobKind::QuizTick => JobSummary::Tick(quiz_scheduler::tick(state, now).await?),
        JobKind::WeeklyCeremony => JobSummary::Ceremony(
            leaderboard_service::run_ceremony(state, WindowKind::Weekly, now).await?,
        ),
        JobKind::MonthlyCeremony => JobSummary::Ceremony(
            leaderboard_service::run_ceremony(state, WindowKind::Monthly, now).await?,
        ),
        JobKind::Retention => JobSummary::Sweep(retention::sweep(state, now).await?),
    };
    Ok(JobRun::Completed(summary))
}

/// Spawn one timer loop per job kind. Loops exit once `shutdown` flips or its sender drops.
pub fn spawn_all(state: &SharedState, shutdown: watch::Receiver<bool>) -> JoinSet<()> {
    let mut set = JoinSet::new();
    set.spawn(every(
        state.clone(),
        JobKind::QuizTick,
        state.config().quiz_interval,
        shutdown.clone(),
    ));
    set.spawn(every(
        state.clone(),
        JobKind::Retention,
        state.config().retention_interval,
        shutdown.clone(),
    ));
    set.spawn(on_calendar(
        state.clone(),
        JobKind::WeeklyCeremony,
        shutdown.clone(),
    ));
    set.spawn(on_calendar(state.clone(), JobKind::MonthlyCeremony, shutdown));
    set
}

async fn every(
    state: SharedState,
    kind: JobKind,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(job = kind.as_str(), period_secs = period.as_secs(), "job loop started");

    loop {
        tokio::select! {
            _ = ticker.tick() => fire(&state, kind).await,
            _ = shutdown.changed() => break,
        }
    }
    debug!(job = kind.as_str(), "job loop stopped");
}

/// Run a calendar job at each of its slots.
///
/// The most recent slot is replayed on start, so a ceremony missed during downtime still
/// closes its period; an already-closed period is a no-op.
async fn on_calendar(state: SharedState, kind: JobKind, mut shutdown: watch::Receiver<bool>) {
    let mut slot = previous_fire(&state, kind, OffsetDateTime::now_utc());

    loop {
        if !run_slot(&state, kind, slot, SLOT_RETRY_INITIAL, &mut shutdown).await {
            break;
        }

        let now = OffsetDateTime::now_utc();
        let next = next_fire(&state, kind, now);
        let wait = Duration::try_from(next - now).unwrap_or_default();
        info!(job = kind.as_str(), next = %next, "next run scheduled");

        tokio::select! {
            _ = sleep(wait) => slot = next,
            _ = shutdown.changed() => break,
        }
    }
    debug!(job = kind.as_str(), "job loop stopped");
}

/// Run the job as of `slot`, retrying storage failures with backoff until the following slot.
///
/// The period is derived from `slot`, not from the wall clock, so a retry that lands after the
/// period boundary still closes the right period. Returns `false` once shutdown is requested.
async fn run_slot(
    state: &SharedState,
    kind: JobKind,
    slot: OffsetDateTime,
    mut backoff: Duration,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    let deadline = next_fire(state, kind, slot);

    loop {
        let result = run_job(state, kind, slot).await;
        let retry = matches!(&result, Err(err) if err.is_storage_unavailable())
            && OffsetDateTime::now_utc() + backoff < deadline;
        if !retry {
            report(kind, result);
            return true;
        }

        if let Err(err) = &result {
            warn!(
                job = kind.as_str(),
                %slot,
                error = %err,
                retry_in_secs = backoff.as_secs(),
                "storage unavailable; retrying"
            );
        }
        tokio::select! {
            _ = sleep(backoff) => {}
            _ = shutdown.changed() => return false,
        }
        backoff = (backoff * 2).min(SLOT_RETRY_MAX);
    }
}

fn next_fire(state: &SharedState, kind: JobKind, now: OffsetDateTime) -> OffsetDateTime {
    let config = state.config();
    match kind {
        JobKind::MonthlyCeremony => calendar::next_month_end(now, config.monthly_ceremony_at),
        // Interval jobs never reach here.
        _ => calendar::next_weekly(
            now,
            config.weekly_ceremony.weekday,
            config.weekly_ceremony.at,
        ),
    }
}

fn previous_fire(state: &SharedState, kind: JobKind, now: OffsetDateTime) -> OffsetDateTime {
    let config = state.config();
    match kind {
        JobKind::MonthlyCeremony => calendar::previous_month_end(now, config.monthly_ceremony_at),
        _ => calendar::previous_weekly(
            now,
            config.weekly_ceremony.weekday,
            config.weekly_ceremony.at,
        ),
    }
}

async fn fire(state: &SharedState, kind: JobKind) {
    report(kind, run_job(state, kind, OffsetDateTime::now_utc()).await);
}

fn report(kind: JobKind, result: Result<JobRun, ServiceError>) {
    match result {
        Ok(JobRun::Completed(_)) => debug!(job = kind.as_str(), "job completed"),
        Ok(JobRun::Skipped) => {}
        Err(err) if err.is_storage_unavailable() => {
            warn!(job = kind.as_str(), error = %err, "storage unavailable; will retry on next run")
        }
        Err(err) => warn!(job = kind.as_str(), error = %err, "job failed"),
    }
}
