//! DTO definitions used by the admin REST API and documentation layer.

use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    dto::{format_day, leaderboard::StandingRow},
    services::{
        jobs::{JobKind, JobRun, JobSummary},
        leaderboard_service::CeremonyOutcome,
        quiz_scheduler::TickReport,
        retention::SweepReport,
    },
};

/// Whether a triggered job ran.
#[derive(Debug, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// The job ran to completion.
    Completed,
    /// A run of the same kind was already in progress.
    Skipped,
}

/// What a ceremony run did.
#[derive(Debug, Serialize, ToSchema)]
pub struct CeremonySummary {
    /// First day of the period, `YYYY-MM-DD`.
    pub period_start: String,
    /// The period had been closed by an earlier run.
    pub already_closed: bool,
    /// Announced winners, best first.
    pub winners: Vec<StandingRow>,
    /// Entries zeroed.
    pub reset: u64,
    /// Destinations the announcement reached.
    pub delivered: usize,
    /// Destinations that failed.
    pub failed: usize,
}

impl From<CeremonyOutcome> for CeremonySummary {
    fn from(outcome: CeremonyOutcome) -> Self {
        match outcome {
            CeremonyOutcome::Closed {
                period_start,
                winners,
                reset,
                announcement,
            } => {
                let announcement = announcement.unwrap_or_default();
                Self {
                    period_start: format_day(period_start),
                    already_closed: false,
                    winners: StandingRow::ranked(&winners),
                    reset,
                    delivered: announcement.delivered,
                    failed: announcement.failed,
                }
            }
            CeremonyOutcome::AlreadyClosed { period_start } => Self {
                period_start: format_day(period_start),
                already_closed: true,
                winners: Vec::new(),
                reset: 0,
                delivered: 0,
                failed: 0,
            },
        }
    }
}

/// Response of `POST /admin/jobs/{job}`; exactly one summary is set when the job completed.
#[derive(Debug, Serialize, ToSchema)]
pub struct JobRunResponse {
    /// The triggered job.
    pub job: JobKind,
    /// Whether it ran.
    pub status: JobStatus,
    /// Set for `quiz_tick`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tick: Option<TickReport>,
    /// Set for ceremony jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ceremony: Option<CeremonySummary>,
    /// Set for `retention`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sweep: Option<SweepReport>,
}

impl JobRunResponse {
    /// Flatten a job run into its response shape.
    pub fn new(job: JobKind, run: JobRun) -> Self {
        let mut response = Self {
            job,
            status: JobStatus::Completed,
            tick: None,
            ceremony: None,
            sweep: None,
        };
        match run {
            JobRun::Skipped => response.status = JobStatus::Skipped,
            JobRun::Completed(JobSummary::Tick(report)) => response.tick = Some(report),
            JobRun::Completed(JobSummary::Ceremony(outcome)) => {
                response.ceremony = Some(outcome.into())
            }
            JobRun::Completed(JobSummary::Sweep(report)) => response.sweep = Some(report),
        }
        response
    }
}
