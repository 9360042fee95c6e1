use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Quizboard Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::health::readiness,
        crate::routes::leaderboard::top,
        crate::routes::leaderboard::history,
        crate::routes::answers::submit_answer,
        crate::routes::users::user_stats,
        crate::routes::admin::run_job,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::leaderboard::StandingRow,
            crate::dto::leaderboard::LeaderboardResponse,
            crate::dto::leaderboard::HistoryResponse,
            crate::dto::answers::AnswerRequest,
            crate::dto::answers::AnswerAccepted,
            crate::dto::answers::DuplicateAnswer,
            crate::dto::users::PeriodStats,
            crate::dto::users::UserStatsResponse,
            crate::dto::admin::JobStatus,
            crate::dto::admin::CeremonySummary,
            crate::dto::admin::JobRunResponse,
            crate::services::jobs::JobKind,
            crate::services::quiz_scheduler::TickReport,
            crate::services::retention::SweepReport,
            crate::dao::models::WindowKind,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "leaderboard", description = "Current and archived rankings"),
        (name = "answers", description = "Answer intake and scoring"),
        (name = "users", description = "Per-user statistics"),
        (name = "admin", description = "Manual job triggers"),
    )
)]
pub struct ApiDoc;
