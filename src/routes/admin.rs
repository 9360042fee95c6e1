use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::Request,
    middleware::{self, Next},
    response::Response,
    routing::post,
};
use time::OffsetDateTime;

use crate::{
    dto::admin::JobRunResponse,
    error::AppError,
    services::jobs::{self, JobKind},
    state::SharedState,
};

const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Admin-only endpoints for driving the background jobs by hand.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route("/admin/jobs/{job}", post(run_job))
        .route_layer(middleware::from_fn_with_state(state, require_admin_token))
}

/// Run a job now. Skipped when a run of the same kind is in progress.
#[utoipa::path(
    post,
    path = "/admin/jobs/{job}",
    tag = "admin",
    params(
        ("job" = JobKind, Path, description = "quiz_tick, weekly_ceremony, monthly_ceremony or retention"),
        ("X-Admin-Token" = String, Header, description = "Value of ADMIN_TOKEN")
    ),
    responses(
        (status = 200, description = "Job completed or skipped", body = JobRunResponse),
        (status = 401, description = "Missing or invalid admin token"),
        (status = 404, description = "Unknown job"),
        (status = 503, description = "Storage unavailable; try again")
    )
)]
pub async fn run_job(
    State(state): State<SharedState>,
    Path(job): Path<String>,
) -> Result<Json<JobRunResponse>, AppError> {
    let kind: JobKind = job.parse()?;
    let run = jobs::run_job(&state, kind, OffsetDateTime::now_utc()).await?;
    Ok(Json(JobRunResponse::new(kind, run)))
}

/// Reject admin calls unless `x-admin-token` equals the configured token.
async fn require_admin_token(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected) = state.admin_token() else {
        return Err(AppError::Unauthorized(
            "admin routes are disabled; set ADMIN_TOKEN".into(),
        ));
    };

    let matches = match req.headers().get(ADMIN_TOKEN_HEADER) {
        Some(sent) => sent.as_bytes() == expected.as_bytes(),
        None => {
            return Err(AppError::Unauthorized(format!(
                "{ADMIN_TOKEN_HEADER} header required"
            )));
        }
    };

    if !matches {
        return Err(AppError::Unauthorized("admin token rejected".into()));
    }
    Ok(next.run(req).await)
}
