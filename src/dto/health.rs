use serde::Serialize;
use utoipa::ToSchema;

/// Health response returned by `/healthcheck` and `/readyz`.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Batches in the loaded quiz bank.
    pub batches: usize,
    /// Questions in the loaded quiz bank.
    pub questions: usize,
}

impl HealthResponse {
    /// Create a health response indicating the system is operational.
    pub fn ok(batches: usize, questions: usize) -> Self {
        Self {
            status: "ok".to_string(),
            batches,
            questions,
        }
    }

    /// Whether storage was reachable when the response was built.
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }

    /// Create a health response indicating the system is in degraded mode.
    pub fn degraded(batches: usize, questions: usize) -> Self {
        Self {
            status: "degraded".to_string(),
            batches,
            questions,
        }
    }
}
