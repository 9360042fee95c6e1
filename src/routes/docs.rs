//! Swagger UI and the raw OpenAPI document.

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{services::documentation::ApiDoc, state::SharedState};

/// Where the generated OpenAPI JSON is served.
pub const OPENAPI_PATH: &str = "/api-doc/openapi.json";

/// Where the Swagger UI is mounted.
pub const SWAGGER_PATH: &str = "/docs";

/// Swagger UI plus the JSON document it reads.
pub fn router() -> Router<SharedState> {
    SwaggerUi::new(SWAGGER_PATH)
        .url(OPENAPI_PATH, ApiDoc::openapi())
        .into()
}
