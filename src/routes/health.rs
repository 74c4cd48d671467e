//! Service health and landing endpoints used for readiness checks and tests.

use rocket::response::content::RawHtml;
use rocket::serde::json::Json;
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;
use serde::{Deserialize, Serialize};

/// Basic response payload describing API health.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct HealthResponse {
    /// Static status string reporting application readiness.
    pub status: String,
}

/// Health check endpoint returning a trivial JSON payload.
#[openapi(tag = "Health")]
#[get("/health")]
pub fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Landing page served at the site root.
#[get("/")]
pub fn index() -> RawHtml<&'static str> {
    RawHtml("<h3>Welcome to Kamero research base, home for all your research needs</h3>")
}
