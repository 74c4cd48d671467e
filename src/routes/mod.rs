//! HTTP route handlers grouped by role.
//!
//! JSON handlers are annotated with `#[openapi]` so `rocket_okapi` can derive
//! an OpenAPI document automatically. The multipart upload handlers are
//! mounted with plain `routes!`.

pub mod admin;
pub mod health;
pub mod lecturer;
pub mod student;
