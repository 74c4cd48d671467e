use rocket::http::{ContentType, Status};
use rocket::response::{self, Responder};
use rocket::serde::json::Json;
use rocket::{Request, Response};
use rocket_okapi::gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::Responses;
use rocket_okapi::response::OpenApiResponderInner;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use thiserror::Error;

use crate::auth::AuthError;
use crate::upload::UploadError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    DatabaseError(sqlx::Error),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    InternalError(String),
}

/// Body shared by every JSON error and acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> Status {
        match self {
            ApiError::DatabaseError(_) | ApiError::InternalError(_) => {
                Status::InternalServerError
            }
            ApiError::NotFound(_) => Status::NotFound,
            ApiError::Unauthorized(_) => Status::Unauthorized,
            ApiError::Forbidden(_) => Status::Forbidden,
            ApiError::BadRequest(_) => Status::BadRequest,
        }
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let status = self.status();
        match &self {
            ApiError::DatabaseError(e) => log::error!("database error: {}", e),
            ApiError::InternalError(msg) => log::error!("internal error: {}", msg),
            ApiError::NotFound(msg) => log::debug!("not found: {}", msg),
            ApiError::Unauthorized(msg) | ApiError::Forbidden(msg) => {
                log::debug!("access denied: {}", msg)
            }
            ApiError::BadRequest(msg) => log::debug!("bad request: {}", msg),
        }

        let json = serde_json::to_string(&MessageResponse::new(self.to_string()))
            .unwrap_or_else(|_| r#"{"message":"Failed to serialize error"}"#.to_string());

        Response::build()
            .status(status)
            .header(ContentType::JSON)
            .sized_body(json.len(), Cursor::new(json))
            .ok()
    }
}

impl OpenApiResponderInner for ApiError {
    fn responses(_generator: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        Ok(Responses::default())
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            _ => ApiError::DatabaseError(err),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Sqlx(e) => ApiError::DatabaseError(e),
            AuthError::InvalidCredentials | AuthError::MissingToken => {
                ApiError::Unauthorized(err.to_string())
            }
            AuthError::TokenExpired | AuthError::TokenInvalid | AuthError::Forbidden => {
                ApiError::Forbidden(err.to_string())
            }
            AuthError::UserNotFound => ApiError::NotFound(err.to_string()),
            AuthError::ResetTokenInvalid => ApiError::BadRequest(err.to_string()),
            AuthError::Config(_)
            | AuthError::Jwt(_)
            | AuthError::Argon2(_)
            | AuthError::PasswordHash(_) => ApiError::InternalError(err.to_string()),
        }
    }
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::UnsupportedType(_)
            | UploadError::MissingFile
            | UploadError::MissingTitle => {
                ApiError::BadRequest(err.to_string())
            }
            UploadError::Io(_) => ApiError::InternalError(err.to_string()),
        }
    }
}

// ===== Catchers =====

/// Every catcher the API registers at `/`.
pub fn catchers() -> Vec<rocket::Catcher> {
    catchers![
        unauthorized,
        forbidden,
        bad_request,
        not_found,
        payload_too_large,
        unprocessable_entity,
        internal_error
    ]
}

/// Auth failures carry no body.
#[catch(401)]
pub fn unauthorized() {}

#[catch(403)]
pub fn forbidden() {}

#[catch(400)]
pub fn bad_request() -> Json<MessageResponse> {
    Json(MessageResponse::new("Bad request"))
}

#[catch(404)]
pub fn not_found() -> Json<MessageResponse> {
    Json(MessageResponse::new("Not found"))
}

#[catch(413)]
pub fn payload_too_large() -> Json<MessageResponse> {
    Json(MessageResponse::new("Uploaded file is too large"))
}

#[catch(422)]
pub fn unprocessable_entity() -> Json<MessageResponse> {
    Json(MessageResponse::new("Invalid request body"))
}

#[catch(500)]
pub fn internal_error() -> Json<MessageResponse> {
    Json(MessageResponse::new("Internal server error"))
}
