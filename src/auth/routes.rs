use chrono::Utc;
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket::{State, post};
use rocket_db_pools::sqlx;
use rocket_okapi::openapi;

use crate::auth::jwt::TokenSubject;
use crate::auth::responses::{
    ForgotPasswordRequest, ForgotPasswordResponse, LoginRequest, LoginResponse, RegisterRequest,
    ResetPasswordRequest, UserSummary,
};
use crate::auth::{AuthError, AuthState};
use crate::error::{ApiError, MessageResponse};
use crate::models::User;

/// Exchange a username and password for a bearer token.
///
/// An unknown username and a wrong password produce the same response.
#[openapi(tag = "Auth")]
#[post("/auth/login", data = "<payload>")]
pub async fn login(
    state: &State<AuthState>,
    pool: &State<sqlx::PgPool>,
    payload: Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE username = $1")
        .bind(&payload.username)
        .fetch_optional(pool.inner())
        .await?;

    let user = match user {
        Some(user) => user,
        None => {
            state.password_service.verify_dummy(&payload.password);
            log::debug!("login failed: unknown username");
            return Err(AuthError::InvalidCredentials.into());
        }
    };

    let verified = state
        .password_service
        .verify_password(&payload.password, &user.password)?;

    if !verified {
        log::debug!("login failed: bad password for user {}", user.id);
        return Err(AuthError::InvalidCredentials.into());
    }

    let token = state.jwt_service.issue_access_token(TokenSubject {
        id: user.id,
        role: user.role,
        institution_id: user.institution_id,
    })?;

    log::info!("user {} logged in", user.id);

    Ok(Json(LoginResponse {
        token: token.token,
        user: UserSummary {
            id: user.id,
            role: user.role,
        },
    }))
}

/// Create an account. The stored password is always hashed.
#[openapi(tag = "Auth")]
#[post("/auth/register", data = "<payload>")]
pub async fn register(
    state: &State<AuthState>,
    pool: &State<sqlx::PgPool>,
    payload: Json<RegisterRequest>,
) -> Result<status::Custom<Json<User>>, ApiError> {
    let payload = payload.into_inner();
    let password_hash = state.password_service.hash_password(&payload.password)?;

    let user: User = sqlx::query_as(
        "INSERT INTO users (username, password, role, institution_id, email) VALUES ($1, $2, $3, $4, $5) RETURNING *",
    )
    .bind(&payload.username)
    .bind(password_hash)
    .bind(payload.role.as_str())
    .bind(payload.institution_id)
    .bind(&payload.email)
    .fetch_one(pool.inner())
    .await?;

    log::info!("registered {} user {}", user.role, user.id);

    Ok(status::Custom(Status::Created, Json(user)))
}

/// Issue a single-use password reset token. The token is returned directly;
/// delivering it to the account owner is left to the caller.
#[openapi(tag = "Auth")]
#[post("/auth/forgot-password", data = "<payload>")]
pub async fn forgot_password(
    state: &State<AuthState>,
    payload: Json<ForgotPasswordRequest>,
) -> Result<Json<ForgotPasswordResponse>, ApiError> {
    let issued = state
        .reset_store
        .request_reset(&state.password_service, payload.email.trim(), Utc::now())
        .await?;

    Ok(Json(ForgotPasswordResponse {
        message: "Password reset token generated".to_string(),
        reset_token: issued.token,
    }))
}

#[openapi(tag = "Auth")]
#[post("/auth/reset-password", data = "<payload>")]
pub async fn reset_password(
    state: &State<AuthState>,
    payload: Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .reset_store
        .complete_reset(
            &state.password_service,
            &payload.reset_token,
            &payload.new_password,
            Utc::now(),
        )
        .await?;

    Ok(Json(MessageResponse::new("Password has been reset")))
}
