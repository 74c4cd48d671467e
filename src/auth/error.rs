use rocket::http::Status;
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("User not found")]
    UserNotFound,
    #[error("Invalid or expired password reset token")]
    ResetTokenInvalid,
    #[error("token missing")]
    MissingToken,
    #[error("token expired")]
    TokenExpired,
    #[error("token invalid")]
    TokenInvalid,
    #[error("forbidden")]
    Forbidden,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("{0}")]
    Sqlx(#[from] rocket_db_pools::sqlx::Error),
    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("argon2 parameter error: {0}")]
    Argon2(String),
    #[error("password hashing error: {0}")]
    PasswordHash(String),
}

impl AuthError {
    pub fn status(&self) -> Status {
        match self {
            AuthError::InvalidCredentials | AuthError::MissingToken => Status::Unauthorized,
            AuthError::TokenExpired | AuthError::TokenInvalid | AuthError::Forbidden => {
                Status::Forbidden
            }
            AuthError::UserNotFound => Status::NotFound,
            AuthError::ResetTokenInvalid => Status::BadRequest,
            AuthError::Config(_)
            | AuthError::Sqlx(_)
            | AuthError::Jwt(_)
            | AuthError::Argon2(_)
            | AuthError::PasswordHash(_) => Status::InternalServerError,
        }
    }
}

impl From<argon2::Error> for AuthError {
    fn from(err: argon2::Error) -> Self {
        AuthError::Argon2(err.to_string())
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(err: argon2::password_hash::Error) -> Self {
        AuthError::PasswordHash(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_and_invalid_tokens_map_to_distinct_statuses() {
        assert_eq!(AuthError::MissingToken.status(), Status::Unauthorized);
        assert_eq!(AuthError::TokenInvalid.status(), Status::Forbidden);
        assert_eq!(AuthError::TokenExpired.status(), Status::Forbidden);
    }

    #[test]
    fn reset_failures_are_undifferentiated() {
        let err = AuthError::ResetTokenInvalid;
        assert_eq!(err.status(), Status::BadRequest);
        assert_eq!(err.to_string(), "Invalid or expired password reset token");
    }
}
