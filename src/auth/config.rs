use crate::auth::passwords::PasswordCost;
use crate::auth::{AuthError, AuthResult};

/// Authentication configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_token_ttl_secs: i64,
    pub reset_token_ttl_secs: i64,
    pub password_cost: PasswordCost,
}

impl AuthConfig {
    pub fn from_env() -> AuthResult<Self> {
        let jwt_secret = std::env::var("KAMERO_JWT_SECRET")
            .map_err(|_| AuthError::Config("KAMERO_JWT_SECRET is required".into()))?;
        if jwt_secret.trim().is_empty() {
            return Err(AuthError::Config("KAMERO_JWT_SECRET must not be empty".into()));
        }
        let access_token_ttl_secs = std::env::var("KAMERO_ACCESS_TOKEN_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(60 * 60);
        let reset_token_ttl_secs = std::env::var("KAMERO_RESET_TOKEN_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(60 * 60);

        Ok(Self {
            jwt_secret,
            access_token_ttl_secs,
            reset_token_ttl_secs,
            password_cost: PasswordCost::from_env(),
        })
    }

    /// Configuration with a caller-supplied secret, one hour lifetimes and the
    /// cheapest hashing cost. Meant for tests and local tooling.
    pub fn for_testing(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            access_token_ttl_secs: 60 * 60,
            reset_token_ttl_secs: 60 * 60,
            password_cost: PasswordCost::minimal(),
        }
    }
}
