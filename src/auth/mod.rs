//! Authentication module: configuration, credential hashing, bearer-token
//! minting, password reset tokens, Rocket request guards, and HTTP route
//! handlers.

use std::sync::Arc;

use rocket_db_pools::sqlx::PgPool;

pub mod config;
pub mod error;
pub mod guards;
pub mod jwt;
pub mod passwords;
pub mod reset;
pub mod responses;
pub mod routes;

pub use config::AuthConfig;
pub use error::{AuthError, AuthResult};
pub use guards::{AuthUser, RequireAdmin, RequireLecturer};
pub use jwt::JwtService;
pub use passwords::PasswordService;
pub use reset::PasswordResetStore;

#[derive(Clone)]
pub struct AuthState {
    pub config: AuthConfig,
    pub password_service: Arc<PasswordService>,
    pub jwt_service: Arc<JwtService>,
    pub reset_store: PasswordResetStore,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        password_service: PasswordService,
        jwt_service: JwtService,
        reset_store: PasswordResetStore,
    ) -> Self {
        Self {
            config,
            password_service: Arc::new(password_service),
            jwt_service: Arc::new(jwt_service),
            reset_store,
        }
    }

    /// Build every service from `config`, sharing `pool` with the reset store.
    pub fn from_config(config: AuthConfig, pool: PgPool) -> AuthResult<Self> {
        let password_service = PasswordService::new(config.password_cost)?;
        let jwt_service = JwtService::from_config(&config)?;
        let reset_store = PasswordResetStore::new(
            pool,
            chrono::Duration::seconds(config.reset_token_ttl_secs),
        );
        Ok(Self::new(config, password_service, jwt_service, reset_store))
    }
}
