//! Password reset tokens.
//!
//! A reset token is handed to the requester once as `<reset id>.<hex secret>`.
//! Only the argon2 hash of the secret and an absolute expiry (epoch
//! milliseconds) are kept on the user row, next to the reset id which serves
//! as the lookup key. Requesting again overwrites the pending token;
//! completing a reset clears all three columns in the same statement that
//! stores the new password.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rocket_db_pools::sqlx::{self, PgPool, Row};
use uuid::Uuid;

use crate::auth::passwords::PasswordService;
use crate::auth::{AuthError, AuthResult};

const SECRET_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct IssuedResetToken {
    pub user_id: i32,
    pub reset_id: Uuid,
    pub token: String,
    pub expires_at_ms: i64,
}

#[derive(Debug, Clone)]
pub struct PasswordResetStore {
    pool: PgPool,
    ttl: Duration,
}

impl PasswordResetStore {
    pub fn new(pool: PgPool, ttl: Duration) -> Self {
        Self { pool, ttl }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn request_reset(
        &self,
        passwords: &PasswordService,
        email: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<IssuedResetToken> {
        let row = sqlx::query("SELECT id FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        let user_id: i32 = match row {
            Some(row) => row.try_get("id")?,
            None => return Err(AuthError::UserNotFound),
        };

        let reset_id = Uuid::new_v4();
        let secret = generate_secret();
        let hashed = passwords.hash_password(&secret)?;
        let expires_at_ms = (now + self.ttl).timestamp_millis();

        sqlx::query(
            "UPDATE users SET reset_token_id = $1, reset_password_token = $2, reset_password_expires = $3 WHERE id = $4",
        )
        .bind(reset_id)
        .bind(hashed)
        .bind(expires_at_ms)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        log::info!("password reset requested for user {}", user_id);

        Ok(IssuedResetToken {
            user_id,
            reset_id,
            token: format!("{}.{}", reset_id, secret),
            expires_at_ms,
        })
    }

    /// Consume a reset token and store `new_password`. Every rejection is the
    /// same [`AuthError::ResetTokenInvalid`].
    pub async fn complete_reset(
        &self,
        passwords: &PasswordService,
        presented: &str,
        new_password: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<i32> {
        let parsed = ParsedResetToken::parse(presented)?;

        let row = sqlx::query(
            "SELECT id, reset_password_token, reset_password_expires FROM users WHERE reset_token_id = $1",
        )
        .bind(parsed.reset_id)
        .fetch_optional(&self.pool)
        .await?;

        let row = row.ok_or(AuthError::ResetTokenInvalid)?;
        let user_id: i32 = row.try_get("id")?;
        let hashed: Option<String> = row.try_get("reset_password_token")?;
        let expires_at_ms: Option<i64> = row.try_get("reset_password_expires")?;

        let (hashed, expires_at_ms) = match (hashed, expires_at_ms) {
            (Some(hashed), Some(expires_at_ms)) => (hashed, expires_at_ms),
            _ => return Err(AuthError::ResetTokenInvalid),
        };

        if !passwords.verify_password(&parsed.secret, &hashed)? {
            log::warn!("password reset rejected for user {}: secret mismatch", user_id);
            return Err(AuthError::ResetTokenInvalid);
        }

        if is_expired(expires_at_ms, now) {
            log::warn!("password reset rejected for user {}: token expired", user_id);
            return Err(AuthError::ResetTokenInvalid);
        }

        let new_hash = passwords.hash_password(new_password)?;

        let result = sqlx::query(
            "UPDATE users SET password = $1, reset_token_id = NULL, reset_password_token = NULL, reset_password_expires = NULL WHERE id = $2 AND reset_token_id = $3",
        )
        .bind(new_hash)
        .bind(user_id)
        .bind(parsed.reset_id)
        .execute(&self.pool)
        .await?;

        // Another request replaced or consumed the token in the meantime.
        if result.rows_affected() == 0 {
            return Err(AuthError::ResetTokenInvalid);
        }

        log::info!("password reset completed for user {}", user_id);
        Ok(user_id)
    }
}

/// A stored expiry strictly before `now` is expired.
pub fn is_expired(expires_at_ms: i64, now: DateTime<Utc>) -> bool {
    expires_at_ms < now.timestamp_millis()
}

#[derive(Debug, PartialEq, Eq)]
struct ParsedResetToken {
    reset_id: Uuid,
    secret: String,
}

impl ParsedResetToken {
    fn parse(token: &str) -> AuthResult<Self> {
        let (id, secret) = token
            .trim()
            .split_once('.')
            .ok_or(AuthError::ResetTokenInvalid)?;
        let reset_id = id.parse::<Uuid>().map_err(|_| AuthError::ResetTokenInvalid)?;
        if secret.is_empty() {
            return Err(AuthError::ResetTokenInvalid);
        }

        Ok(Self {
            reset_id,
            secret: secret.to_string(),
        })
    }
}

fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
