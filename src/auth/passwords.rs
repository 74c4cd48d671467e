use argon2::{
    Algorithm, Argon2, ParamsBuilder, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::SaltString,
};
use rand::RngCore;

use crate::auth::{AuthError, AuthResult};

const SALT_LEN: usize = 16;

/// Argon2id work factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordCost {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordCost {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024, // 19 MiB
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl PasswordCost {
    /// Lowest parameters argon2 accepts.
    pub fn minimal() -> Self {
        Self {
            memory_kib: argon2::Params::MIN_M_COST,
            iterations: argon2::Params::MIN_T_COST,
            parallelism: argon2::Params::MIN_P_COST,
        }
    }

    /// Defaults overridden by `KAMERO_PASSWORD_MEMORY_KIB`,
    /// `KAMERO_PASSWORD_ITERATIONS` and `KAMERO_PASSWORD_PARALLELISM`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            memory_kib: env_u32("KAMERO_PASSWORD_MEMORY_KIB", defaults.memory_kib),
            iterations: env_u32("KAMERO_PASSWORD_ITERATIONS", defaults.iterations),
            parallelism: env_u32("KAMERO_PASSWORD_PARALLELISM", defaults.parallelism),
        }
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
}

#[derive(Clone)]
pub struct PasswordService {
    argon2: Argon2<'static>,
    // Digest of a random secret, hashed with the same cost as real accounts.
    dummy_hash: String,
}

impl PasswordService {
    pub fn new(cost: PasswordCost) -> AuthResult<Self> {
        let mut builder = ParamsBuilder::new();
        builder.m_cost(cost.memory_kib);
        builder.t_cost(cost.iterations);
        builder.p_cost(cost.parallelism);
        let params = builder.build().map_err(AuthError::from)?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let mut service = Self {
            argon2,
            dummy_hash: String::new(),
        };

        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        service.dummy_hash = service.hash_password(&hex::encode(secret))?;
        Ok(service)
    }

    /// Spend one verification on a password that matches no account, so an
    /// unknown username costs as much as a wrong password.
    pub fn verify_dummy(&self, password: &str) {
        let _ = self.verify_password(password, &self.dummy_hash);
    }

    pub fn hash_password(&self, password: &str) -> AuthResult<String> {
        let mut salt_bytes = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes).map_err(AuthError::from)?;
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(AuthError::from)?
            .to_string();
        Ok(hash)
    }

    /// A mismatch is `Ok(false)`; only a malformed digest or a primitive
    /// failure is an error.
    pub fn verify_password(&self, password: &str, encoded: &str) -> AuthResult<bool> {
        let parsed = PasswordHash::new(encoded)?;
        match self.argon2.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(err) => Err(AuthError::from(err)),
        }
    }
}
