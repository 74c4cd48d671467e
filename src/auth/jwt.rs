use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};

use crate::auth::responses::Role;
use crate::auth::{AuthConfig, AuthError, AuthResult};

/// Claims embedded in every bearer token.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AccessTokenClaims {
    pub id: i32,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub institution_id: Option<i32>,
    pub iat: i64,
    pub exp: i64,
}

/// Identity a token is minted for.
#[derive(Debug, Clone, Copy)]
pub struct TokenSubject {
    pub id: i32,
    pub role: Role,
    pub institution_id: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct SignedAccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_token_ttl: Duration,
}

impl JwtService {
    pub fn from_config(config: &AuthConfig) -> AuthResult<Self> {
        if config.jwt_secret.is_empty() {
            return Err(AuthError::Config("jwt secret must not be empty".into()));
        }
        let secret_bytes = config.jwt_secret.as_bytes();
        let encoding_key = EncodingKey::from_secret(secret_bytes);
        let decoding_key = DecodingKey::from_secret(secret_bytes);

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Ok(Self {
            encoding_key,
            decoding_key,
            validation,
            access_token_ttl: Duration::seconds(config.access_token_ttl_secs),
        })
    }

    pub fn issue_access_token(&self, subject: TokenSubject) -> AuthResult<SignedAccessToken> {
        self.issue_access_token_at(subject, Utc::now())
    }

    pub fn issue_access_token_at(
        &self,
        subject: TokenSubject,
        issued_at: DateTime<Utc>,
    ) -> AuthResult<SignedAccessToken> {
        let expires_at = issued_at + self.access_token_ttl;

        let claims = AccessTokenClaims {
            id: subject.id,
            role: subject.role,
            institution_id: subject.institution_id,
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;

        Ok(SignedAccessToken { token, expires_at })
    }

    /// Verify a token exactly as presented. `None` means the caller supplied
    /// nothing, which is reported separately from a bad or expired token.
    pub fn verify(&self, token: Option<&str>) -> AuthResult<AccessTokenClaims> {
        let token = match token {
            Some(token) if !token.is_empty() => token,
            _ => return Err(AuthError::MissingToken),
        };

        decode::<AccessTokenClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::TokenInvalid,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_JWT_SECRET: &str = "super-secret-test-key";

    fn service() -> JwtService {
        JwtService::from_config(&AuthConfig::for_testing(TEST_JWT_SECRET)).expect("jwt service")
    }

    fn lecturer() -> TokenSubject {
        TokenSubject {
            id: 7,
            role: Role::Lecturer,
            institution_id: None,
        }
    }

    #[test]
    fn issues_and_verifies_access_tokens() {
        let service = service();
        let token = service.issue_access_token(lecturer()).expect("issue token");

        let claims = service.verify(Some(&token.token)).expect("verify token");

        assert_eq!(claims.id, 7);
        assert_eq!(claims.role, Role::Lecturer);
        assert_eq!(claims.institution_id, None);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn expired_tokens_are_invalid_not_missing() {
        let service = service();
        let issued_at = Utc::now() - Duration::hours(2);
        let token = service
            .issue_access_token_at(lecturer(), issued_at)
            .expect("issue token");

        let err = service.verify(Some(&token.token)).expect_err("expired");
        assert!(matches!(err, AuthError::TokenExpired));
        assert_eq!(err.status(), rocket::http::Status::Forbidden);
    }

    #[test]
    fn token_just_before_expiry_is_still_valid() {
        let service = service();
        let issued_at = Utc::now() - Duration::seconds(3590);
        let token = service
            .issue_access_token_at(lecturer(), issued_at)
            .expect("issue token");

        assert!(service.verify(Some(&token.token)).is_ok());
    }

    #[test]
    fn absent_token_is_reported_as_missing() {
        let service = service();
        assert!(matches!(service.verify(None), Err(AuthError::MissingToken)));
        assert!(matches!(service.verify(Some("")), Err(AuthError::MissingToken)));
    }

    #[test]
    fn rejects_tampered_and_foreign_tokens() {
        let service = service();
        let token = service.issue_access_token(lecturer()).expect("issue token");

        let mut tampered = token.token.clone();
        tampered.push('x');
        assert!(matches!(
            service.verify(Some(&tampered)),
            Err(AuthError::TokenInvalid)
        ));

        let other = JwtService::from_config(&AuthConfig::for_testing("another-secret"))
            .expect("jwt service");
        assert!(matches!(
            other.verify(Some(&token.token)),
            Err(AuthError::TokenInvalid)
        ));

        assert!(matches!(
            service.verify(Some("Bearer not.a.token")),
            Err(AuthError::TokenInvalid)
        ));
    }

    #[test]
    fn carries_institution_scope() {
        let service = service();
        let subject = TokenSubject {
            id: 3,
            role: Role::Lecturer,
            institution_id: Some(12),
        };
        let token = service.issue_access_token(subject).expect("issue token");
        let claims = service.verify(Some(&token.token)).expect("verify");
        assert_eq!(claims.institution_id, Some(12));
    }
}
