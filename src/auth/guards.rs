use rocket::Request;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket_okapi::request::OpenApiFromRequest;

use crate::auth::jwt::AccessTokenClaims;
use crate::auth::responses::Role;
use crate::auth::{AuthError, AuthResult, AuthState};

/// Header carrying the raw bearer token. No scheme prefix is stripped.
pub const AUTHORIZATION_HEADER: &str = "authorization";

/// Subject id recorded on the request once the token has been verified.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthenticatedSubject(pub Option<i32>);

#[derive(Debug, Clone, OpenApiFromRequest)]
pub struct AuthUser {
    pub id: i32,
    pub role: Role,
    pub institution_id: Option<i32>,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }
}

impl From<AccessTokenClaims> for AuthUser {
    fn from(claims: AccessTokenClaims) -> Self {
        Self {
            id: claims.id,
            role: claims.role,
            institution_id: claims.institution_id,
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthUser {
    type Error = AuthError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match extract_user(request) {
            Ok(user) => {
                request.local_cache(|| AuthenticatedSubject(Some(user.id)));
                Outcome::Success(user)
            }
            Err(err) => {
                log::debug!("rejected {} {}: {}", request.method(), request.uri(), err);
                Outcome::Error((err.status(), err))
            }
        }
    }
}

#[derive(Debug, Clone, OpenApiFromRequest)]
pub struct RequireAdmin(pub AuthUser);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RequireAdmin {
    type Error = AuthError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match AuthUser::from_request(request).await {
            Outcome::Success(user) if user.is_admin() => Outcome::Success(RequireAdmin(user)),
            Outcome::Success(user) => {
                log::warn!("user {} with role {} denied admin route", user.id, user.role);
                Outcome::Error((Status::Forbidden, AuthError::Forbidden))
            }
            Outcome::Error(err) => Outcome::Error(err),
            Outcome::Forward(status) => Outcome::Forward(status),
        }
    }
}

/// A lecturer together with the institution their data access is scoped to.
#[derive(Debug, Clone, OpenApiFromRequest)]
pub struct RequireLecturer {
    pub user: AuthUser,
    pub institution_id: i32,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RequireLecturer {
    type Error = AuthError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match AuthUser::from_request(request).await {
            Outcome::Success(user) => match (user.role, user.institution_id) {
                (Role::Lecturer, Some(institution_id)) => Outcome::Success(RequireLecturer {
                    user,
                    institution_id,
                }),
                (role, _) => {
                    log::warn!(
                        "user {} with role {} denied lecturer route",
                        user.id,
                        role
                    );
                    Outcome::Error((Status::Forbidden, AuthError::Forbidden))
                }
            },
            Outcome::Error(err) => Outcome::Error(err),
            Outcome::Forward(status) => Outcome::Forward(status),
        }
    }
}

fn extract_user(request: &Request<'_>) -> AuthResult<AuthUser> {
    let auth_state = request
        .rocket()
        .state::<AuthState>()
        .ok_or_else(|| AuthError::Config("AuthState missing from state".into()))?;

    let token = request.headers().get_one(AUTHORIZATION_HEADER);
    let claims = auth_state.jwt_service.verify(token)?;

    Ok(AuthUser::from(claims))
}
