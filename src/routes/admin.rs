//! Administrator maintenance of accounts, institutions and research topics.
//!
//! The `manage_*` endpoints take a single body tagged with an `action`
//! (`create`, `read`, `update` or `delete`); every route here requires an
//! administrator token.

use rocket::http::Status;
use rocket::response::{self, Responder, status};
use rocket::serde::json::Json;
use rocket::{Request, State};
use rocket_db_pools::sqlx;
use rocket_okapi::gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::Responses;
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;
use rocket_okapi::response::OpenApiResponderInner;
use serde::{Deserialize, Serialize};

use crate::auth::responses::Role;
use crate::auth::{AuthState, RequireAdmin};
use crate::error::ApiError;
use crate::models::{
    Institution, ResearchAccessStats, ResearchTopic, SystemAnalytics, User, UserActivityStats,
};

/// Result of a tagged management action.
#[derive(Debug)]
pub enum ManageOutcome<T> {
    Created(T),
    Found(T),
    Deleted,
}

impl<'r, T: Serialize> Responder<'r, 'static> for ManageOutcome<T> {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        match self {
            ManageOutcome::Created(body) => {
                status::Custom(Status::Created, Json(body)).respond_to(request)
            }
            ManageOutcome::Found(body) => Json(body).respond_to(request),
            ManageOutcome::Deleted => status::NoContent.respond_to(request),
        }
    }
}

impl<T: Serialize + JsonSchema + Send> OpenApiResponderInner for ManageOutcome<T> {
    fn responses(generator: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        Json::<T>::responses(generator)
    }
}

/// Fallback for any `action` value the endpoint does not know.
fn invalid_action() -> ApiError {
    ApiError::BadRequest("Invalid action".to_string())
}

// ===== Users =====

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ManageUserRequest {
    Create {
        username: String,
        password: String,
        role: Role,
        #[serde(default, alias = "institutionId")]
        institution_id: Option<i32>,
        #[serde(default)]
        email: Option<String>,
    },
    Read {
        id: i32,
    },
    Update {
        id: i32,
        username: String,
        password: String,
        role: Role,
        #[serde(default, alias = "institutionId")]
        institution_id: Option<i32>,
        #[serde(default)]
        email: Option<String>,
    },
    Delete {
        id: i32,
    },
    #[serde(other)]
    #[schemars(skip)]
    Unknown,
}

fn user_not_found() -> ApiError {
    ApiError::NotFound("User not found".to_string())
}

/// Create, read, update or delete a user account
#[openapi(tag = "Admin")]
#[post("/admin/users", data = "<request>")]
pub async fn manage_users(
    admin: RequireAdmin,
    auth: &State<AuthState>,
    pool: &State<sqlx::PgPool>,
    request: Json<ManageUserRequest>,
) -> Result<ManageOutcome<User>, ApiError> {
    match request.into_inner() {
        ManageUserRequest::Create {
            username,
            password,
            role,
            institution_id,
            email,
        } => {
            let password_hash = auth.password_service.hash_password(&password)?;
            let user: User = sqlx::query_as(
                r#"INSERT INTO users (username, password, role, institution_id, email)
                   VALUES ($1, $2, $3, $4, $5)
                   RETURNING *"#,
            )
            .bind(&username)
            .bind(password_hash)
            .bind(role.as_str())
            .bind(institution_id)
            .bind(&email)
            .fetch_one(pool.inner())
            .await?;

            log::info!("admin {} created {} user {}", admin.0.id, user.role, user.id);
            Ok(ManageOutcome::Created(user))
        }
        ManageUserRequest::Read { id } => {
            let user: User = sqlx::query_as("SELECT * FROM users WHERE id = $1")
                .bind(id)
                .fetch_optional(pool.inner())
                .await?
                .ok_or_else(user_not_found)?;
            Ok(ManageOutcome::Found(user))
        }
        ManageUserRequest::Update {
            id,
            username,
            password,
            role,
            institution_id,
            email,
        } => {
            let password_hash = auth.password_service.hash_password(&password)?;
            let user: User = sqlx::query_as(
                r#"UPDATE users
                   SET username = $1, password = $2, role = $3, institution_id = $4, email = $5
                   WHERE id = $6
                   RETURNING *"#,
            )
            .bind(&username)
            .bind(password_hash)
            .bind(role.as_str())
            .bind(institution_id)
            .bind(&email)
            .bind(id)
            .fetch_optional(pool.inner())
            .await?
            .ok_or_else(user_not_found)?;

            log::info!("admin {} updated user {}", admin.0.id, user.id);
            Ok(ManageOutcome::Found(user))
        }
        ManageUserRequest::Delete { id } => {
            let deleted = sqlx::query("DELETE FROM users WHERE id = $1")
                .bind(id)
                .execute(pool.inner())
                .await?;
            if deleted.rows_affected() == 0 {
                return Err(user_not_found());
            }

            log::info!("admin {} deleted user {}", admin.0.id, id);
            Ok(ManageOutcome::Deleted)
        }
        ManageUserRequest::Unknown => Err(invalid_action()),
    }
}

/// List every user account
#[openapi(tag = "Admin")]
#[get("/admin/users")]
pub async fn list_users(
    _admin: RequireAdmin,
    pool: &State<sqlx::PgPool>,
) -> Result<Json<Vec<User>>, ApiError> {
    let users: Vec<User> = sqlx::query_as("SELECT * FROM users ORDER BY id")
        .fetch_all(pool.inner())
        .await?;

    Ok(Json(users))
}

// ===== Institutions =====

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ManageInstitutionRequest {
    Create {
        name: String,
        #[serde(default)]
        address: Option<String>,
    },
    Read {
        id: i32,
    },
    Update {
        id: i32,
        name: String,
        #[serde(default)]
        address: Option<String>,
    },
    Delete {
        id: i32,
    },
    #[serde(other)]
    #[schemars(skip)]
    Unknown,
}

fn institution_not_found() -> ApiError {
    ApiError::NotFound("Institution not found".to_string())
}

/// Create, read, update or delete an institution
#[openapi(tag = "Admin")]
#[post("/admin/institutions", data = "<request>")]
pub async fn manage_institutions(
    admin: RequireAdmin,
    pool: &State<sqlx::PgPool>,
    request: Json<ManageInstitutionRequest>,
) -> Result<ManageOutcome<Institution>, ApiError> {
    match request.into_inner() {
        ManageInstitutionRequest::Create { name, address } => {
            let institution: Institution = sqlx::query_as(
                "INSERT INTO institutions (name, address) VALUES ($1, $2) RETURNING *",
            )
            .bind(&name)
            .bind(&address)
            .fetch_one(pool.inner())
            .await?;

            log::info!("admin {} created institution {}", admin.0.id, institution.id);
            Ok(ManageOutcome::Created(institution))
        }
        ManageInstitutionRequest::Read { id } => {
            let institution: Institution =
                sqlx::query_as("SELECT * FROM institutions WHERE id = $1")
                    .bind(id)
                    .fetch_optional(pool.inner())
                    .await?
                    .ok_or_else(institution_not_found)?;
            Ok(ManageOutcome::Found(institution))
        }
        ManageInstitutionRequest::Update { id, name, address } => {
            let institution: Institution = sqlx::query_as(
                "UPDATE institutions SET name = $1, address = $2 WHERE id = $3 RETURNING *",
            )
            .bind(&name)
            .bind(&address)
            .bind(id)
            .fetch_optional(pool.inner())
            .await?
            .ok_or_else(institution_not_found)?;
            Ok(ManageOutcome::Found(institution))
        }
        ManageInstitutionRequest::Delete { id } => {
            let deleted = sqlx::query("DELETE FROM institutions WHERE id = $1")
                .bind(id)
                .execute(pool.inner())
                .await?;
            if deleted.rows_affected() == 0 {
                return Err(institution_not_found());
            }

            log::info!("admin {} deleted institution {}", admin.0.id, id);
            Ok(ManageOutcome::Deleted)
        }
        ManageInstitutionRequest::Unknown => Err(invalid_action()),
    }
}

/// List every institution
#[openapi(tag = "Admin")]
#[get("/admin/institutions")]
pub async fn list_institutions(
    _admin: RequireAdmin,
    pool: &State<sqlx::PgPool>,
) -> Result<Json<Vec<Institution>>, ApiError> {
    let institutions: Vec<Institution> =
        sqlx::query_as("SELECT * FROM institutions ORDER BY name ASC, id ASC")
            .fetch_all(pool.inner())
            .await?;

    Ok(Json(institutions))
}

// ===== Research topics =====

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ManageResearchTopicRequest {
    Create {
        title: String,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        tags: Vec<String>,
    },
    Read {
        id: i32,
    },
    Update {
        id: i32,
        title: String,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        tags: Vec<String>,
    },
    Delete {
        id: i32,
    },
    #[serde(other)]
    #[schemars(skip)]
    Unknown,
}

fn research_topic_not_found() -> ApiError {
    ApiError::NotFound("Research topic not found".to_string())
}

/// Create, read, update or delete a research topic
#[openapi(tag = "Admin")]
#[post("/admin/research-topics", data = "<request>")]
pub async fn manage_research_topics(
    admin: RequireAdmin,
    pool: &State<sqlx::PgPool>,
    request: Json<ManageResearchTopicRequest>,
) -> Result<ManageOutcome<ResearchTopic>, ApiError> {
    match request.into_inner() {
        ManageResearchTopicRequest::Create {
            title,
            description,
            tags,
        } => {
            let topic: ResearchTopic = sqlx::query_as(
                "INSERT INTO research_topics (title, description, tags) VALUES ($1, $2, $3) RETURNING *",
            )
            .bind(&title)
            .bind(&description)
            .bind(&tags)
            .fetch_one(pool.inner())
            .await?;

            log::info!("admin {} created research topic {}", admin.0.id, topic.id);
            Ok(ManageOutcome::Created(topic))
        }
        ManageResearchTopicRequest::Read { id } => {
            let topic: ResearchTopic =
                sqlx::query_as("SELECT * FROM research_topics WHERE id = $1")
                    .bind(id)
                    .fetch_optional(pool.inner())
                    .await?
                    .ok_or_else(research_topic_not_found)?;
            Ok(ManageOutcome::Found(topic))
        }
        ManageResearchTopicRequest::Update {
            id,
            title,
            description,
            tags,
        } => {
            let topic: ResearchTopic = sqlx::query_as(
                r#"UPDATE research_topics
                   SET title = $1, description = $2, tags = $3
                   WHERE id = $4
                   RETURNING *"#,
            )
            .bind(&title)
            .bind(&description)
            .bind(&tags)
            .bind(id)
            .fetch_optional(pool.inner())
            .await?
            .ok_or_else(research_topic_not_found)?;
            Ok(ManageOutcome::Found(topic))
        }
        ManageResearchTopicRequest::Delete { id } => {
            let deleted = sqlx::query("DELETE FROM research_topics WHERE id = $1")
                .bind(id)
                .execute(pool.inner())
                .await?;
            if deleted.rows_affected() == 0 {
                return Err(research_topic_not_found());
            }

            log::info!("admin {} deleted research topic {}", admin.0.id, id);
            Ok(ManageOutcome::Deleted)
        }
        ManageResearchTopicRequest::Unknown => Err(invalid_action()),
    }
}

/// List every research topic
#[openapi(tag = "Admin")]
#[get("/admin/research-topics")]
pub async fn list_research_topics(
    _admin: RequireAdmin,
    pool: &State<sqlx::PgPool>,
) -> Result<Json<Vec<ResearchTopic>>, ApiError> {
    let topics: Vec<ResearchTopic> = sqlx::query_as("SELECT * FROM research_topics ORDER BY id")
        .fetch_all(pool.inner())
        .await?;

    Ok(Json(topics))
}

// ===== Analytics =====

/// Account totals and research access counts
#[openapi(tag = "Admin")]
#[get("/admin/analytics")]
pub async fn view_system_analytics(
    _admin: RequireAdmin,
    pool: &State<sqlx::PgPool>,
) -> Result<Json<SystemAnalytics>, ApiError> {
    let user_activity_stats: UserActivityStats =
        sqlx::query_as("SELECT COUNT(*) AS user_count FROM users")
            .fetch_one(pool.inner())
            .await?;

    let research_access_stats: ResearchAccessStats =
        sqlx::query_as("SELECT COUNT(*) AS access_count FROM research_access_logs")
            .fetch_one(pool.inner())
            .await?;

    Ok(Json(SystemAnalytics {
        user_activity_stats,
        research_access_stats,
    }))
}
