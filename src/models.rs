use chrono::{DateTime, Utc};
use rocket_db_pools::sqlx::FromRow;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::responses::Role;

#[derive(Debug, Error)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl TryFrom<String> for Role {
    type Error = UnknownRole;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Role::parse(&value).ok_or(UnknownRole(value))
    }
}

// ===== Accounts =====

/// A row of `users`. The password hash and reset-token columns are never
/// serialised into responses.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, JsonSchema)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: Option<String>,
    #[serde(skip_serializing, default)]
    #[schemars(skip)]
    pub password: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub institution_id: Option<i32>,
    #[serde(skip)]
    #[schemars(skip)]
    pub reset_token_id: Option<uuid::Uuid>,
    #[serde(skip)]
    #[schemars(skip)]
    pub reset_password_token: Option<String>,
    #[serde(skip)]
    #[schemars(skip)]
    pub reset_password_expires: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
}

// ===== Catalogue =====

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, JsonSchema)]
pub struct Institution {
    pub id: i32,
    pub name: String,
    pub address: Option<String>,
    pub permissions: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, JsonSchema)]
pub struct ResearchTopic {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, JsonSchema)]
pub struct ResearchMaterial {
    pub id: i32,
    pub title: String,
    #[sqlx(rename = "abstract")]
    #[serde(rename = "abstract")]
    pub summary: Option<String>,
    pub file_url: String,
    pub tags: Vec<String>,
    pub institution_id: Option<i32>,
    pub user_id: i32,
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// Research material as seen by a reviewing lecturer.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, JsonSchema)]
pub struct StudentUpload {
    pub id: i32,
    pub title: String,
    #[sqlx(rename = "abstract")]
    #[serde(rename = "abstract")]
    pub summary: Option<String>,
    pub file_url: String,
    pub tags: Vec<String>,
    pub status: String,
    pub submitted_by: String,
}

// ===== Analytics =====

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, JsonSchema)]
pub struct UserActivityStats {
    pub user_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, JsonSchema)]
pub struct ResearchAccessStats {
    pub access_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SystemAnalytics {
    pub user_activity_stats: UserActivityStats,
    pub research_access_stats: ResearchAccessStats,
}
