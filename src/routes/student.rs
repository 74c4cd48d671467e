use rocket::form::Form;
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket::State;
use rocket_db_pools::sqlx;
use rocket_okapi::openapi;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::models::ResearchMaterial;
use crate::upload::{ResearchUploadForm, SubmissionOwner, UploadStore, store_research_upload};

/// Browse every research material. Each listed item counts as one access in
/// the analytics totals.
#[openapi(tag = "Student")]
#[get("/student/research")]
pub async fn view_available_research(
    user: AuthUser,
    pool: &State<sqlx::PgPool>,
) -> Result<Json<Vec<ResearchMaterial>>, ApiError> {
    let research: Vec<ResearchMaterial> =
        sqlx::query_as("SELECT * FROM research_materials ORDER BY id")
            .fetch_all(pool.inner())
            .await?;

    if !research.is_empty() {
        let ids: Vec<i32> = research.iter().map(|item| item.id).collect();
        sqlx::query(
            r#"INSERT INTO research_access_logs (research_id, user_id)
               SELECT UNNEST($1::INT[]), $2"#,
        )
        .bind(&ids)
        .bind(user.id)
        .execute(pool.inner())
        .await?;
    }

    Ok(Json(research))
}

/// Upload a research PDF. The submission is always attributed to the caller;
/// the institution defaults to the caller's own when the form omits it.
#[post("/student/research", data = "<form>")]
pub async fn upload_research(
    user: AuthUser,
    pool: &State<sqlx::PgPool>,
    store: &State<UploadStore>,
    form: Form<ResearchUploadForm<'_>>,
) -> Result<status::Custom<Json<ResearchMaterial>>, ApiError> {
    let form = form.into_inner();
    let owner = SubmissionOwner {
        user_id: user.id,
        institution_id: form.institution_id.or(user.institution_id),
    };
    let material = store_research_upload(pool.inner(), store.inner(), form, owner).await?;

    Ok(status::Custom(Status::Created, Json(material)))
}
