//! Lecturer views, scoped to the institution carried in the lecturer's token.

use rocket::form::Form;
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket::State;
use rocket_db_pools::sqlx;
use rocket_okapi::openapi;

use crate::auth::RequireLecturer;
use crate::error::ApiError;
use crate::models::{Institution, ResearchMaterial, StudentUpload};
use crate::upload::{ResearchUploadForm, SubmissionOwner, UploadStore, store_research_upload};

/// Institutions the calling lecturer is assigned to
#[openapi(tag = "Lecturer")]
#[get("/lecturer/institutions")]
pub async fn view_assigned_institutions(
    lecturer: RequireLecturer,
    pool: &State<sqlx::PgPool>,
) -> Result<Json<Vec<Institution>>, ApiError> {
    let institutions: Vec<Institution> = sqlx::query_as(
        r#"SELECT i.*
           FROM institutions i
           JOIN users u ON i.id = u.institution_id
           WHERE u.id = $1"#,
    )
    .bind(lecturer.user.id)
    .fetch_all(pool.inner())
    .await?;

    Ok(Json(institutions))
}

/// Upload a research PDF on behalf of the lecturer's institution.
///
/// Any `institution_id` in the form is ignored.
#[post("/lecturer/research", data = "<form>")]
pub async fn upload_research(
    lecturer: RequireLecturer,
    pool: &State<sqlx::PgPool>,
    store: &State<UploadStore>,
    form: Form<ResearchUploadForm<'_>>,
) -> Result<status::Custom<Json<ResearchMaterial>>, ApiError> {
    let owner = SubmissionOwner {
        user_id: lecturer.user.id,
        institution_id: Some(lecturer.institution_id),
    };
    let material = store_research_upload(pool.inner(), store.inner(), form.into_inner(), owner).await?;

    Ok(status::Custom(Status::Created, Json(material)))
}

/// Student submissions filed under the lecturer's institution
#[openapi(tag = "Lecturer")]
#[get("/lecturer/student-uploads")]
pub async fn review_student_uploads(
    lecturer: RequireLecturer,
    pool: &State<sqlx::PgPool>,
) -> Result<Json<Vec<StudentUpload>>, ApiError> {
    let uploads: Vec<StudentUpload> = sqlx::query_as(
        r#"SELECT rm.id, rm.title, rm.abstract, rm.file_url, rm.tags, rm.status,
                  u.username AS submitted_by
           FROM research_materials rm
           JOIN users u ON rm.user_id = u.id
           WHERE rm.institution_id = $1 AND u.role = 'student'
           ORDER BY rm.id"#,
    )
    .bind(lecturer.institution_id)
    .fetch_all(pool.inner())
    .await?;

    Ok(Json(uploads))
}

/// All research filed under the lecturer's institution
#[openapi(tag = "Lecturer")]
#[get("/lecturer/research")]
pub async fn view_institution_research(
    lecturer: RequireLecturer,
    pool: &State<sqlx::PgPool>,
) -> Result<Json<Vec<ResearchMaterial>>, ApiError> {
    let research: Vec<ResearchMaterial> = sqlx::query_as(
        "SELECT * FROM research_materials WHERE institution_id = $1 ORDER BY id",
    )
    .bind(lecturer.institution_id)
    .fetch_all(pool.inner())
    .await?;

    Ok(Json(research))
}
