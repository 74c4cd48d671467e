mod common;

use common::{FilePart, auth_header, multipart_body, multipart_header, spawn_app, spawn_app_without_database};
use kamero_api::auth::responses::Role;
use kamero_api::test_support::TestFixtures;
use rocket::http::Status;
use rocket::serde::json::Value;

const PDF_BYTES: &[u8] = b"%PDF-1.4\n%test\n";

fn pdf_part() -> FilePart<'static> {
    FilePart {
        file_name: "thesis.pdf",
        content_type: "application/pdf",
        bytes: PDF_BYTES,
    }
}

#[tokio::test]
async fn non_pdf_uploads_are_rejected_before_storage() {
    let app = spawn_app_without_database().await;
    let token = app.token_for(1, Role::Student, Some(1));

    let body = multipart_body(
        &[("title", "Notes")],
        Some(FilePart {
            file_name: "notes.txt",
            content_type: "text/plain",
            bytes: b"just text",
        }),
    );
    let response = app
        .client
        .post("/student/research")
        .header(multipart_header())
        .header(auth_header(&token))
        .body(body)
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::BadRequest);
    assert_eq!(
        response.into_string().await.as_deref(),
        Some(r#"{"message":"Only PDF files are allowed!"}"#)
    );
    assert!(app.uploaded_files().is_empty());
}

#[tokio::test]
async fn non_pdf_uploads_without_fields_are_still_type_errors() {
    let app = spawn_app_without_database().await;
    let token = app.token_for(1, Role::Student, Some(1));

    let body = multipart_body(
        &[],
        Some(FilePart {
            file_name: "notes.txt",
            content_type: "text/plain",
            bytes: b"just text",
        }),
    );
    let response = app
        .client
        .post("/student/research")
        .header(multipart_header())
        .header(auth_header(&token))
        .body(body)
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::BadRequest);
    assert_eq!(
        response.into_string().await.as_deref(),
        Some(r#"{"message":"Only PDF files are allowed!"}"#)
    );
    assert!(app.uploaded_files().is_empty());
}

#[tokio::test]
async fn pdf_uploads_need_a_title() {
    let app = spawn_app_without_database().await;
    let token = app.token_for(1, Role::Student, Some(1));

    let cases: [&[(&str, &str)]; 2] = [&[], &[("title", "  ")]];
    for fields in cases {
        let response = app
            .client
            .post("/student/research")
            .header(multipart_header())
            .header(auth_header(&token))
            .body(multipart_body(fields, Some(pdf_part())))
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::BadRequest);
        assert_eq!(
            response.into_string().await.as_deref(),
            Some(r#"{"message":"A title is required"}"#)
        );
    }
    assert!(app.uploaded_files().is_empty());
}

#[tokio::test]
async fn uploads_without_a_file_are_rejected() {
    let app = spawn_app_without_database().await;
    let token = app.token_for(1, Role::Student, None);

    let response = app
        .client
        .post("/student/research")
        .header(multipart_header())
        .header(auth_header(&token))
        .body(multipart_body(&[("title", "Empty")], None))
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::BadRequest);
    assert_eq!(
        response.into_string().await.as_deref(),
        Some(r#"{"message":"A research file is required"}"#)
    );
    assert!(app.uploaded_files().is_empty());
}

#[tokio::test]
async fn uploads_require_a_token() {
    let app = spawn_app_without_database().await;

    let response = app
        .client
        .post("/student/research")
        .header(multipart_header())
        .body(multipart_body(&[("title", "Anon")], Some(pdf_part())))
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::Unauthorized);
    assert!(app.uploaded_files().is_empty());
}

#[tokio::test]
async fn lecturers_without_an_institution_cannot_upload() {
    let app = spawn_app_without_database().await;
    let token = app.token_for(2, Role::Lecturer, None);

    let response = app
        .client
        .post("/lecturer/research")
        .header(multipart_header())
        .header(auth_header(&token))
        .body(multipart_body(&[("title", "Orphan")], Some(pdf_part())))
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::Forbidden);
    assert!(app.uploaded_files().is_empty());
}

#[tokio::test]
async fn accepted_upload_is_stored_and_recorded() {
    let Some(app) = spawn_app("upload success test").await else {
        return;
    };
    let fixtures = TestFixtures::new(&app.pool);
    let institution_id = fixtures
        .insert_institution("Kamero University")
        .await
        .expect("insert institution");
    let hash = app.hash("pw");
    let student_id = fixtures
        .insert_user("grace", None, "student", Some(institution_id), &hash)
        .await
        .expect("insert user");
    let token = app.token_for(student_id, Role::Student, Some(institution_id));

    let response = app
        .client
        .post("/student/research")
        .header(multipart_header())
        .header(auth_header(&token))
        .body(multipart_body(
            &[
                ("title", "Soil moisture"),
                ("abstract", "Field study"),
                ("tags", "soil, water"),
            ],
            Some(pdf_part()),
        ))
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::Created);
    let material: Value = response.into_json().await.expect("json body");
    assert_eq!(material["status"], "pending");
    assert_eq!(material["abstract"], "Field study");
    assert_eq!(material["user_id"], student_id);
    assert_eq!(material["institution_id"], institution_id);
    assert_eq!(material["tags"], serde_json::json!(["soil", "water"]));

    let file_url = material["file_url"].as_str().expect("file url");
    let stored = app.uploaded_files();
    assert_eq!(stored.len(), 1);
    let file_name = stored[0]
        .file_name()
        .and_then(|name| name.to_str())
        .expect("file name")
        .to_string();
    assert!(file_name.starts_with("researchFile-"));
    assert!(file_name.ends_with(".pdf"));
    assert!(file_url.ends_with(&file_name));
    assert_eq!(std::fs::read(&stored[0]).expect("read upload"), PDF_BYTES);
}

#[tokio::test]
async fn failed_insert_removes_the_placed_file() {
    let Some(app) = spawn_app("upload cleanup test").await else {
        return;
    };
    let hash = app.hash("pw");
    let student_id = TestFixtures::new(&app.pool)
        .insert_user("heidi", None, "student", None, &hash)
        .await
        .expect("insert user");
    let token = app.token_for(student_id, Role::Student, None);

    // No such institution, so the insert violates its foreign key.
    let response = app
        .client
        .post("/student/research")
        .header(multipart_header())
        .header(auth_header(&token))
        .body(multipart_body(
            &[("title", "Dangling"), ("institution_id", "999999")],
            Some(pdf_part()),
        ))
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::InternalServerError);
    let body: Value = response.into_json().await.expect("json body");
    assert!(body["message"].as_str().is_some_and(|message| !message.is_empty()));
    assert!(app.uploaded_files().is_empty());

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM research_materials")
        .fetch_one(&app.pool)
        .await
        .expect("count rows");
    assert_eq!(rows, 0);
}

#[tokio::test]
async fn lecturer_uploads_are_filed_under_their_institution() {
    let Some(app) = spawn_app("lecturer upload test").await else {
        return;
    };
    let fixtures = TestFixtures::new(&app.pool);
    let own = fixtures.insert_institution("Own").await.expect("institution");
    let other = fixtures.insert_institution("Other").await.expect("institution");
    let hash = app.hash("pw");
    let lecturer_id = fixtures
        .insert_user("ivan", None, "lecturer", Some(own), &hash)
        .await
        .expect("insert user");
    let token = app.token_for(lecturer_id, Role::Lecturer, Some(own));

    let other_id = other.to_string();
    let response = app
        .client
        .post("/lecturer/research")
        .header(multipart_header())
        .header(auth_header(&token))
        .body(multipart_body(
            &[("title", "Syllabus"), ("institution_id", other_id.as_str())],
            Some(pdf_part()),
        ))
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::Created);
    let material: Value = response.into_json().await.expect("json body");
    assert_eq!(material["institution_id"], own);
}
