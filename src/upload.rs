//! Research file uploads.
//!
//! Rocket buffers the multipart file part into a [`TempFile`] outside the
//! uploads root. The declared content type is checked before anything is
//! moved into the uploads root, so a rejected request never leaves bytes
//! there. An accepted file gets a collision-resistant name and is recorded
//! in `research_materials`; if that insert fails the file this request placed
//! is removed again before the error is returned.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rand::Rng;
use rocket::fs::TempFile;
use rocket::http::ContentType;
use rocket_db_pools::sqlx::{self, PgPool};
use thiserror::Error;

use crate::error::ApiError;
use crate::models::ResearchMaterial;

/// Multipart field carrying the research file.
pub const RESEARCH_FILE_FIELD: &str = "researchFile";

const DEFAULT_MAX_FILE_BYTES: u64 = 25 * 1024 * 1024;
const MAX_EXTENSION_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Only PDF files are allowed!")]
    UnsupportedType(Option<String>),
    #[error("A research file is required")]
    MissingFile,
    #[error("A title is required")]
    MissingTitle,
    #[error("failed to store upload: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub uploads_dir: PathBuf,
    pub max_file_bytes: u64,
}

impl UploadConfig {
    pub fn from_env() -> Self {
        let uploads_dir = std::env::var("KAMERO_UPLOADS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("uploads"));
        let max_file_bytes = std::env::var("KAMERO_UPLOAD_MAX_BYTES")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_MAX_FILE_BYTES);

        Self {
            uploads_dir,
            max_file_bytes,
        }
    }

    pub fn new(uploads_dir: impl Into<PathBuf>) -> Self {
        Self {
            uploads_dir: uploads_dir.into(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }
}

/// Multipart body accepted by the research upload routes.
#[derive(Debug, FromForm)]
pub struct ResearchUploadForm<'r> {
    #[field(name = "researchFile")]
    pub research_file: Option<TempFile<'r>>,
    pub title: Option<String>,
    #[field(name = "abstract")]
    pub summary: Option<String>,
    pub tags: Option<String>,
    pub institution_id: Option<i32>,
}

/// Only PDFs are accepted.
pub fn is_acceptable(content_type: Option<&ContentType>) -> bool {
    content_type
        .map(|ct| ct.top() == "application" && ct.sub() == "pdf")
        .unwrap_or(false)
}

/// `<field>-<epoch millis>-<random below 1e9><.ext>`, keeping the extension
/// of the client-supplied name when it is a plain alphanumeric one.
pub fn unique_file_name<R: Rng + ?Sized>(
    field: &str,
    original_name: Option<&str>,
    now: DateTime<Utc>,
    rng: &mut R,
) -> String {
    let suffix: u32 = rng.gen_range(0..1_000_000_000);
    let extension = original_name.and_then(safe_extension).unwrap_or_default();
    format!("{}-{}-{}{}", field, now.timestamp_millis(), suffix, extension)
}

fn safe_extension(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let extension = Path::new(base).extension()?.to_str()?;
    if extension.is_empty()
        || extension.len() > MAX_EXTENSION_LEN
        || !extension.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(format!(".{}", extension))
}

/// Split a comma separated tag list, dropping blanks.
pub fn parse_tags(raw: Option<&str>) -> Vec<String> {
    raw.map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// The shared uploads directory. Each request only ever removes the file it
/// placed itself.
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_root(&self) -> Result<(), UploadError> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Move the upload under `name`. A failed copy may leave a partial file
    /// behind, which is removed before the error is returned.
    pub async fn place(&self, file: &mut TempFile<'_>, name: &str) -> Result<PathBuf, UploadError> {
        let destination = self.root.join(name);
        if let Err(err) = file.move_copy_to(&destination).await {
            self.discard_partial(&destination).await;
            return Err(err.into());
        }
        Ok(destination)
    }

    pub async fn discard(&self, path: &Path) -> Result<(), UploadError> {
        tokio::fs::remove_file(path).await?;
        Ok(())
    }

    async fn discard_partial(&self, path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => log::warn!("removed partial upload {}", path.display()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => log::error!("failed to remove partial upload {}: {}", path.display(), err),
        }
    }
}

/// Owner and institution a submission is filed under.
#[derive(Debug, Clone, Copy)]
pub struct SubmissionOwner {
    pub user_id: i32,
    pub institution_id: Option<i32>,
}

/// Validate, place and record one research upload.
pub async fn store_research_upload(
    pool: &PgPool,
    store: &UploadStore,
    mut form: ResearchUploadForm<'_>,
    owner: SubmissionOwner,
) -> Result<ResearchMaterial, ApiError> {
    let mut file = form.research_file.take().ok_or(UploadError::MissingFile)?;

    if !is_acceptable(file.content_type()) {
        let declared = file.content_type().map(|ct| ct.to_string());
        log::debug!(
            "rejected upload from user {} with content type {:?}",
            owner.user_id,
            declared
        );
        return Err(UploadError::UnsupportedType(declared).into());
    }

    let title = form
        .title
        .take()
        .map(|title| title.trim().to_string())
        .filter(|title| !title.is_empty())
        .ok_or(UploadError::MissingTitle)?;

    let original_name = file
        .raw_name()
        .map(|name| name.dangerous_unsafe_unsanitized_raw().as_str().to_string());
    let file_name = {
        let mut rng = rand::thread_rng();
        unique_file_name(
            RESEARCH_FILE_FIELD,
            original_name.as_deref(),
            Utc::now(),
            &mut rng,
        )
    };

    let path = store.place(&mut file, &file_name).await?;
    let file_url = path.to_string_lossy().into_owned();
    let tags = parse_tags(form.tags.as_deref());

    let inserted = sqlx::query_as::<_, ResearchMaterial>(
        r#"INSERT INTO research_materials (title, abstract, file_url, tags, institution_id, user_id, status)
           VALUES ($1, $2, $3, $4, $5, $6, 'pending')
           RETURNING *"#,
    )
    .bind(&title)
    .bind(&form.summary)
    .bind(&file_url)
    .bind(&tags)
    .bind(owner.institution_id)
    .bind(owner.user_id)
    .fetch_one(pool)
    .await;

    match inserted {
        Ok(material) => {
            log::info!(
                "user {} uploaded research {} to {}",
                owner.user_id,
                material.id,
                file_url
            );
            Ok(material)
        }
        Err(err) => {
            if let Err(cleanup) = store.discard(&path).await {
                log::error!("failed to remove orphaned upload {}: {}", file_url, cleanup);
            }
            Err(ApiError::DatabaseError(err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn accepts_only_pdf() {
        assert!(is_acceptable(Some(&ContentType::PDF)));
        assert!(is_acceptable(Some(
            &ContentType::parse_flexible("Application/PDF").expect("media type")
        )));
        assert!(!is_acceptable(Some(&ContentType::Plain)));
        assert!(!is_acceptable(Some(&ContentType::PNG)));
        assert!(!is_acceptable(Some(&ContentType::Binary)));
        assert!(!is_acceptable(None));
    }

    #[test]
    fn file_names_keep_field_time_and_extension() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let name = unique_file_name("researchFile", Some("thesis.final.pdf"), now, &mut rng);

        let parts: Vec<&str> = name.splitn(3, '-').collect();
        assert_eq!(parts[0], "researchFile");
        assert_eq!(parts[1], "1700000000123");
        let (suffix, extension) = parts[2].split_once('.').expect("extension");
        assert!(suffix.parse::<u32>().expect("numeric suffix") < 1_000_000_000);
        assert_eq!(extension, "pdf");
    }

    #[test]
    fn file_names_differ_between_draws() {
        let now = Utc::now();
        let mut rng = StdRng::seed_from_u64(42);
        let first = unique_file_name("researchFile", Some("a.pdf"), now, &mut rng);
        let second = unique_file_name("researchFile", Some("a.pdf"), now, &mut rng);
        assert_ne!(first, second);
    }

    #[test]
    fn suspicious_extensions_are_dropped() {
        let now = Utc::now();
        let mut rng = StdRng::seed_from_u64(1);
        for original in ["noext", "../../etc/passwd", "evil.p df", "x.", "dir.pdf/name"] {
            let name = unique_file_name("researchFile", Some(original), now, &mut rng);
            assert!(!name.contains('.'), "{original:?} produced {name:?}");
            assert!(!name.contains('/'));
        }
        let name = unique_file_name("researchFile", None, now, &mut rng);
        assert!(!name.contains('.'));
    }

    #[test]
    fn tags_are_split_and_trimmed() {
        assert_eq!(
            parse_tags(Some("soil, water ,, climate")),
            vec!["soil", "water", "climate"]
        );
        assert!(parse_tags(None).is_empty());
        assert!(parse_tags(Some(" , ")).is_empty());
    }

    #[tokio::test]
    async fn partial_copies_are_removed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = UploadStore::new(dir.path());
        let partial = store.root().join("researchFile-1-3.pdf");
        tokio::fs::write(&partial, b"%PDF-1.").await.expect("write");

        store.discard_partial(&partial).await;
        assert!(!partial.exists());

        // Nothing to remove when the copy never created the file.
        store.discard_partial(&partial).await;
    }

    #[tokio::test]
    async fn failed_placement_leaves_nothing_behind() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = UploadStore::new(dir.path().join("missing-root"));
        let mut file = TempFile::Buffered {
            content: b"%PDF-1.4",
        };

        let result = store.place(&mut file, "researchFile-1-4.pdf").await;

        assert!(matches!(result, Err(UploadError::Io(_))));
        assert!(!store.root().join("researchFile-1-4.pdf").exists());
    }

    #[tokio::test]
    async fn discard_removes_only_the_named_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = UploadStore::new(dir.path().join("uploads"));
        store.ensure_root().await.expect("create root");

        let mine = store.root().join("researchFile-1-1.pdf");
        let theirs = store.root().join("researchFile-1-2.pdf");
        tokio::fs::write(&mine, b"%PDF-1.4").await.expect("write");
        tokio::fs::write(&theirs, b"%PDF-1.4").await.expect("write");

        store.discard(&mine).await.expect("discard");

        assert!(!mine.exists());
        assert!(theirs.exists());
        assert!(matches!(
            store.discard(&mine).await,
            Err(UploadError::Io(_))
        ));
    }
}
