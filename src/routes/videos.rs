use axum::extract::State;
use axum::Json;
use axum_typed_multipart::{FieldData, TryFromMultipart, TypedMultipart, TypedMultipartError};
use bytes::Bytes;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::{FromRow, PgPool};
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::auth::{current_user, User};
use crate::errors::AppError;
use crate::routes::categories::Category;
use crate::InnerState;

#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub video_url: String,
    pub user_id: String,
    pub duration: i32,
    pub created_at: Option<NaiveDateTime>,
    #[sqlx(skip)]
    pub categories: Vec<Category>,
}

#[derive(TryFromMultipart)]
pub struct VideoUploadRequest {
    /// The binary file part. Its absence is our 400, so the extractor must
    /// not reject the request itself.
    #[form_data(limit = "512MiB")]
    pub video: Option<FieldData<Bytes>>,
    pub title: Option<String>,
    pub description: Option<String>,
    /// JSON-encoded array of category id strings, e.g. `["cat-1","cat-2"]`.
    pub categories: Option<String>,
}

/// The validated multipart payload, ready for the storage and persistence
/// steps.
#[derive(Debug)]
pub struct IngestionInput {
    pub contents: Bytes,
    pub file_name: String,
    pub title: String,
    pub description: Option<String>,
    pub categories: Vec<String>,
}

impl IngestionInput {
    pub fn from_payload(payload: VideoUploadRequest) -> Result<Self, AppError> {
        let file = payload.video.map(|f| {
            let name = f
                .metadata
                .file_name
                .clone()
                .unwrap_or_else(|| String::from("upload.bin"));
            (name, f.contents)
        });
        Self::from_fields(file, payload.title, payload.description, payload.categories)
    }

    fn from_fields(
        file: Option<(String, Bytes)>,
        title: Option<String>,
        description: Option<String>,
        categories: Option<String>,
    ) -> Result<Self, AppError> {
        let (file_name, contents) = file.ok_or(AppError::MissingFile)?;
        let title = title.ok_or_else(|| {
            AppError::Ingestion(anyhow::anyhow!("Multipart payload is missing the title field"))
        })?;
        let categories = parse_categories(categories.as_deref())?;

        Ok(Self {
            contents,
            file_name,
            title,
            description,
            categories,
        })
    }
}

fn parse_categories(raw: Option<&str>) -> Result<Vec<String>, AppError> {
    let raw = raw.ok_or_else(|| {
        AppError::Ingestion(anyhow::anyhow!(
            "Multipart payload is missing the categories field"
        ))
    })?;

    serde_json::from_str::<Vec<String>>(raw).map_err(|e| {
        AppError::Ingestion(anyhow::Error::new(e).context("Categories field is not a JSON array"))
    })
}

/// Full ingestion sequence: resolve identity, validate the payload, write
/// the blob, then persist the video with its category links. The blob write
/// and the database write are deliberately not atomic; a failure between
/// them leaves an orphaned object and no video record (accepted, not
/// compensated).
#[tracing::instrument(name = "Ingest uploaded video", skip(cookies, inner, payload))]
pub async fn upload_video(
    cookies: Cookies,
    State(inner): State<InnerState>,
    payload: Result<TypedMultipart<VideoUploadRequest>, TypedMultipartError>,
) -> Result<Json<Value>, AppError> {
    let InnerState { db, blob_client } = inner;

    let user = current_user(&db, &cookies).await.ok_or_else(|| {
        AppError::Unauthorized(anyhow::anyhow!("No resolvable identity for this session"))
    })?;

    // The parse rejection is deferred until after the identity check, so an
    // anonymous caller always sees 401 no matter what the body looks like,
    // and a parse failure renders as the generic ingestion 500 instead of
    // the extractor's own message.
    let TypedMultipart(payload) = payload.map_err(|e| {
        AppError::Ingestion(anyhow::Error::new(e).context("Multipart payload could not be parsed"))
    })?;

    let IngestionInput {
        contents,
        file_name,
        title,
        description,
        categories,
    } = IngestionInput::from_payload(payload)?;

    tracing::info!(
        "Ingesting video '{}' ({} bytes, {} categories) for user {}",
        title,
        contents.len(),
        categories.len(),
        user.id
    );

    let video_url = blob_client.upload(contents, &file_name).await?;

    // No deadline on this write; a slow database simply delays the response.
    let video = create_video(&db, &user, title, description, video_url, &categories)
        .await
        .map_err(|e| {
            AppError::Ingestion(anyhow::Error::new(e).context("Failed to persist video record"))
        })?;

    Ok(Json(json!({ "video": video })))
}

#[tracing::instrument(
    name = "Persist video record",
    skip(db, user, title, description, video_url, categories),
    fields(user_id = %user.id, category_count = categories.len())
)]
async fn create_video(
    db: &PgPool,
    user: &User,
    title: String,
    description: Option<String>,
    video_url: String,
    categories: &[String],
) -> Result<Video, sqlx::Error> {
    let video_id = Uuid::new_v4().to_string();

    let mut tx = db.begin().await?;

    // Duration extraction is an open requirement; no media inspection
    // happens here, so duration is always zero.
    let mut video = sqlx::query_as::<_, Video>(
        r#"INSERT INTO videos (id, title, description, video_url, user_id, duration)
           VALUES ($1, $2, $3, $4, $5, 0)
           RETURNING *"#,
    )
    .bind(&video_id)
    .bind(title)
    .bind(description)
    .bind(video_url)
    .bind(&user.id)
    .fetch_one(&mut *tx)
    .await?;

    // Category ids are not pre-validated; an unknown id violates the foreign
    // key and rolls the whole write back. The join rows carry the supplied
    // list position so the response echoes them in submission order.
    for (position, category_id) in categories.iter().enumerate() {
        sqlx::query(
            r#"INSERT INTO video_categories (video_id, category_id, position)
               VALUES ($1, $2, $3)"#,
        )
        .bind(&video_id)
        .bind(category_id)
        .bind(position as i32)
        .execute(&mut *tx)
        .await?;
    }

    // Reconcile inside the transaction so the response and the write fail
    // together; a committed video is always one the caller got back.
    video.categories = sqlx::query_as::<_, Category>(
        r#"SELECT c.id, c.name, c.description
           FROM categories c
           JOIN video_categories vc ON vc.category_id = c.id
           WHERE vc.video_id = $1
           ORDER BY vc.position"#,
    )
    .bind(&video_id)
    .fetch_all(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(video)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, bytes: &'static [u8]) -> Option<(String, Bytes)> {
        Some((name.to_string(), Bytes::from_static(bytes)))
    }

    #[test]
    fn missing_file_is_rejected_before_anything_else() {
        let err = IngestionInput::from_fields(
            None,
            Some("Test".to_string()),
            None,
            Some("[]".to_string()),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::MissingFile));
    }

    #[test]
    fn missing_title_surfaces_as_ingestion_failure() {
        let err =
            IngestionInput::from_fields(file("clip.mp4", b"12345"), None, None, Some("[]".into()))
                .unwrap_err();
        assert!(matches!(err, AppError::Ingestion(_)));
    }

    #[test]
    fn empty_category_list_is_valid() {
        let input = IngestionInput::from_fields(
            file("clip.mp4", b"12345"),
            Some("Test".to_string()),
            Some(String::new()),
            Some("[]".to_string()),
        )
        .unwrap();
        assert_eq!(input.title, "Test");
        assert_eq!(input.file_name, "clip.mp4");
        assert_eq!(input.contents.len(), 5);
        assert!(input.categories.is_empty());
    }

    #[test]
    fn category_order_is_preserved() {
        let input = IngestionInput::from_fields(
            file("clip.mp4", b"12345"),
            Some("Test".to_string()),
            None,
            Some(r#"["cat-2","cat-1"]"#.to_string()),
        )
        .unwrap();
        assert_eq!(input.categories, vec!["cat-2", "cat-1"]);
    }

    #[test]
    fn malformed_categories_surface_as_ingestion_failure() {
        let err = IngestionInput::from_fields(
            file("clip.mp4", b"12345"),
            Some("Test".to_string()),
            None,
            Some("not json".to_string()),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Ingestion(_)));
    }

    #[test]
    fn missing_categories_field_surfaces_as_ingestion_failure() {
        let err = IngestionInput::from_fields(
            file("clip.mp4", b"12345"),
            Some("Test".to_string()),
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Ingestion(_)));
    }

    /// Serves the real handler with a pool that never connects; an
    /// anonymous request must be turned away before either collaborator is
    /// touched.
    async fn serve_upload_route() -> String {
        use crate::storage::BlobClient;

        let db = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://127.0.0.1:1/unused")
            .unwrap();
        let blob_client = BlobClient::new(
            // Nothing listens on port 1.
            "http://127.0.0.1:1".to_string(),
            "test-token".to_string(),
        );
        let app = axum::Router::new()
            .route("/api/videos", axum::routing::post(upload_video))
            .layer(tower_cookies::CookieManagerLayer::new())
            .with_state(InnerState { db, blob_client });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/api/videos", addr)
    }

    #[tokio::test]
    async fn missing_session_yields_401_even_for_malformed_bodies() {
        let endpoint = serve_upload_route().await;

        let response = reqwest::Client::new()
            .post(&endpoint)
            .header("Content-Type", "application/json")
            .body(r#"{"title":"Test"}"#)
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 401);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body, json!({ "error": "Unauthorized" }));
    }

    #[tokio::test]
    async fn missing_session_yields_401_for_well_formed_multipart() {
        let endpoint = serve_upload_route().await;

        let form = reqwest::multipart::Form::new()
            .part(
                "video",
                reqwest::multipart::Part::bytes(b"12345".to_vec()).file_name("clip.mp4"),
            )
            .text("title", "Test")
            .text("categories", "[]");
        let response = reqwest::Client::new()
            .post(&endpoint)
            .multipart(form)
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 401);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body, json!({ "error": "Unauthorized" }));
    }
}
