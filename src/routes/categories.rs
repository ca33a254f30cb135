use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::FromRow;

use crate::errors::AppError;
use crate::InnerState;

#[derive(Debug, Serialize, Deserialize, FromRow, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

/// Static reference data backing the onboarding screen; nothing in the
/// upload flow creates categories.
#[tracing::instrument(name = "List all categories", skip(inner))]
pub async fn all_categories(State(inner): State<InnerState>) -> Result<Json<Value>, AppError> {
    let InnerState { db, .. } = inner;

    let fetch_categories_timeout = tokio::time::Duration::from_millis(10000);

    let categories = tokio::time::timeout(
        fetch_categories_timeout,
        sqlx::query_as::<_, Category>(
            r#"SELECT id, name, description FROM categories ORDER BY name"#,
        )
        .fetch_all(&db),
    )
    .await
    .map_err(|e| AppError::Database(anyhow::Error::new(e).context("Category query timed out")))?
    .map_err(AppError::from)?;

    Ok(Json(json!({ "categories": categories })))
}
