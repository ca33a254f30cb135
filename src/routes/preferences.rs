use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_cookies::Cookies;

use crate::auth::current_user;
use crate::errors::AppError;
use crate::InnerState;

#[derive(Debug, Deserialize)]
pub struct PreferencesRequest {
    pub categories: Vec<String>,
}

/// Stores the caller's onboarding category picks. The minimum-selection gate
/// lives client-side; any list is accepted here. Marking the user as
/// onboarded is still an open integration point.
#[tracing::instrument(name = "Save category preferences", skip(cookies, inner, payload), fields(category_count = payload.categories.len()))]
pub async fn save_preferences(
    cookies: Cookies,
    State(inner): State<InnerState>,
    Json(payload): Json<PreferencesRequest>,
) -> Result<Json<Value>, AppError> {
    let InnerState { db, .. } = inner;

    let user = current_user(&db, &cookies).await.ok_or_else(|| {
        AppError::Unauthorized(anyhow::anyhow!("No resolvable identity for this session"))
    })?;

    let mut tx = db.begin().await?;

    sqlx::query(r#"DELETE FROM user_categories WHERE user_id = $1"#)
        .bind(&user.id)
        .execute(&mut *tx)
        .await?;

    for category_id in &payload.categories {
        sqlx::query(r#"INSERT INTO user_categories (user_id, category_id) VALUES ($1, $2)"#)
            .bind(&user.id)
            .bind(category_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    tracing::info!(
        "Saved {} category preferences for user {}",
        payload.categories.len(),
        user.id
    );

    Ok(Json(json!({ "success": true })))
}
