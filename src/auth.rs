use axum::extract::State;
use axum::Json;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::{FromRow, PgPool};
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::errors::AppError;
use crate::InnerState;

pub const SESSION_COOKIE: &str = "session-token";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// External identity reference (the auth provider's user id).
    pub sub: String,
    pub exp: usize,
}

#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub clerk_id: String,
    pub username: String,
    pub onboarded: bool,
}

pub fn get_clerk_id_from_token(token: &str) -> Result<String, AppError> {
    let secret = std::env::var("SESSION_SECRET").map_err(|e| {
        AppError::Unauthorized(anyhow::anyhow!(e).context("SESSION_SECRET must be set"))
    })?;
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| AppError::Unauthorized(anyhow::anyhow!(e).context("Failed to decode token")))?;

    Ok(token_data.claims.sub)
}

/// Resolves the ambient session to a user record. Absence of a cookie, an
/// undecodable token, or a lookup failure all resolve to `None`; the caller
/// decides whether that is a 401.
#[tracing::instrument(name = "Resolve current user", skip(db, cookies))]
pub async fn current_user(db: &PgPool, cookies: &Cookies) -> Option<User> {
    let session_token = cookies
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .unwrap_or_default();

    if session_token.is_empty() {
        tracing::debug!("No session token cookie present");
        return None;
    }

    let clerk_id = match get_clerk_id_from_token(&session_token) {
        Ok(clerk_id) => clerk_id,
        Err(e) => {
            tracing::warn!("Session token rejected: {:?}", e);
            return None;
        }
    };

    let user = sqlx::query_as::<_, User>(
        r#"SELECT id, clerk_id, username, onboarded FROM users WHERE clerk_id = $1"#,
    )
    .bind(&clerk_id)
    .fetch_optional(db)
    .await;

    match user {
        Ok(user) => user,
        Err(e) => {
            tracing::error!("Failed to look up user for clerk id: {:?}", e);
            None
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUserRequest {
    pub clerk_id: String,
    pub username: String,
}

/// Creates the local user row after external sign-up. Called by the auth
/// provider's sync hook, not by the upload flow.
#[tracing::instrument(name = "Register user", skip(inner, payload), fields(username = %payload.username))]
pub async fn register_user(
    State(inner): State<InnerState>,
    Json(payload): Json<RegisterUserRequest>,
) -> Result<Json<Value>, AppError> {
    let InnerState { db, .. } = inner;

    let user = create_user(&db, &payload.clerk_id, &payload.username).await?;

    Ok(Json(json!({ "user": user })))
}

#[tracing::instrument(name = "Saving new user in the database", skip(db))]
pub async fn create_user(db: &PgPool, clerk_id: &str, username: &str) -> Result<User, AppError> {
    let uuid = Uuid::new_v4().to_string();

    let user = sqlx::query_as::<_, User>(
        r#"INSERT INTO users (id, clerk_id, username, onboarded)
           VALUES ($1, $2, $3, false)
           RETURNING id, clerk_id, username, onboarded"#,
    )
    .bind(&uuid)
    .bind(clerk_id)
    .bind(username)
    .fetch_one(db)
    .await?;

    tracing::info!("Created user {} for clerk id {}", user.id, clerk_id);
    Ok(user)
}
