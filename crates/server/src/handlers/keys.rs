//! Self-service API key management for the authenticated user.

use crate::error::ApiError;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tollgate_core::{
    auth::{api_key::ApiKey, AuthContext, AuthError},
    services::CredentialServices,
};

#[derive(Debug, Deserialize)]
pub struct CreateApiKeyRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct ApiKeyResponse {
    pub id: i64,
    pub name: String,
    pub key_prefix: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub revoked: bool,
}

/// Returned once, on creation. `key` is never retrievable again.
#[derive(Debug, Serialize)]
pub struct ApiKeyCreatedResponse {
    #[serde(flatten)]
    pub api_key: ApiKeyResponse,
    pub key: String,
}

impl From<&ApiKey> for ApiKeyResponse {
    fn from(key: &ApiKey) -> Self {
        Self {
            id: key.id,
            name: key.name.clone(),
            key_prefix: key.key_prefix.clone(),
            created_at: key.created_at,
            last_used_at: key.last_used_at,
            revoked: key.is_revoked(),
        }
    }
}

/// GET /api-keys
pub async fn list_api_keys(
    State(services): State<CredentialServices>,
    Extension(context): Extension<AuthContext>,
) -> Result<Json<Vec<ApiKeyResponse>>, ApiError> {
    let keys = services.api_keys.list(context.principal.user_id).await?;
    Ok(Json(keys.iter().map(ApiKeyResponse::from).collect()))
}

/// POST /api-keys
pub async fn create_api_key(
    State(services): State<CredentialServices>,
    Extension(context): Extension<AuthContext>,
    Json(request): Json<CreateApiKeyRequest>,
) -> Result<(StatusCode, Json<ApiKeyCreatedResponse>), ApiError> {
    let created = services.api_keys.create(context.principal.user_id, &request.name).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiKeyCreatedResponse { api_key: ApiKeyResponse::from(&created.api_key), key: created.raw_key }),
    ))
}

/// DELETE /api-keys/{id}
pub async fn revoke_api_key(
    State(services): State<CredentialServices>,
    Extension(context): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    match services.api_keys.revoke(context.principal.user_id, id).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(AuthError::InvalidKey) => Err(ApiError::NotFound("API key not found")),
        Err(e) => Err(e.into()),
    }
}
