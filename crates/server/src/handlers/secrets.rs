//! Third-party provider secrets. Values are only ever returned masked.

use crate::error::ApiError;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use tollgate_core::{auth::AuthContext, services::CredentialServices};

const MAX_PROVIDER_LENGTH: usize = 64;

#[derive(Debug, Deserialize)]
pub struct StoreSecretRequest {
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct SecretResponse {
    pub provider: String,
    /// Always masked, e.g. `****1234`
    pub value: String,
}

fn validate_provider(provider: &str) -> Result<(), ApiError> {
    if provider.is_empty() || provider.len() > MAX_PROVIDER_LENGTH {
        return Err(ApiError::BadRequest(format!(
            "Provider name must be 1 to {MAX_PROVIDER_LENGTH} characters"
        )));
    }
    if !provider.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(ApiError::BadRequest(
            "Provider name may only contain letters, digits, dashes and underscores".to_string(),
        ));
    }
    Ok(())
}

/// PUT /secrets/{provider}
///
/// A masked value echoed back by a form keeps the stored secret instead of overwriting it.
pub async fn put_secret(
    State(services): State<CredentialServices>,
    Extension(context): Extension<AuthContext>,
    Path(provider): Path<String>,
    Json(request): Json<StoreSecretRequest>,
) -> Result<StatusCode, ApiError> {
    validate_provider(&provider)?;
    if request.value.is_empty() {
        return Err(ApiError::BadRequest("Secret value cannot be empty".to_string()));
    }

    let user_id = context.principal.user_id;
    let value = services.secrets.resolve_if_masked(&request.value, user_id, &provider).await?;
    services.secrets.store(user_id, &provider, &value).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// GET /secrets/{provider}
pub async fn get_secret(
    State(services): State<CredentialServices>,
    Extension(context): Extension<AuthContext>,
    Path(provider): Path<String>,
) -> Result<Json<SecretResponse>, ApiError> {
    validate_provider(&provider)?;

    let masked = services
        .secrets
        .masked(context.principal.user_id, &provider)
        .await?
        .ok_or(ApiError::NotFound("Secret not found"))?;

    Ok(Json(SecretResponse { provider, value: masked }))
}

/// DELETE /secrets/{provider}
pub async fn delete_secret(
    State(services): State<CredentialServices>,
    Extension(context): Extension<AuthContext>,
    Path(provider): Path<String>,
) -> Result<StatusCode, ApiError> {
    validate_provider(&provider)?;

    if services.secrets.remove(context.principal.user_id, &provider).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Secret not found"))
    }
}
