use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::{AppState, AppStateInner};

pub const TOKEN_HEADER: &str = "X-F5-Auth-Token";

/// Token lifetime reported to clients, in seconds.
const TOKEN_TIMEOUT: u64 = 1200;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    username: String,
    password: String,
    #[serde(default)]
    login_provider_name: Option<String>,
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut inner = state.inner.write().await;
    if req.username != inner.user || req.password != inner.password {
        warn!("Rejected login for {}", req.username);
        return Err(ApiError::unauthorized("Authentication failed."));
    }

    let token = Uuid::new_v4().simple().to_string().to_uppercase();
    inner.tokens.insert(token.clone());
    debug!("Issued token for {}", req.username);

    Ok(Json(json!({
        "username": req.username,
        "loginProviderName": req.login_provider_name.unwrap_or_else(|| "tmos".to_string()),
        "token": {
            "token": token,
            "name": token,
            "userName": req.username,
            "timeout": TOKEN_TIMEOUT,
        }
    })))
}

pub async fn delete_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(token): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let mut inner = state.inner.write().await;
    authorize(&inner, &headers)?;
    if !inner.tokens.remove(&token) {
        return Err(ApiError::not_found(format!(
            "Token {} does not exist.",
            token
        )));
    }
    debug!("Revoked token");
    Ok(Json(json!({ "token": token })))
}

/// Require a live token in the auth header.
pub fn authorize(inner: &AppStateInner, headers: &HeaderMap) -> Result<(), ApiError> {
    let token = headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok());
    match token {
        Some(token) if inner.tokens.contains(token) => Ok(()),
        Some(_) => Err(ApiError::unauthorized("X-F5-Auth-Token does not exist.")),
        None => Err(ApiError::unauthorized("Authorization failed: no token supplied.")),
    }
}
