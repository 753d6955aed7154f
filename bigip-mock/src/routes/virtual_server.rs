use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use super::auth::authorize;
use crate::error::ApiError;
use crate::state::{AppState, VirtualPayload, path_from_uri, virtual_not_found};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetQuery {
    #[serde(default)]
    expand_subcollections: Option<bool>,
}

pub async fn list_virtuals(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<GetQuery>,
) -> Result<Json<Value>, ApiError> {
    let inner = state.inner.read().await;
    authorize(&inner, &headers)?;
    let expand = query.expand_subcollections.unwrap_or(false);
    let mut items: Vec<_> = inner.virtuals.values().collect();
    items.sort_by_key(|vs| vs.full_path());
    Ok(Json(json!({
        "kind": "tm:ltm:virtual:virtualcollectionstate",
        "selfLink": "https://localhost/mgmt/tm/ltm/virtual",
        "items": items.iter().map(|vs| vs.render(expand)).collect::<Vec<_>>(),
    })))
}

pub async fn get_virtual(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Query(query): Query<GetQuery>,
) -> Result<Json<Value>, ApiError> {
    let inner = state.inner.read().await;
    authorize(&inner, &headers)?;
    let full_path = path_from_uri(&name);
    let vs = inner
        .virtuals
        .get(&full_path)
        .ok_or_else(|| virtual_not_found(&full_path))?;
    Ok(Json(vs.render(query.expand_subcollections.unwrap_or(false))))
}

pub async fn create_virtual(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<VirtualPayload>,
) -> Result<Json<Value>, ApiError> {
    let mut inner = state.inner.write().await;
    authorize(&inner, &headers)?;
    let vs = inner.create_virtual(&payload)?;
    info!("Created virtual server {}", vs.full_path());
    Ok(Json(vs.render(false)))
}

pub async fn modify_virtual(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(payload): Json<VirtualPayload>,
) -> Result<Json<Value>, ApiError> {
    let mut inner = state.inner.write().await;
    authorize(&inner, &headers)?;
    let vs = inner.modify_virtual(&path_from_uri(&name), &payload)?;
    info!("Modified virtual server {}", vs.full_path());
    Ok(Json(vs.render(false)))
}

pub async fn delete_virtual(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    let mut inner = state.inner.write().await;
    authorize(&inner, &headers)?;
    let full_path = path_from_uri(&name);
    inner.delete_virtual(&full_path)?;
    info!("Deleted virtual server {}", full_path);
    Ok(StatusCode::OK)
}
