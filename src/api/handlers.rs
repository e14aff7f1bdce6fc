use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::auth::Principal;
use crate::errors::AppError;
use crate::models::feature::{Feature, ValueType};
use crate::models::token::{ApiToken, IssuedToken};
use crate::store::postgres::{FeatureFilter, FeatureUpdate, NewFeature};
use crate::AppState;

// ── Request DTOs ─────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFeatureRequest {
    pub name: String,
    pub resource_id: String,
    pub value_type: ValueType,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default = "default_active")]
    pub active: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFeatureRequest {
    pub name: String,
    pub value_type: ValueType,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default = "default_active")]
    pub active: bool,
}

#[derive(Deserialize)]
pub struct ToggleRequest {
    pub active: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureQuery {
    pub resource_id: Option<String>,
    pub resource_id_prefix: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateTokenRequest {
    pub name: String,
}

fn default_active() -> bool {
    true
}

/// Deserialize a JSON body into a DTO, mapping shape errors to 400 rather
/// than axum's default 422.
fn parse_body<T: serde::de::DeserializeOwned>(body: Value) -> Result<T, AppError> {
    serde_json::from_value(body).map_err(|e| AppError::Validation(e.to_string()))
}

fn require_nonempty(value: &str, field: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} cannot be empty", field)));
    }
    Ok(())
}

// ── Feature Handlers ─────────────────────────────────────────

/// GET /features — list features, optionally filtered by resource.
pub async fn list_features(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FeatureQuery>,
) -> Result<Json<Vec<Feature>>, AppError> {
    let features = state
        .db
        .list_features(FeatureFilter {
            resource_id: query.resource_id,
            resource_id_prefix: query.resource_id_prefix,
        })
        .await?;
    Ok(Json(features))
}

/// GET /features/:id
pub async fn get_feature(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Feature>, AppError> {
    Ok(Json(state.db.get_feature(id).await?))
}

/// POST /features — create a feature flag.
pub async fn create_feature(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Feature>), AppError> {
    let req: CreateFeatureRequest = parse_body(body)?;
    require_nonempty(&req.name, "feature name")?;
    require_nonempty(&req.resource_id, "resource id")?;

    let feature = state
        .db
        .create_feature(NewFeature {
            name: req.name,
            resource_id: req.resource_id,
            value_type: req.value_type,
            value: req.value,
            active: req.active,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(feature)))
}

/// PUT /features/:id — full replace of the mutable fields. The resource id
/// is immutable and ignored if sent.
pub async fn update_feature(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<Value>,
) -> Result<Json<Feature>, AppError> {
    let req: UpdateFeatureRequest = parse_body(body)?;
    require_nonempty(&req.name, "feature name")?;

    let feature = state
        .db
        .update_feature(
            id,
            FeatureUpdate {
                name: req.name,
                value_type: req.value_type,
                value: req.value,
                active: req.active,
            },
        )
        .await?;

    Ok(Json(feature))
}

/// POST /features/:id/toggle — flip only the active flag.
pub async fn toggle_feature(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<Value>,
) -> Result<Json<Feature>, AppError> {
    let req: ToggleRequest = parse_body(body)?;
    let feature = state.db.set_feature_active(id, req.active).await?;
    Ok(Json(feature))
}

/// DELETE /features/:id
pub async fn delete_feature(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.db.delete_feature(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Token Handlers ───────────────────────────────────────────

/// GET /tokens — metadata only, never secret material.
pub async fn list_tokens(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ApiToken>>, AppError> {
    Ok(Json(state.db.list_tokens().await?))
}

/// POST /tokens — mint a token. The response is the only place the
/// plaintext secret ever appears.
pub async fn create_token(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<IssuedToken>), AppError> {
    let req: CreateTokenRequest = parse_body(body)?;
    require_nonempty(&req.name, "token name")?;

    let (meta, token) = state.db.create_token(&req.name, &principal.uid).await?;

    Ok((StatusCode::CREATED, Json(IssuedToken { meta, token })))
}

/// DELETE /tokens/:id — revocation is immediate; the secret stops
/// verifying as soon as the row is gone.
pub async fn delete_token(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.db.delete_token(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Health ───────────────────────────────────────────────────

/// GET /readyz — proves the store answers before reporting ready.
pub async fn readiness(State(state): State<Arc<AppState>>) -> Result<&'static str, AppError> {
    state.db.ping().await?;
    Ok("ok")
}
