use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, State};
use axum::response::Json;
use proptree_core::{Record, RequestContext};
use serde::{Deserialize, Serialize};

use crate::error::ServerResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GetRequest {
    pub path: String,
    #[serde(default)]
    pub force_creation: bool,
}

#[derive(Debug, Deserialize)]
pub struct PutRequest {
    pub path: String,
    #[serde(default)]
    pub checksum: String,
}

#[derive(Debug, Deserialize)]
pub struct RmRequest {
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct MvRequest {
    pub src: String,
    pub dst: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RmResponse {
    pub removed: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MvResponse {
    pub moved: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check handler. Unauthenticated; pings the store.
pub async fn health_handler(State(state): State<AppState>) -> ServerResult<Json<HealthResponse>> {
    state.service.store().health_check().await?;
    Ok(Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    }))
}

pub async fn get_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    payload: Result<Json<GetRequest>, JsonRejection>,
) -> ServerResult<Json<Record>> {
    let Json(req) = payload?;
    let record = state
        .service
        .get(&ctx, &req.path, req.force_creation)
        .await?;
    Ok(Json(record))
}

pub async fn put_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    payload: Result<Json<PutRequest>, JsonRejection>,
) -> ServerResult<Json<Record>> {
    let Json(req) = payload?;
    let record = state.service.put(&ctx, &req.path, &req.checksum).await?;
    Ok(Json(record))
}

pub async fn rm_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    payload: Result<Json<RmRequest>, JsonRejection>,
) -> ServerResult<Json<RmResponse>> {
    let Json(req) = payload?;
    let removed = state.service.rm(&ctx, &req.path).await?;
    Ok(Json(RmResponse { removed }))
}

pub async fn mv_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    payload: Result<Json<MvRequest>, JsonRejection>,
) -> ServerResult<Json<MvResponse>> {
    let Json(req) = payload?;
    let moved = state.service.mv(&ctx, &req.src, &req.dst).await?;
    Ok(Json(MvResponse { moved }))
}
