//! HTTP handlers for the four render operations plus the internal cache
//! fill route peers call for keys this node owns.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;

use crate::cache::CacheKey;

use super::error::ApiError;
use super::models::{
    ExpandRequest, ExpandResponse, ExtractParams, ExtractResponse, RenderRequest, ShortenRequest,
    ShortenResponse,
};
use super::state::ApiState;

pub async fn render(
    State(state): State<ApiState>,
    Json(payload): Json<RenderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let body = state
        .render
        .render(&payload.diagram, payload.format)
        .await?;
    // The service returns the serialized response so cache hits pass
    // through without a decode/encode round trip.
    Ok(([(header::CONTENT_TYPE, "application/json")], body))
}

pub async fn shorten(
    State(state): State<ApiState>,
    Json(payload): Json<ShortenRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let encoded = state.render.shorten(&payload.source)?;
    Ok(Json(ShortenResponse { encoded }))
}

pub async fn expand(
    State(state): State<ApiState>,
    Json(payload): Json<ExpandRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let source = state.render.expand(&payload.encoded)?;
    Ok(Json(ExpandResponse { source }))
}

pub async fn extract(
    State(state): State<ApiState>,
    Query(params): Query<ExtractParams>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let diagram = state.render.extract(&body, params.expand_macros)?;
    Ok(Json(ExtractResponse { diagram }))
}

/// Peer entry point: authoritative fill for an owned key, no forwarding.
pub async fn cache_fill(
    State(state): State<ApiState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let key = CacheKey::parse(&key).ok_or_else(|| {
        ApiError::invalid_argument("cache key has wrong format", Some(key.clone()))
    })?;
    let body = state.render.fill_owned(&key).await?;
    Ok(([(header::CONTENT_TYPE, "application/json")], body))
}

pub async fn healthz() -> StatusCode {
    StatusCode::NO_CONTENT
}
