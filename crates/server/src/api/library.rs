//! Library API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use trove_core::library::{AddOptions, AddResult, LibraryEntity, LibraryStats};
use trove_core::scraper::{ContentType, ResolvedMetadata};

use super::error::{bad_request, from_library_error, ApiError};
use crate::state::AppState;

/// Request body for adding resolved metadata
#[derive(Debug, Deserialize)]
pub struct AddBody {
    pub metadata: ResolvedMetadata,
    #[serde(default)]
    pub options: AddOptions,
}

/// Request body for setting one external id
#[derive(Debug, Deserialize)]
pub struct ExternalIdBody {
    pub source: String,
    pub value: String,
}

fn parse_content_type(raw: &str) -> Result<ContentType, ApiError> {
    raw.parse::<ContentType>().map_err(bad_request)
}

/// POST /api/v1/library/{content_type}
///
/// 201 when a new entity was inserted, 200 when an existing one matched.
pub async fn add_entity(
    State(state): State<Arc<AppState>>,
    Path(content_type): Path<String>,
    Json(body): Json<AddBody>,
) -> Result<(StatusCode, Json<AddResult>), ApiError> {
    let content_type = parse_content_type(&content_type)?;
    let adder = state.adder();
    let result = match content_type {
        ContentType::Game => adder.add_game(&body.metadata, &body.options).await,
        ContentType::Person => adder.add_person(&body.metadata, &body.options).await,
        ContentType::Company => adder.add_company(&body.metadata, &body.options).await,
        ContentType::Character => adder.add_character(&body.metadata, &body.options).await,
    }
    .map_err(from_library_error)?;

    let status = if result.is_new {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(result)))
}

/// GET /api/v1/library/{content_type}/{id}
pub async fn get_entity(
    State(state): State<Arc<AppState>>,
    Path((content_type, id)): Path<(String, String)>,
) -> Result<Json<LibraryEntity>, ApiError> {
    let content_type = parse_content_type(&content_type)?;
    state
        .library()
        .get_entity(content_type, &id)
        .map(Json)
        .map_err(from_library_error)
}

/// PUT /api/v1/library/{content_type}/{id}/external-ids
///
/// 409 when the value already belongs to another entity.
pub async fn set_external_id(
    State(state): State<Arc<AppState>>,
    Path((content_type, id)): Path<(String, String)>,
    Json(body): Json<ExternalIdBody>,
) -> Result<Json<LibraryEntity>, ApiError> {
    let content_type = parse_content_type(&content_type)?;
    if body.source.trim().is_empty() || body.value.trim().is_empty() {
        return Err(bad_request("source and value are required"));
    }
    let library = state.library();
    library
        .set_external_id(content_type, &id, &body.source, &body.value)
        .map_err(from_library_error)?;
    library
        .get_entity(content_type, &id)
        .map(Json)
        .map_err(from_library_error)
}

/// GET /api/v1/library/stats
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<LibraryStats>, ApiError> {
    state
        .library()
        .stats()
        .map(Json)
        .map_err(from_library_error)
}
