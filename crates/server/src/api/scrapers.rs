//! Scraper API handlers: provider listing, profile-driven search and
//! metadata resolution, profile repair and per-provider image lookup.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use trove_core::scraper::{
    ContentType, GetMetadataOptions, ProfileAction, ProviderInfo, ResolvedMetadata,
    ScraperLookup, ScraperProfile, SearchHit, Slot,
};

use super::error::{bad_request, error_response, from_resolver_error, ApiError};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ProvidersResponse {
    pub providers: Vec<ProviderInfo>,
}

#[derive(Debug, Serialize)]
pub struct ProfilesResponse {
    pub profiles: Vec<ScraperProfile>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
pub struct MetadataBody {
    pub lookup: ScraperLookup,
    #[serde(default)]
    pub options: GetMetadataOptions,
}

#[derive(Debug, Serialize)]
pub struct MetadataResponse {
    /// `None` when the search phase produced no match.
    pub metadata: Option<ResolvedMetadata>,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub profile_id: String,
    pub action: ProfileAction,
}

#[derive(Debug, Serialize)]
pub struct UnregisterResponse {
    pub provider_id: String,
    /// Action taken per affected profile.
    pub profiles: BTreeMap<String, ProfileAction>,
}

#[derive(Debug, Deserialize)]
pub struct ImagesBody {
    pub lookup: ScraperLookup,
    pub slot: Slot,
}

#[derive(Debug, Serialize)]
pub struct ImagesResponse {
    pub urls: Vec<String>,
}

fn parse_content_type(raw: &str) -> Result<ContentType, ApiError> {
    raw.parse::<ContentType>().map_err(bad_request)
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/v1/scrapers/{content_type}/providers
pub async fn list_providers(
    State(state): State<Arc<AppState>>,
    Path(content_type): Path<String>,
) -> Result<Json<ProvidersResponse>, ApiError> {
    let content_type = parse_content_type(&content_type)?;
    let providers = state
        .scrapers()
        .resolver(content_type)
        .list_providers()
        .await;
    Ok(Json(ProvidersResponse { providers }))
}

/// DELETE /api/v1/scrapers/{content_type}/providers/{provider_id}
///
/// Unregister a provider and repair the profiles that used it.
pub async fn unregister_provider(
    State(state): State<Arc<AppState>>,
    Path((content_type, provider_id)): Path<(String, String)>,
) -> Result<Json<UnregisterResponse>, ApiError> {
    let content_type = parse_content_type(&content_type)?;
    let profiles = state
        .scrapers()
        .resolver(content_type)
        .unregister_provider(&provider_id)
        .await
        .map_err(from_resolver_error)?;
    Ok(Json(UnregisterResponse {
        provider_id,
        profiles,
    }))
}

/// GET /api/v1/scrapers/{content_type}/profiles
pub async fn list_profiles(
    State(state): State<Arc<AppState>>,
    Path(content_type): Path<String>,
) -> Result<Json<ProfilesResponse>, ApiError> {
    let content_type = parse_content_type(&content_type)?;
    let profiles = state
        .scrapers()
        .profiles()
        .list(Some(content_type))
        .map_err(|e| error_response(axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(ProfilesResponse { profiles }))
}

/// POST /api/v1/scrapers/{content_type}/profiles/{id}/search
pub async fn search(
    State(state): State<Arc<AppState>>,
    Path((content_type, profile_id)): Path<(String, String)>,
    Json(lookup): Json<ScraperLookup>,
) -> Result<Json<SearchResponse>, ApiError> {
    let content_type = parse_content_type(&content_type)?;
    let hits = state
        .scrapers()
        .resolver(content_type)
        .search(&profile_id, &lookup)
        .await
        .map_err(from_resolver_error)?;
    Ok(Json(SearchResponse { hits }))
}

/// POST /api/v1/scrapers/{content_type}/profiles/{id}/metadata
pub async fn get_metadata(
    State(state): State<Arc<AppState>>,
    Path((content_type, profile_id)): Path<(String, String)>,
    Json(body): Json<MetadataBody>,
) -> Result<Json<MetadataResponse>, ApiError> {
    let content_type = parse_content_type(&content_type)?;
    let metadata = state
        .scrapers()
        .resolver(content_type)
        .get_metadata(&profile_id, &body.lookup, &body.options)
        .await
        .map_err(from_resolver_error)?;
    Ok(Json(MetadataResponse { metadata }))
}

/// POST /api/v1/scrapers/{content_type}/profiles/{id}/validate
pub async fn validate_profile(
    State(state): State<Arc<AppState>>,
    Path((content_type, profile_id)): Path<(String, String)>,
) -> Result<Json<ValidateResponse>, ApiError> {
    let content_type = parse_content_type(&content_type)?;
    let action = state
        .scrapers()
        .resolver(content_type)
        .ensure_profile_valid(&profile_id)
        .await
        .map_err(from_resolver_error)?;
    Ok(Json(ValidateResponse { profile_id, action }))
}

/// POST /api/v1/scrapers/{content_type}/providers/{provider_id}/images
pub async fn provider_images(
    State(state): State<Arc<AppState>>,
    Path((content_type, provider_id)): Path<(String, String)>,
    Json(body): Json<ImagesBody>,
) -> Result<Json<ImagesResponse>, ApiError> {
    let content_type = parse_content_type(&content_type)?;
    let urls = state
        .scrapers()
        .resolver(content_type)
        .get_provider_images(&provider_id, &body.lookup, body.slot)
        .await
        .map_err(from_resolver_error)?;
    Ok(Json(ImagesResponse { urls }))
}
