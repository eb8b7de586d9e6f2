//! Scanner API handlers.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use trove_core::extractor::{ExtractionTestResult, NameExtractionRule};
use trove_core::scanner::{ScanAllReport, ScanCompletedData, ScanProgressData};
use trove_core::ScannerDefinition;

use super::error::{bad_request, from_scan_error, not_found, ApiError};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ScannerSummary {
    #[serde(flatten)]
    pub definition: ScannerDefinition,
    pub scheduled: bool,
    pub queued: bool,
}

#[derive(Debug, Serialize)]
pub struct ListScannersResponse {
    pub scanners: Vec<ScannerSummary>,
}

#[derive(Debug, Serialize)]
pub struct UpsertScannerResponse {
    pub id: String,
    pub replaced: bool,
}

#[derive(Debug, Serialize)]
pub struct ScheduleResponse {
    pub scanner_id: String,
    pub scheduled: bool,
}

#[derive(Debug, Serialize)]
pub struct ActiveScansResponse {
    pub active: Vec<ScanProgressData>,
    pub queued: Vec<String>,
}

/// Request body for a dry run of extraction rules
#[derive(Debug, Deserialize)]
pub struct TestRulesBody {
    pub path: PathBuf,
    #[serde(default)]
    pub entity_depth: usize,
    #[serde(default)]
    pub rules: Vec<NameExtractionRule>,
}

#[derive(Debug, Serialize)]
pub struct TestRulesResponse {
    pub results: Vec<ExtractionTestResult>,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/v1/scanners
pub async fn list_scanners(State(state): State<Arc<AppState>>) -> Json<ListScannersResponse> {
    let scanner = state.scanner();
    let scheduled = scanner.scheduled_ids();
    let queued = scanner.queued_scans();

    let scanners = scanner
        .registry()
        .list()
        .await
        .into_iter()
        .map(|definition| ScannerSummary {
            scheduled: scheduled.contains(&definition.id),
            queued: queued.contains(&definition.id),
            definition,
        })
        .collect();

    Json(ListScannersResponse { scanners })
}

/// GET /api/v1/scanners/{id}
pub async fn get_scanner(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ScannerDefinition>, ApiError> {
    state
        .scanner()
        .registry()
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| not_found(format!("Scanner not found: {}", id)))
}

/// PUT /api/v1/scanners/{id}
///
/// Insert or replace a scanner definition. The id in the path wins over
/// the body.
pub async fn upsert_scanner(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(mut definition): Json<ScannerDefinition>,
) -> Result<(StatusCode, Json<UpsertScannerResponse>), ApiError> {
    definition.id = id.clone();
    if definition.name.is_empty() {
        definition.name = id.clone();
    }

    let replaced = state
        .scanner()
        .upsert_scanner(definition)
        .await
        .map_err(from_scan_error)?;
    info!(scanner_id = %id, replaced, "Scanner saved via API");

    let status = if replaced {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(UpsertScannerResponse { id, replaced })))
}

/// DELETE /api/v1/scanners/{id}
pub async fn delete_scanner(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    match state.scanner().remove_scanner(&id).await {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(not_found(format!("Scanner not found: {}", id))),
    }
}

/// POST /api/v1/scanners/{id}/scan
///
/// Queue a scan and wait for it to finish.
pub async fn scan_scanner(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ScanCompletedData>, ApiError> {
    state
        .scanner()
        .scan_scanner(&id)
        .await
        .map(Json)
        .map_err(from_scan_error)
}

/// POST /api/v1/scanners/scan-all
pub async fn scan_all(State(state): State<Arc<AppState>>) -> Json<ScanAllReport> {
    Json(state.scanner().scan_all().await)
}

/// POST /api/v1/scanners/{id}/schedule
pub async fn schedule_scanner(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ScheduleResponse>, ApiError> {
    let scheduled = state
        .scanner()
        .schedule(&id)
        .await
        .map_err(from_scan_error)?;
    Ok(Json(ScheduleResponse {
        scanner_id: id,
        scheduled,
    }))
}

/// DELETE /api/v1/scanners/{id}/schedule
pub async fn unschedule_scanner(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ScheduleResponse>, ApiError> {
    if !state.scanner().unschedule(&id) {
        return Err(not_found(format!("Scanner is not scheduled: {}", id)));
    }
    Ok(Json(ScheduleResponse {
        scanner_id: id,
        scheduled: false,
    }))
}

/// GET /api/v1/scans/active
pub async fn active_scans(State(state): State<Arc<AppState>>) -> Json<ActiveScansResponse> {
    Json(ActiveScansResponse {
        active: state.scanner().get_active_scans().await,
        queued: state.scanner().queued_scans(),
    })
}

/// POST /api/v1/scanners/test-rules
///
/// Dry-run name extraction over a directory without touching the library.
pub async fn test_rules(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TestRulesBody>,
) -> Result<Json<TestRulesResponse>, ApiError> {
    if body.path.as_os_str().is_empty() {
        return Err(bad_request("path must not be empty"));
    }
    let results = state
        .scanner()
        .test_extraction_rules(body.path, body.entity_depth, body.rules)
        .await
        .map_err(from_scan_error)?;
    Ok(Json(TestRulesResponse { results }))
}
