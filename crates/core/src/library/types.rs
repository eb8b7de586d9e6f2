use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

use crate::scraper::ContentType;

/// Errors for library operations.
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("{content_type} not found: {id}")]
    NotFound {
        content_type: ContentType,
        id: String,
    },

    /// The external id already belongs to another entity.
    #[error("External id {id_source}:{value} already belongs to {content_type} {existing_id}")]
    ExternalIdConflict {
        content_type: ContentType,
        id_source: String,
        value: String,
        existing_id: String,
    },

    #[error("Expected {expected} metadata, got {actual}")]
    ContentTypeMismatch {
        expected: ContentType,
        actual: ContentType,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<rusqlite::Error> for LibraryError {
    fn from(e: rusqlite::Error) -> Self {
        LibraryError::Database(e.to_string())
    }
}

/// Why an add reused an existing entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistingReason {
    Name,
    ExternalId,
    Path,
}

impl ExistingReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExistingReason::Name => "name",
            ExistingReason::ExternalId => "external_id",
            ExistingReason::Path => "path",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddOptions {
    /// Filesystem path of the game; used for path dedup and stored on insert.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Icon perceptual hash stored on a newly inserted game.
    #[serde(default)]
    pub icon_phash: Option<u64>,
    #[serde(default = "default_download_assets")]
    pub download_assets: bool,
}

fn default_download_assets() -> bool {
    true
}

impl Default for AddOptions {
    fn default() -> Self {
        Self {
            path: None,
            icon_phash: None,
            download_assets: true,
        }
    }
}

impl AddOptions {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }
}

/// An image to download after commit. URLs are tried in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAsset {
    pub table: String,
    pub row_id: String,
    pub field: String,
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedAsset {
    pub table: String,
    pub row_id: String,
    pub field: String,
    pub url: String,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetFailure {
    pub table: String,
    pub row_id: String,
    pub field: String,
    /// One message per URL tried.
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetReport {
    pub attached: Vec<AttachedAsset>,
    pub failed: Vec<AssetFailure>,
}

/// Outcome of an add.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddResult {
    pub id: String,
    pub is_new: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_reason: Option<ExistingReason>,
    #[serde(default)]
    pub assets: AssetReport,
}

/// An entity created during an add, parent or linked sub-entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedEntity {
    pub content_type: ContentType,
    pub id: String,
    pub name: String,
}

/// Result of the transactional part of an add.
#[derive(Debug, Clone)]
pub struct AddOutcome {
    pub id: String,
    pub is_new: bool,
    pub existing_reason: Option<ExistingReason>,
    pub created: Vec<CreatedEntity>,
    pub pending_assets: Vec<PendingAsset>,
}

/// A stored entity row with its external ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryEntity {
    pub id: String,
    pub content_type: ContentType,
    pub name: String,
    pub original_name: Option<String>,
    pub description: Option<String>,
    pub release_date: Option<String>,
    pub path: Option<String>,
    pub icon_phash: Option<String>,
    pub external_ids: BTreeMap<String, String>,
    pub tags: Vec<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryStats {
    pub games: u64,
    pub persons: u64,
    pub companies: u64,
    pub characters: u64,
    pub tags: u64,
    pub external_ids: u64,
}
