use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::extractor::{ExtractError, NameExtractionRule};
use crate::library::{ExistingReason, LibraryError};
use crate::phash::PhashError;
use crate::scraper::ResolverError;

/// Errors for scanning.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Scanner not found: {0}")]
    ScannerNotFound(String),

    #[error("Scan root is not a directory: {0}")]
    RootNotFound(String),

    #[error("Invalid scanner definition: {0}")]
    InvalidDefinition(String),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("IO error at {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("No metadata match for '{0}'")]
    NoMatch(String),

    #[error(transparent)]
    Resolver(#[from] ResolverError),

    #[error(transparent)]
    Library(#[from] LibraryError),

    #[error(transparent)]
    Phash(#[from] PhashError),

    #[error("Scan queue is closed")]
    QueueClosed,
}

/// How a root directory is walked.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Levels below the root at which entries become candidates; 0 means
    /// the root's direct children.
    #[serde(default)]
    pub entity_depth: usize,
    /// Names pruned at every level, compared case-insensitively.
    #[serde(default)]
    pub ignored_names: Vec<String>,
    #[serde(default)]
    pub rules: Vec<NameExtractionRule>,
}

/// Longest accepted scan interval (one year).
pub const MAX_INTERVAL_MINUTES: u64 = 525_600;

/// A configured scanner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerDefinition {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub path: PathBuf,
    /// Game scraper profile used to resolve candidates.
    pub profile_id: String,
    #[serde(default)]
    pub entity_depth: usize,
    #[serde(default)]
    pub ignored_names: Vec<String>,
    /// Periodic scan interval; 0 disables scheduling.
    #[serde(default)]
    pub interval_minutes: u64,
    /// Match icon images inside candidate directories against known games.
    #[serde(default)]
    pub icon_match: bool,
    /// Overrides the index default threshold.
    #[serde(default)]
    pub max_phash_distance: Option<u32>,
    #[serde(default)]
    pub rules: Vec<NameExtractionRule>,
}

impl ScannerDefinition {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>, profile_id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            path: path.into(),
            profile_id: profile_id.into(),
            entity_depth: 0,
            ignored_names: Vec::new(),
            interval_minutes: 0,
            icon_match: false,
            max_phash_distance: None,
            rules: Vec::new(),
        }
    }

    pub fn options(&self) -> ScanOptions {
        ScanOptions {
            entity_depth: self.entity_depth,
            ignored_names: self.ignored_names.clone(),
            rules: self.rules.clone(),
        }
    }
}

/// A candidate skipped because it already exists in the library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedScan {
    pub path: String,
    pub name: String,
    pub reason: ExistingReason,
    pub existing_id: String,
}

/// A candidate that failed; the scan continued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedScan {
    pub path: String,
    pub error: String,
}

/// Complete progress snapshot of a running scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanProgressData {
    pub scanner_id: String,
    pub processed_count: usize,
    pub new_count: usize,
    pub skipped_count: usize,
    pub failed_count: usize,
    pub total_count: usize,
    pub skipped_scans: Vec<SkippedScan>,
    pub failed_scans: Vec<FailedScan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_path: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl ScanProgressData {
    pub fn new(scanner_id: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            scanner_id: scanner_id.into(),
            processed_count: 0,
            new_count: 0,
            skipped_count: 0,
            failed_count: 0,
            total_count: 0,
            skipped_scans: Vec::new(),
            failed_scans: Vec::new(),
            current_path: None,
            started_at,
        }
    }

    pub fn record_new(&mut self) {
        self.processed_count += 1;
        self.new_count += 1;
    }

    pub fn record_skipped(&mut self, skipped: SkippedScan) {
        self.processed_count += 1;
        self.skipped_count += 1;
        self.skipped_scans.push(skipped);
    }

    pub fn record_failed(&mut self, path: impl Into<String>, error: impl Into<String>) {
        self.processed_count += 1;
        self.failed_count += 1;
        self.failed_scans.push(FailedScan {
            path: path.into(),
            error: error.into(),
        });
    }

    pub fn complete(self, new_ids: Vec<String>, completed_at: DateTime<Utc>) -> ScanCompletedData {
        ScanCompletedData {
            scanner_id: self.scanner_id,
            processed_count: self.processed_count,
            new_count: self.new_count,
            skipped_count: self.skipped_count,
            failed_count: self.failed_count,
            skipped_scans: self.skipped_scans,
            failed_scans: self.failed_scans,
            new_ids,
            started_at: self.started_at,
            completed_at,
        }
    }
}

/// Terminal result of a scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanCompletedData {
    pub scanner_id: String,
    pub processed_count: usize,
    pub new_count: usize,
    pub skipped_count: usize,
    pub failed_count: usize,
    pub skipped_scans: Vec<SkippedScan>,
    pub failed_scans: Vec<FailedScan>,
    /// Ids of games added by this scan.
    pub new_ids: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_counts() {
        let mut progress = ScanProgressData::new("s1", Utc::now());
        progress.record_new();
        progress.record_failed("/a", "boom");
        progress.record_skipped(SkippedScan {
            path: "/b".into(),
            name: "B".into(),
            reason: ExistingReason::Path,
            existing_id: "g1".into(),
        });

        assert_eq!(progress.processed_count, 3);
        let done = progress.complete(vec!["g2".into()], Utc::now());
        assert_eq!(done.new_count, 1);
        assert_eq!(done.failed_scans[0].error, "boom");
        assert_eq!(done.skipped_scans[0].reason, ExistingReason::Path);
    }

    #[test]
    fn test_definition_from_toml() {
        let def: ScannerDefinition = toml::from_str(
            r#"
            id = "vn"
            path = "/games"
            profile_id = "default"
            entity_depth = 1
            ignored_names = ["Trash"]
            interval_minutes = 30

            [[rules]]
            id = "circle"
            pattern = '^\[.*?\]\s*(?P<name>.+)'
            "#,
        )
        .unwrap();
        assert_eq!(def.entity_depth, 1);
        assert_eq!(def.interval_minutes, 30);
        assert!(def.rules[0].enabled);
        assert!(!def.icon_match);
        assert_eq!(def.options().ignored_names, vec!["Trash".to_string()]);
    }
}
