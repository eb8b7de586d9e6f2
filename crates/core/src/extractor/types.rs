use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// A user-configured rule turning a raw filesystem name into an entity name.
///
/// The pattern must declare a `name` capture group; its trimmed capture
/// becomes the extracted name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameExtractionRule {
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub pattern: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl NameExtractionRule {
    pub fn new(id: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            pattern: pattern.into(),
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// A scan candidate. Produced per scan iteration and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityEntry {
    /// Absolute path of the file or directory.
    pub path: PathBuf,
    /// Entry name as found on disk.
    pub original_name: String,
    /// File stem for files, full name for directories.
    pub original_base_name: String,
    /// Name produced by the first matching rule, or the base name.
    pub extracted_name: String,
    /// Id of the rule that produced `extracted_name`.
    pub matched_rule_id: Option<String>,
    pub is_dir: bool,
}

/// Outcome of running the extractor over one base name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub name: String,
    pub matched_rule_id: Option<String>,
}

/// One row of a rule dry-run over a directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionTestResult {
    pub path: PathBuf,
    pub original_name: String,
    pub original_base_name: String,
    pub extracted_name: String,
    pub matched_rule_id: Option<String>,
}

impl From<EntityEntry> for ExtractionTestResult {
    fn from(entry: EntityEntry) -> Self {
        Self {
            path: entry.path,
            original_name: entry.original_name,
            original_base_name: entry.original_base_name,
            extracted_name: entry.extracted_name,
            matched_rule_id: entry.matched_rule_id,
        }
    }
}

/// Errors raised while compiling extraction rules.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("Rule '{rule_id}' has an invalid pattern: {reason}")]
    InvalidPattern { rule_id: String, reason: String },

    #[error("Rule '{rule_id}' does not declare a 'name' capture group")]
    MissingNameGroup { rule_id: String },
}
