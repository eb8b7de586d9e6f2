use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

use crate::scraper::ContentType;

/// Errors for hashing and index loading.
#[derive(Debug, Clone, Error)]
pub enum PhashError {
    #[error("Failed to read {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Invalid stored hash: {0}")]
    InvalidHash(String),

    /// The record source (library store) failed.
    #[error("Record source error: {0}")]
    Source(String),

    #[error("Hashing task failed: {0}")]
    Task(String),
}

/// A stored row as returned by the record source, hash still hex-encoded.
#[derive(Debug, Clone)]
pub struct PhashRow {
    pub id: String,
    pub name: String,
    pub external_ids: BTreeMap<String, String>,
    pub hash: String,
}

/// Supplies hashed entities of one content type, in load order.
pub trait PhashRecordSource: Send + Sync {
    fn phash_rows(&self, content_type: ContentType) -> Result<Vec<PhashRow>, PhashError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhashDbRecord {
    pub id: String,
    pub name: String,
    pub external_ids: BTreeMap<String, String>,
    pub hash: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhashDbMatch {
    pub record: PhashDbRecord,
    pub distance: u32,
    pub input_phash: u64,
    /// Label of the input that produced the match.
    pub input: String,
}

/// Default match thresholds per content type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhashConfig {
    #[serde(default = "default_game_distance")]
    pub game_max_distance: u32,
    #[serde(default = "default_other_distance")]
    pub person_max_distance: u32,
    #[serde(default = "default_other_distance")]
    pub company_max_distance: u32,
    #[serde(default = "default_other_distance")]
    pub character_max_distance: u32,
}

fn default_game_distance() -> u32 {
    10
}

fn default_other_distance() -> u32 {
    8
}

impl Default for PhashConfig {
    fn default() -> Self {
        Self {
            game_max_distance: default_game_distance(),
            person_max_distance: default_other_distance(),
            company_max_distance: default_other_distance(),
            character_max_distance: default_other_distance(),
        }
    }
}

impl PhashConfig {
    pub fn max_distance(&self, content_type: ContentType) -> u32 {
        match content_type {
            ContentType::Game => self.game_max_distance,
            ContentType::Person => self.person_max_distance,
            ContentType::Company => self.company_max_distance,
            ContentType::Character => self.character_max_distance,
        }
    }

    pub fn index_spec(&self, content_type: ContentType) -> PhashIndexSpec {
        PhashIndexSpec::for_content_type(content_type, self.max_distance(content_type))
    }
}

/// Which index to match against and its default threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhashIndexSpec {
    /// Cache key; one cached table per index name.
    pub name: String,
    pub content_type: ContentType,
    pub default_max_distance: u32,
}

impl PhashIndexSpec {
    pub fn for_content_type(content_type: ContentType, default_max_distance: u32) -> Self {
        Self {
            name: format!("{}-icons", content_type.as_str()),
            content_type,
            default_max_distance,
        }
    }
}

/// One image to hash.
#[derive(Debug, Clone)]
pub enum PhashInput {
    Path(PathBuf),
    Bytes { label: String, data: Vec<u8> },
}

impl PhashInput {
    pub fn label(&self) -> String {
        match self {
            PhashInput::Path(path) => path.display().to_string(),
            PhashInput::Bytes { label, .. } => label.clone(),
        }
    }
}

/// An input that could not be hashed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhashFailure {
    pub file_path: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhashInputHash {
    pub input: String,
    pub hash: u64,
}

/// Result of matching a batch of inputs against one index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhashBatch {
    /// Globally closest record within the threshold.
    pub best: Option<PhashDbMatch>,
    /// Every successfully computed hash, in input order.
    pub hashes: Vec<PhashInputHash>,
    pub failures: Vec<PhashFailure>,
    /// Inputs that decoded to an empty image.
    pub empty_inputs: Vec<String>,
}
