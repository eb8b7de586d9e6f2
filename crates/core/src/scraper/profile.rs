use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use super::{ContentType, Slot};

/// Policy for combining one slot's results from several providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// First non-empty result by priority.
    #[default]
    First,
    /// Concatenate and de-duplicate.
    Merge,
    /// Concatenate as-is.
    Append,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotProviderEntry {
    pub provider_id: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Lower runs first.
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl SlotProviderEntry {
    pub fn new(provider_id: impl Into<String>, priority: i32) -> Self {
        Self {
            provider_id: provider_id.into(),
            enabled: true,
            priority,
            locale: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotConfig {
    #[serde(default)]
    pub providers: Vec<SlotProviderEntry>,
    #[serde(default)]
    pub merge_strategy: MergeStrategy,
}

impl SlotConfig {
    /// Enabled entries, stable-sorted by priority.
    pub fn enabled_by_priority(&self) -> Vec<&SlotProviderEntry> {
        let mut entries: Vec<_> = self.providers.iter().filter(|e| e.enabled).collect();
        entries.sort_by_key(|e| e.priority);
        entries
    }
}

/// A user-owned bundle of provider choices for one content type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScraperProfile {
    pub id: String,
    pub name: String,
    pub media_type: ContentType,
    pub search_provider_id: String,
    #[serde(default)]
    pub slot_configs: BTreeMap<Slot, SlotConfig>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScraperProfile {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        media_type: ContentType,
        search_provider_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        let mut profile = Self {
            id: id.into(),
            name: name.into(),
            media_type,
            search_provider_id: search_provider_id.into(),
            slot_configs: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        };
        profile.normalize();
        profile
    }

    /// Configure `slot` with providers in priority order.
    pub fn with_slot(mut self, slot: Slot, provider_ids: &[&str], strategy: MergeStrategy) -> Self {
        self.slot_configs.insert(
            slot,
            SlotConfig {
                providers: provider_ids
                    .iter()
                    .enumerate()
                    .map(|(i, id)| SlotProviderEntry::new(*id, i as i32))
                    .collect(),
                merge_strategy: strategy,
            },
        );
        self
    }

    /// Give every slot of the media type an entry and drop foreign slots.
    /// Returns whether anything changed.
    pub fn normalize(&mut self) -> bool {
        let slots = self.media_type.slots();
        let before = self.slot_configs.len();
        self.slot_configs.retain(|slot, _| slots.contains(slot));
        let mut changed = self.slot_configs.len() != before;
        for slot in slots {
            if !self.slot_configs.contains_key(slot) {
                self.slot_configs.insert(*slot, SlotConfig::default());
                changed = true;
            }
        }
        changed
    }

    /// Every provider id the profile mentions, search provider included.
    pub fn referenced_provider_ids(&self) -> BTreeSet<String> {
        let mut ids = BTreeSet::new();
        ids.insert(self.search_provider_id.clone());
        for config in self.slot_configs.values() {
            ids.extend(config.providers.iter().map(|e| e.provider_id.clone()));
        }
        ids
    }

    pub fn references(&self, provider_id: &str) -> bool {
        self.search_provider_id == provider_id
            || self
                .slot_configs
                .values()
                .any(|c| c.providers.iter().any(|e| e.provider_id == provider_id))
    }
}

/// Outcome of a profile validity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileAction {
    Unchanged,
    /// Invalid slot entries were stripped.
    Updated,
    /// The search provider was invalid; the profile is gone.
    Deleted,
}

/// Errors for profile storage.
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Profile not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Persistent storage for scraper profiles.
pub trait ProfileStore: Send + Sync {
    /// Load a profile, normalised for its media type.
    fn get(&self, id: &str) -> Result<Option<ScraperProfile>, ProfileError>;

    /// List profiles, optionally only those of one media type.
    fn list(&self, media_type: Option<ContentType>) -> Result<Vec<ScraperProfile>, ProfileError>;

    /// Insert or replace a profile.
    fn save(&self, profile: &ScraperProfile) -> Result<(), ProfileError>;

    /// Delete a profile. Returns whether it existed.
    fn delete(&self, id: &str) -> Result<bool, ProfileError>;
}
