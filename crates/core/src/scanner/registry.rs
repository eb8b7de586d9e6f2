use std::collections::BTreeMap;

use tokio::sync::RwLock;
use tracing::info;

use super::{ScanError, ScannerDefinition, MAX_INTERVAL_MINUTES};
use crate::extractor::NameExtractor;

/// In-memory scanner definitions, keyed by id.
#[derive(Default)]
pub struct ScannerRegistry {
    scanners: RwLock<BTreeMap<String, ScannerDefinition>>,
}

impl ScannerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from config, rejecting invalid definitions.
    pub async fn from_definitions(definitions: &[ScannerDefinition]) -> Result<Self, ScanError> {
        let registry = Self::new();
        for definition in definitions {
            registry.upsert(definition.clone()).await?;
        }
        Ok(registry)
    }

    /// Insert or replace a scanner. Returns true if it replaced one.
    pub async fn upsert(&self, definition: ScannerDefinition) -> Result<bool, ScanError> {
        if definition.id.trim().is_empty() {
            return Err(ScanError::InvalidDefinition("scanner id is empty".to_string()));
        }
        if definition.profile_id.trim().is_empty() {
            return Err(ScanError::InvalidDefinition(format!(
                "scanner '{}' has no profile_id",
                definition.id
            )));
        }
        if definition.interval_minutes > MAX_INTERVAL_MINUTES {
            return Err(ScanError::InvalidDefinition(format!(
                "scanner '{}' interval {} exceeds {} minutes",
                definition.id, definition.interval_minutes, MAX_INTERVAL_MINUTES
            )));
        }
        NameExtractor::new(&definition.rules)?;

        let id = definition.id.clone();
        let replaced = self
            .scanners
            .write()
            .await
            .insert(id.clone(), definition)
            .is_some();
        info!(scanner_id = %id, replaced, "Scanner registered");
        Ok(replaced)
    }

    pub async fn remove(&self, id: &str) -> Option<ScannerDefinition> {
        self.scanners.write().await.remove(id)
    }

    pub async fn get(&self, id: &str) -> Option<ScannerDefinition> {
        self.scanners.read().await.get(id).cloned()
    }

    pub async fn list(&self) -> Vec<ScannerDefinition> {
        self.scanners.read().await.values().cloned().collect()
    }

    pub async fn ids(&self) -> Vec<String> {
        self.scanners.read().await.keys().cloned().collect()
    }
}
