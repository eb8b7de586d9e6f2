use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::provider::implemented_capabilities;
use super::{ContentType, ProviderInfo, ScraperProvider};

/// Errors for provider registration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Provider already registered: {0}")]
    Duplicate(String),

    #[error("Provider not registered: {0}")]
    NotFound(String),

    /// Declared capabilities differ from the implemented ones.
    #[error("Provider '{provider_id}' declares {declared:?} but implements {implemented:?}")]
    CapabilityMismatch {
        provider_id: String,
        declared: Vec<String>,
        implemented: Vec<String>,
    },

    #[error("Provider '{provider_id}' serves {actual}, registry expects {expected}")]
    WrongContentType {
        provider_id: String,
        expected: ContentType,
        actual: ContentType,
    },
}

/// Providers registered for one content type.
pub struct ProviderRegistry {
    content_type: ContentType,
    providers: RwLock<BTreeMap<String, Arc<dyn ScraperProvider>>>,
}

impl ProviderRegistry {
    pub fn new(content_type: ContentType) -> Self {
        Self {
            content_type,
            providers: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    /// Register a provider after checking its declared capabilities.
    pub async fn register(&self, provider: Arc<dyn ScraperProvider>) -> Result<(), RegistryError> {
        let id = provider.id().to_string();

        if provider.content_type() != self.content_type {
            return Err(RegistryError::WrongContentType {
                provider_id: id,
                expected: self.content_type,
                actual: provider.content_type(),
            });
        }

        let declared = provider.capabilities();
        let implemented = implemented_capabilities(provider.as_ref());
        if declared != implemented {
            warn!(
                provider_id = %id,
                declared = ?declared.names(),
                implemented = ?implemented.names(),
                "Rejecting provider with mismatched capabilities"
            );
            return Err(RegistryError::CapabilityMismatch {
                provider_id: id,
                declared: declared.names(),
                implemented: implemented.names(),
            });
        }

        let mut providers = self.providers.write().await;
        if providers.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }
        info!(
            provider_id = %id,
            content_type = %self.content_type,
            capabilities = ?declared.names(),
            "Registered scraper provider"
        );
        providers.insert(id, provider);
        Ok(())
    }

    /// Remove a provider. Profile repair is the caller's job.
    pub async fn unregister(&self, id: &str) -> Result<Arc<dyn ScraperProvider>, RegistryError> {
        let removed = self.providers.write().await.remove(id);
        match removed {
            Some(provider) => {
                info!(provider_id = %id, content_type = %self.content_type, "Unregistered scraper provider");
                Ok(provider)
            }
            None => Err(RegistryError::NotFound(id.to_string())),
        }
    }

    pub async fn get(&self, id: &str) -> Option<Arc<dyn ScraperProvider>> {
        self.providers.read().await.get(id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.providers.read().await.contains_key(id)
    }

    pub async fn list(&self) -> Vec<ProviderInfo> {
        self.providers
            .read()
            .await
            .values()
            .map(|p| ProviderInfo {
                id: p.id().to_string(),
                name: p.name().to_string(),
                content_type: p.content_type(),
                capabilities: p.capabilities(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::{CapabilitySet, Slot};
    use crate::testing::MockProvider;

    #[tokio::test]
    async fn test_register_and_list() {
        let registry = ProviderRegistry::new(ContentType::Game);
        let provider = MockProvider::new("mock", ContentType::Game)
            .with_search()
            .with_slot(Slot::Info);
        registry.register(Arc::new(provider)).await.unwrap();

        let listed = registry.list().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "mock");
        assert!(listed[0].capabilities.search);
        assert!(registry.contains("mock").await);
    }

    #[tokio::test]
    async fn test_duplicate_rejected() {
        let registry = ProviderRegistry::new(ContentType::Game);
        registry
            .register(Arc::new(MockProvider::new("mock", ContentType::Game)))
            .await
            .unwrap();
        let result = registry
            .register(Arc::new(MockProvider::new("mock", ContentType::Game)))
            .await;
        assert_eq!(result, Err(RegistryError::Duplicate("mock".to_string())));
    }

    #[tokio::test]
    async fn test_declared_but_not_implemented_rejected() {
        let registry = ProviderRegistry::new(ContentType::Game);
        let provider = MockProvider::new("liar", ContentType::Game)
            .with_slot(Slot::Tags)
            .declaring(CapabilitySet::new().with_slots(&[Slot::Tags, Slot::Covers]));
        let result = registry.register(Arc::new(provider)).await;
        assert!(matches!(
            result,
            Err(RegistryError::CapabilityMismatch { ref provider_id, .. }) if provider_id == "liar"
        ));
        assert!(!registry.contains("liar").await);
    }

    #[tokio::test]
    async fn test_implemented_but_not_declared_rejected() {
        let registry = ProviderRegistry::new(ContentType::Game);
        let provider = MockProvider::new("shy", ContentType::Game)
            .with_search()
            .with_slot(Slot::Info)
            .declaring(CapabilitySet::new().with_slot(Slot::Info));
        let result = registry.register(Arc::new(provider)).await;
        assert!(matches!(result, Err(RegistryError::CapabilityMismatch { .. })));
    }

    #[tokio::test]
    async fn test_wrong_content_type_rejected() {
        let registry = ProviderRegistry::new(ContentType::Game);
        let result = registry
            .register(Arc::new(MockProvider::new("people", ContentType::Person)))
            .await;
        assert!(matches!(result, Err(RegistryError::WrongContentType { .. })));
    }

    #[tokio::test]
    async fn test_unregister_unknown() {
        let registry = ProviderRegistry::new(ContentType::Game);
        assert!(matches!(
            registry.unregister("nope").await,
            Err(RegistryError::NotFound(_))
        ));
    }
}
