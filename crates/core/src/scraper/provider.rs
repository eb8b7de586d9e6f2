//! Provider traits. A provider exposes one trait object per capability it
//! implements; the declared [`CapabilitySet`] must match exactly.

use async_trait::async_trait;
use thiserror::Error;

use super::{
    CapabilitySet, ContentType, EntityInfo, RelatedEntity, ScraperLookup, SearchHit, Slot,
    SlotData, SlotKind, TagRef,
};

/// Errors raised by a provider call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Network or HTTP status failure.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Response could not be decoded.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The provider has no item with this id.
    #[error("Item not found: {0}")]
    NotFound(String),

    /// The provider does not implement the requested capability.
    #[error("Provider '{provider_id}' does not support '{capability}'")]
    Unsupported {
        provider_id: String,
        capability: String,
    },

    #[error("Provider error: {0}")]
    Other(String),
}

#[async_trait]
pub trait SearchCapability: Send + Sync {
    async fn search(&self, lookup: &ScraperLookup) -> Result<Vec<SearchHit>, ProviderError>;
}

#[async_trait]
pub trait InfoCapability: Send + Sync {
    async fn get_info(&self, id: &str, lookup: &ScraperLookup)
        -> Result<EntityInfo, ProviderError>;
}

#[async_trait]
pub trait TagsCapability: Send + Sync {
    async fn get_tags(&self, id: &str, lookup: &ScraperLookup)
        -> Result<Vec<TagRef>, ProviderError>;
}

/// Image URL lists for image slots (covers, backgrounds, logos, icons, photos).
#[async_trait]
pub trait ImageCapability: Send + Sync {
    async fn get_images(
        &self,
        slot: Slot,
        id: &str,
        lookup: &ScraperLookup,
    ) -> Result<Vec<String>, ProviderError>;
}

/// Linked entities for relation slots (persons, companies, characters).
#[async_trait]
pub trait RelatedCapability: Send + Sync {
    async fn get_related(
        &self,
        slot: Slot,
        id: &str,
        lookup: &ScraperLookup,
    ) -> Result<Vec<RelatedEntity>, ProviderError>;
}

/// A metadata source for one content type.
///
/// Capability accessors default to `None`; a provider overrides the ones it
/// implements and lists the same capabilities in [`ScraperProvider::capabilities`].
pub trait ScraperProvider: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn content_type(&self) -> ContentType;

    /// Declared capabilities, validated against the accessors at registration.
    fn capabilities(&self) -> CapabilitySet;

    fn as_search(&self) -> Option<&dyn SearchCapability> {
        None
    }

    fn as_info(&self) -> Option<&dyn InfoCapability> {
        None
    }

    fn as_tags(&self) -> Option<&dyn TagsCapability> {
        None
    }

    fn as_images(&self, _slot: Slot) -> Option<&dyn ImageCapability> {
        None
    }

    fn as_related(&self, _slot: Slot) -> Option<&dyn RelatedCapability> {
        None
    }
}

/// Whether the provider exposes an implementation for `slot`.
pub fn implements_slot(provider: &dyn ScraperProvider, slot: Slot) -> bool {
    match slot.kind() {
        SlotKind::Info => provider.as_info().is_some(),
        SlotKind::Tags => provider.as_tags().is_some(),
        SlotKind::Images => provider.as_images(slot).is_some(),
        SlotKind::Related(_) => provider.as_related(slot).is_some(),
    }
}

/// Capabilities actually implemented, restricted to the slots of the
/// provider's content type.
pub fn implemented_capabilities(provider: &dyn ScraperProvider) -> CapabilitySet {
    let mut caps = CapabilitySet::new();
    caps.search = provider.as_search().is_some();
    for slot in provider.content_type().slots() {
        if implements_slot(provider, *slot) {
            caps.slots.insert(*slot);
        }
    }
    caps
}

/// Whether the provider can serve `slot`, by declaration and by implementation.
pub fn supports_slot(provider: &dyn ScraperProvider, slot: Slot) -> bool {
    provider.capabilities().supports(slot) && implements_slot(provider, slot)
}

pub fn supports_search(provider: &dyn ScraperProvider) -> bool {
    provider.capabilities().search && provider.as_search().is_some()
}

/// Dispatch a slot fetch to the matching capability.
pub async fn fetch_slot(
    provider: &dyn ScraperProvider,
    slot: Slot,
    id: &str,
    lookup: &ScraperLookup,
) -> Result<SlotData, ProviderError> {
    let unsupported = || ProviderError::Unsupported {
        provider_id: provider.id().to_string(),
        capability: slot.as_str().to_string(),
    };
    if !provider.capabilities().supports(slot) {
        return Err(unsupported());
    }
    match slot.kind() {
        SlotKind::Info => {
            let cap = provider.as_info().ok_or_else(unsupported)?;
            cap.get_info(id, lookup).await.map(SlotData::Info)
        }
        SlotKind::Tags => {
            let cap = provider.as_tags().ok_or_else(unsupported)?;
            cap.get_tags(id, lookup).await.map(SlotData::Tags)
        }
        SlotKind::Images => {
            let cap = provider.as_images(slot).ok_or_else(unsupported)?;
            cap.get_images(slot, id, lookup).await.map(SlotData::Images)
        }
        SlotKind::Related(_) => {
            let cap = provider.as_related(slot).ok_or_else(unsupported)?;
            cap.get_related(slot, id, lookup).await.map(SlotData::Related)
        }
    }
}

/// Run the provider's search capability.
pub async fn search_with(
    provider: &dyn ScraperProvider,
    lookup: &ScraperLookup,
) -> Result<Vec<SearchHit>, ProviderError> {
    if !provider.capabilities().search {
        return Err(ProviderError::Unsupported {
            provider_id: provider.id().to_string(),
            capability: "search".to_string(),
        });
    }
    match provider.as_search() {
        Some(cap) => cap.search(lookup).await,
        None => Err(ProviderError::Unsupported {
            provider_id: provider.id().to_string(),
            capability: "search".to_string(),
        }),
    }
}
