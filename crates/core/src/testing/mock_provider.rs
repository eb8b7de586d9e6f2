//! Mock scraper provider for testing.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::scraper::{
    CapabilitySet, ContentType, EntityInfo, ImageCapability, InfoCapability, ProviderError,
    RelatedCapability, RelatedEntity, ScraperLookup, ScraperProvider, SearchCapability,
    SearchHit, Slot, SlotData, SlotKind, TagRef, TagsCapability,
};

/// A call made against the mock, for assertions.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// `"search"` or the slot name.
    pub operation: String,
    /// Provider item id for slot fetches.
    pub item_id: Option<String>,
    pub lookup: ScraperLookup,
    pub at: std::time::Instant,
}

/// Mock implementation of [`ScraperProvider`].
///
/// Capabilities are opt-in through the builder; `declaring` overrides the
/// declared set so registration mismatches can be exercised.
///
/// # Example
///
/// ```rust,ignore
/// let provider = MockProvider::new("mock", ContentType::Game)
///     .with_search()
///     .with_hits(vec![fixtures::search_hit("1", "Foo")])
///     .with_slot_data(Slot::Tags, SlotData::Tags(vec![TagRef::new("drama")]));
/// ```
pub struct MockProvider {
    id: String,
    name: String,
    content_type: ContentType,
    search: bool,
    slots: BTreeSet<Slot>,
    declared: Option<CapabilitySet>,
    /// Hits keyed by lowercased lookup name.
    hits_by_name: HashMap<String, Vec<SearchHit>>,
    /// Hits returned when no name-specific entry exists.
    default_hits: Vec<SearchHit>,
    slot_data: HashMap<Slot, Result<SlotData, ProviderError>>,
    delay: Option<Duration>,
    calls: Arc<RwLock<Vec<RecordedCall>>>,
    next_search_error: Arc<RwLock<Option<ProviderError>>>,
}

impl std::fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockProvider")
            .field("id", &self.id)
            .field("content_type", &self.content_type)
            .field("search", &self.search)
            .field("slots", &self.slots)
            .finish()
    }
}

impl MockProvider {
    pub fn new(id: &str, content_type: ContentType) -> Self {
        Self {
            id: id.to_string(),
            name: format!("Mock {}", id),
            content_type,
            search: false,
            slots: BTreeSet::new(),
            declared: None,
            hits_by_name: HashMap::new(),
            default_hits: Vec::new(),
            slot_data: HashMap::new(),
            delay: None,
            calls: Arc::new(RwLock::new(Vec::new())),
            next_search_error: Arc::new(RwLock::new(None)),
        }
    }

    pub fn with_search(mut self) -> Self {
        self.search = true;
        self
    }

    pub fn with_slot(mut self, slot: Slot) -> Self {
        self.slots.insert(slot);
        self
    }

    /// Declare a capability set that differs from what is implemented.
    pub fn declaring(mut self, caps: CapabilitySet) -> Self {
        self.declared = Some(caps);
        self
    }

    /// Implement search and return `hits` for every query.
    pub fn with_hits(mut self, hits: Vec<SearchHit>) -> Self {
        self.search = true;
        self.default_hits = hits;
        self
    }

    /// Implement search and return `hits` only for lookups named `name`.
    pub fn with_hits_for(mut self, name: &str, hits: Vec<SearchHit>) -> Self {
        self.search = true;
        self.hits_by_name.insert(name.to_lowercase(), hits);
        self
    }

    /// Implement `slot` and return `data` for any item id.
    pub fn with_slot_data(mut self, slot: Slot, data: SlotData) -> Self {
        self.slots.insert(slot);
        self.slot_data.insert(slot, Ok(data));
        self
    }

    /// Implement `slot` and fail every fetch of it.
    pub fn with_slot_error(mut self, slot: Slot, error: ProviderError) -> Self {
        self.slots.insert(slot);
        self.slot_data.insert(slot, Err(error));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// The next search fails with `error`.
    pub async fn fail_next_search(&self, error: ProviderError) {
        *self.next_search_error.write().await = Some(error);
    }

    pub async fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.calls.read().await.clone()
    }

    /// Number of calls made for an operation (`"search"` or a slot name).
    pub async fn call_count(&self, operation: &str) -> usize {
        self.calls
            .read()
            .await
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    async fn record(&self, operation: &str, item_id: Option<&str>, lookup: &ScraperLookup) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.calls.write().await.push(RecordedCall {
            operation: operation.to_string(),
            item_id: item_id.map(str::to_string),
            lookup: lookup.clone(),
            at: std::time::Instant::now(),
        });
    }

    fn slot_result(&self, slot: Slot) -> Result<SlotData, ProviderError> {
        self.slot_data
            .get(&slot)
            .cloned()
            .unwrap_or_else(|| Ok(SlotData::empty_for(slot)))
    }
}

impl ScraperProvider for MockProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn content_type(&self) -> ContentType {
        self.content_type
    }

    fn capabilities(&self) -> CapabilitySet {
        self.declared.clone().unwrap_or_else(|| CapabilitySet {
            search: self.search,
            slots: self.slots.clone(),
        })
    }

    fn as_search(&self) -> Option<&dyn SearchCapability> {
        self.search.then_some(self as &dyn SearchCapability)
    }

    fn as_info(&self) -> Option<&dyn InfoCapability> {
        self.slots
            .contains(&Slot::Info)
            .then_some(self as &dyn InfoCapability)
    }

    fn as_tags(&self) -> Option<&dyn TagsCapability> {
        self.slots
            .contains(&Slot::Tags)
            .then_some(self as &dyn TagsCapability)
    }

    fn as_images(&self, slot: Slot) -> Option<&dyn ImageCapability> {
        (slot.is_image() && self.slots.contains(&slot)).then_some(self as &dyn ImageCapability)
    }

    fn as_related(&self, slot: Slot) -> Option<&dyn RelatedCapability> {
        (matches!(slot.kind(), SlotKind::Related(_)) && self.slots.contains(&slot))
            .then_some(self as &dyn RelatedCapability)
    }
}

#[async_trait]
impl SearchCapability for MockProvider {
    async fn search(&self, lookup: &ScraperLookup) -> Result<Vec<SearchHit>, ProviderError> {
        self.record("search", None, lookup).await;
        if let Some(err) = self.next_search_error.write().await.take() {
            return Err(err);
        }
        Ok(self
            .hits_by_name
            .get(&lookup.name.to_lowercase())
            .cloned()
            .unwrap_or_else(|| self.default_hits.clone()))
    }
}

#[async_trait]
impl InfoCapability for MockProvider {
    async fn get_info(
        &self,
        id: &str,
        lookup: &ScraperLookup,
    ) -> Result<EntityInfo, ProviderError> {
        self.record(Slot::Info.as_str(), Some(id), lookup).await;
        match self.slot_result(Slot::Info)? {
            SlotData::Info(info) => Ok(info),
            _ => Ok(EntityInfo::default()),
        }
    }
}

#[async_trait]
impl TagsCapability for MockProvider {
    async fn get_tags(
        &self,
        id: &str,
        lookup: &ScraperLookup,
    ) -> Result<Vec<TagRef>, ProviderError> {
        self.record(Slot::Tags.as_str(), Some(id), lookup).await;
        match self.slot_result(Slot::Tags)? {
            SlotData::Tags(tags) => Ok(tags),
            _ => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl ImageCapability for MockProvider {
    async fn get_images(
        &self,
        slot: Slot,
        id: &str,
        lookup: &ScraperLookup,
    ) -> Result<Vec<String>, ProviderError> {
        self.record(slot.as_str(), Some(id), lookup).await;
        match self.slot_result(slot)? {
            SlotData::Images(urls) => Ok(urls),
            _ => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl RelatedCapability for MockProvider {
    async fn get_related(
        &self,
        slot: Slot,
        id: &str,
        lookup: &ScraperLookup,
    ) -> Result<Vec<RelatedEntity>, ProviderError> {
        self.record(slot.as_str(), Some(id), lookup).await;
        match self.slot_result(slot)? {
            SlotData::Related(items) => Ok(items),
            _ => Ok(Vec::new()),
        }
    }
}
