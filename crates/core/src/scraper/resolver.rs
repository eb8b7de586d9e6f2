//! Metadata resolution: search, per-provider id resolution, parallel slot fetch.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::merge::merge_slot;
use super::provider::{fetch_slot, search_with, supports_search, supports_slot};
use super::{
    ContentType, EntityInfo, ProfileAction, ProfileError, ProfileStore, ProviderError,
    ProviderInfo, ProviderRegistry, RegistryError, ResolvedMetadata, ScraperLookup,
    ScraperProfile, ScraperProvider, SearchHit, Slot, SlotData, SlotFailure,
};
use crate::metrics;

/// Errors surfaced by the resolver to its caller.
#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    #[error("Profile '{profile_id}' is for {actual}, expected {expected}")]
    WrongMediaType {
        profile_id: String,
        expected: ContentType,
        actual: ContentType,
    },

    #[error("Provider not registered: {0}")]
    ProviderNotFound(String),

    #[error("Slot '{0}' is not an image slot of this content type")]
    InvalidSlot(Slot),

    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Per-call options for [`MetadataResolver::get_metadata`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetMetadataOptions {
    /// A search hit the caller already accepted; skips the primary search.
    #[serde(default)]
    pub accepted_hit: Option<SearchHit>,
    /// Restrict fetching to these slots.
    #[serde(default)]
    pub slots: Option<Vec<Slot>>,
}

/// The primary search provider's match.
struct PrimaryMatch {
    item_id: String,
    hit: Option<SearchHit>,
}

struct FetchJob {
    slot: Slot,
    provider_id: String,
    locale: Option<String>,
}

/// Resolves metadata for one content type.
///
/// Owns the provider registry for that type; profiles come from a shared store.
pub struct MetadataResolver {
    content_type: ContentType,
    registry: ProviderRegistry,
    profiles: Arc<dyn ProfileStore>,
}

impl MetadataResolver {
    pub fn new(content_type: ContentType, profiles: Arc<dyn ProfileStore>) -> Self {
        Self {
            content_type,
            registry: ProviderRegistry::new(content_type),
            profiles,
        }
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub async fn register_provider(
        &self,
        provider: Arc<dyn ScraperProvider>,
    ) -> Result<(), RegistryError> {
        self.registry.register(provider).await
    }

    /// Remove a provider and repair every profile that referenced it.
    ///
    /// Returns the action taken per affected profile id.
    pub async fn unregister_provider(
        &self,
        provider_id: &str,
    ) -> Result<BTreeMap<String, ProfileAction>, ResolverError> {
        self.registry.unregister(provider_id).await?;

        let mut actions = BTreeMap::new();
        for profile in self.profiles.list(Some(self.content_type))? {
            if profile.references(provider_id) {
                let action = self.ensure_profile_valid(&profile.id).await?;
                actions.insert(profile.id, action);
            }
        }
        info!(
            provider_id = %provider_id,
            affected = actions.len(),
            "Repaired profiles after provider removal"
        );
        Ok(actions)
    }

    pub async fn list_providers(&self) -> Vec<ProviderInfo> {
        self.registry.list().await
    }

    /// Load a profile of this resolver's content type.
    pub fn load_profile(&self, profile_id: &str) -> Result<ScraperProfile, ResolverError> {
        let profile = self
            .profiles
            .get(profile_id)?
            .ok_or_else(|| ResolverError::ProfileNotFound(profile_id.to_string()))?;
        if profile.media_type != self.content_type {
            return Err(ResolverError::WrongMediaType {
                profile_id: profile_id.to_string(),
                expected: self.content_type,
                actual: profile.media_type,
            });
        }
        Ok(profile)
    }

    /// Run the profile's search provider.
    pub async fn search(
        &self,
        profile_id: &str,
        query: &ScraperLookup,
    ) -> Result<Vec<SearchHit>, ResolverError> {
        let profile = self.load_profile(profile_id)?;
        let provider = self
            .registry
            .get(&profile.search_provider_id)
            .await
            .ok_or_else(|| ResolverError::ProviderNotFound(profile.search_provider_id.clone()))?;
        Ok(search_with(provider.as_ref(), query).await?)
    }

    /// Resolve complete metadata for `lookup` using the profile's providers.
    ///
    /// Returns `Ok(None)` when the search phase cannot produce a match,
    /// including when the search provider is misconfigured.
    pub async fn get_metadata(
        &self,
        profile_id: &str,
        lookup: &ScraperLookup,
        options: &GetMetadataOptions,
    ) -> Result<Option<ResolvedMetadata>, ResolverError> {
        let profile = self.load_profile(profile_id)?;
        let search_id = profile.search_provider_id.clone();

        let Some(search_provider) = self.registry.get(&search_id).await else {
            warn!(profile_id = %profile_id, provider_id = %search_id, "Search provider not registered");
            return Ok(None);
        };
        if !supports_search(search_provider.as_ref()) {
            warn!(profile_id = %profile_id, provider_id = %search_id, "Search provider cannot search");
            return Ok(None);
        }

        let Some(primary) = self
            .primary_match(search_provider.as_ref(), lookup, options)
            .await?
        else {
            debug!(name = %lookup.name, provider_id = %search_id, "No search match");
            return Ok(None);
        };

        let mut ids = BTreeMap::new();
        if let Some(hit) = &primary.hit {
            ids.extend(hit.external_ids.clone());
        }
        ids.extend(lookup.known_ids.clone());
        ids.insert(search_id.clone(), primary.item_id.clone());

        let search_name = primary
            .hit
            .as_ref()
            .and_then(|h| h.original_name.clone())
            .unwrap_or_else(|| lookup.name.clone());

        let slots = selected_slots(&profile, options);
        let jobs = fetch_jobs(&profile, &slots);

        // Resolve ids for every other referenced provider concurrently.
        let to_resolve: BTreeSet<String> = jobs
            .iter()
            .map(|j| j.provider_id.clone())
            .filter(|id| !ids.contains_key(id))
            .collect();
        let search_lookup = ScraperLookup {
            name: search_name,
            locale: lookup.locale.clone(),
            known_ids: BTreeMap::new(),
        };
        let resolutions = join_all(to_resolve.into_iter().map(|provider_id| {
            let search_lookup = &search_lookup;
            async move {
                let outcome = self.resolve_provider_id(&provider_id, search_lookup).await;
                (provider_id, outcome)
            }
        }))
        .await;

        let mut unresolved = BTreeMap::new();
        for (provider_id, outcome) in resolutions {
            match outcome {
                Ok(item_id) => {
                    ids.insert(provider_id, item_id);
                }
                Err(reason) => {
                    unresolved.insert(provider_id, reason);
                }
            }
        }

        // Fetch every slot x provider concurrently; join_all keeps job order.
        let outcomes = join_all(
            jobs.iter()
                .map(|job| self.fetch_job(job, lookup, &ids, &unresolved)),
        )
        .await;

        let mut metadata = ResolvedMetadata::new(self.content_type, EntityInfo::default());
        let mut by_slot: BTreeMap<Slot, Vec<SlotData>> = BTreeMap::new();
        for (job, outcome) in jobs.iter().zip(outcomes) {
            match outcome {
                Ok(data) => by_slot.entry(job.slot).or_default().push(data),
                Err(error) => {
                    debug!(
                        slot = %job.slot,
                        provider_id = %job.provider_id,
                        error = %error,
                        "Slot fetch failed"
                    );
                    metrics::SLOT_FAILURES
                        .with_label_values(&[job.provider_id.as_str(), job.slot.as_str()])
                        .inc();
                    metadata.slot_failures.push(SlotFailure {
                        slot: job.slot,
                        provider_id: Some(job.provider_id.clone()),
                        error,
                    });
                }
            }
        }

        for slot in &slots {
            let strategy = profile
                .slot_configs
                .get(slot)
                .map(|c| c.merge_strategy)
                .unwrap_or_default();
            let results = by_slot.remove(slot).unwrap_or_default();
            metadata.apply(*slot, merge_slot(*slot, strategy, results));
        }

        apply_info_fallback(&mut metadata.info, primary.hit.as_ref(), lookup);
        metadata.external_ids = ids;

        info!(
            content_type = %self.content_type,
            profile_id = %profile_id,
            name = %metadata.info.name,
            failures = metadata.slot_failures.len(),
            "Resolved metadata"
        );
        Ok(Some(metadata))
    }

    /// Fetch one image slot from one provider, resolving its id first.
    pub async fn get_provider_images(
        &self,
        provider_id: &str,
        lookup: &ScraperLookup,
        slot: Slot,
    ) -> Result<Vec<String>, ResolverError> {
        if !slot.is_image() || !self.content_type.has_slot(slot) {
            return Err(ResolverError::InvalidSlot(slot));
        }
        let provider = self
            .registry
            .get(provider_id)
            .await
            .ok_or_else(|| ResolverError::ProviderNotFound(provider_id.to_string()))?;

        let item_id = match lookup.known_ids.get(provider_id) {
            Some(id) => id.clone(),
            None => match search_with(provider.as_ref(), lookup).await?.into_iter().next() {
                Some(hit) => hit.id,
                None => return Ok(Vec::new()),
            },
        };

        match fetch_slot(provider.as_ref(), slot, &item_id, lookup).await? {
            SlotData::Images(urls) => Ok(urls),
            _ => Ok(Vec::new()),
        }
    }

    /// Check a profile against the registry and repair or delete it.
    ///
    /// Idempotent: a repaired profile is `Unchanged` on the next call.
    pub async fn ensure_profile_valid(
        &self,
        profile_id: &str,
    ) -> Result<ProfileAction, ResolverError> {
        let mut profile = self.load_profile(profile_id)?;

        let search_valid = match self.registry.get(&profile.search_provider_id).await {
            Some(provider) => supports_search(provider.as_ref()),
            None => false,
        };
        if !search_valid {
            self.profiles.delete(profile_id)?;
            warn!(
                profile_id = %profile_id,
                provider_id = %profile.search_provider_id,
                "Deleted profile with invalid search provider"
            );
            return Ok(ProfileAction::Deleted);
        }

        let mut stripped = 0usize;
        for (slot, config) in profile.slot_configs.iter_mut() {
            let mut kept = Vec::with_capacity(config.providers.len());
            for entry in std::mem::take(&mut config.providers) {
                let valid = match self.registry.get(&entry.provider_id).await {
                    Some(provider) => supports_slot(provider.as_ref(), *slot),
                    None => false,
                };
                if valid {
                    kept.push(entry);
                } else {
                    stripped += 1;
                }
            }
            config.providers = kept;
        }

        if stripped == 0 {
            return Ok(ProfileAction::Unchanged);
        }
        profile.updated_at = Utc::now();
        self.profiles.save(&profile)?;
        info!(profile_id = %profile_id, stripped, "Stripped invalid provider entries from profile");
        Ok(ProfileAction::Updated)
    }

    async fn primary_match(
        &self,
        provider: &dyn ScraperProvider,
        lookup: &ScraperLookup,
        options: &GetMetadataOptions,
    ) -> Result<Option<PrimaryMatch>, ResolverError> {
        if let Some(item_id) = lookup.known_ids.get(provider.id()) {
            let hit = options
                .accepted_hit
                .clone()
                .filter(|h| &h.id == item_id);
            return Ok(Some(PrimaryMatch {
                item_id: item_id.clone(),
                hit,
            }));
        }
        if let Some(hit) = &options.accepted_hit {
            return Ok(Some(PrimaryMatch {
                item_id: hit.id.clone(),
                hit: Some(hit.clone()),
            }));
        }
        let hits = search_with(provider, lookup).await?;
        Ok(hits.into_iter().next().map(|hit| PrimaryMatch {
            item_id: hit.id.clone(),
            hit: Some(hit),
        }))
    }

    async fn resolve_provider_id(
        &self,
        provider_id: &str,
        lookup: &ScraperLookup,
    ) -> Result<String, String> {
        let provider = self
            .registry
            .get(provider_id)
            .await
            .ok_or_else(|| "provider not registered".to_string())?;
        if !supports_search(provider.as_ref()) {
            return Err("no known id and provider cannot search".to_string());
        }
        match search_with(provider.as_ref(), lookup).await {
            Ok(hits) => hits
                .into_iter()
                .next()
                .map(|h| h.id)
                .ok_or_else(|| "no search match".to_string()),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn fetch_job(
        &self,
        job: &FetchJob,
        lookup: &ScraperLookup,
        ids: &BTreeMap<String, String>,
        unresolved: &BTreeMap<String, String>,
    ) -> Result<SlotData, String> {
        let provider = self
            .registry
            .get(&job.provider_id)
            .await
            .ok_or_else(|| "provider not registered".to_string())?;
        if !supports_slot(provider.as_ref(), job.slot) {
            return Err(format!("provider lacks capability '{}'", job.slot));
        }
        let item_id = match ids.get(&job.provider_id) {
            Some(id) => id,
            None => {
                return Err(unresolved
                    .get(&job.provider_id)
                    .cloned()
                    .unwrap_or_else(|| "provider id unresolved".to_string()))
            }
        };
        let provider_lookup = ScraperLookup {
            name: lookup.name.clone(),
            locale: job.locale.clone().or_else(|| lookup.locale.clone()),
            known_ids: ids.clone(),
        };
        fetch_slot(provider.as_ref(), job.slot, item_id, &provider_lookup)
            .await
            .map_err(|e| e.to_string())
    }
}

fn selected_slots(profile: &ScraperProfile, options: &GetMetadataOptions) -> Vec<Slot> {
    profile
        .media_type
        .slots()
        .iter()
        .copied()
        .filter(|slot| match &options.slots {
            Some(wanted) => wanted.contains(slot),
            None => true,
        })
        .collect()
}

fn fetch_jobs(profile: &ScraperProfile, slots: &[Slot]) -> Vec<FetchJob> {
    let mut jobs = Vec::new();
    for slot in slots {
        let Some(config) = profile.slot_configs.get(slot) else {
            continue;
        };
        for entry in config.enabled_by_priority() {
            jobs.push(FetchJob {
                slot: *slot,
                provider_id: entry.provider_id.clone(),
                locale: entry.locale.clone(),
            });
        }
    }
    jobs
}

fn apply_info_fallback(info: &mut EntityInfo, hit: Option<&SearchHit>, lookup: &ScraperLookup) {
    if info.name.trim().is_empty() {
        info.name = hit
            .map(|h| h.name.clone())
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| lookup.name.clone());
    }
    if let Some(hit) = hit {
        if info.original_name.is_none() {
            info.original_name = hit.original_name.clone();
        }
        if info.release_date.is_none() {
            info.release_date = hit.release_date.clone();
        }
    }
}

/// One resolver per content type, sharing a profile store.
pub struct Scrapers {
    game: MetadataResolver,
    person: MetadataResolver,
    company: MetadataResolver,
    character: MetadataResolver,
    profiles: Arc<dyn ProfileStore>,
}

impl Scrapers {
    pub fn new(profiles: Arc<dyn ProfileStore>) -> Self {
        Self {
            game: MetadataResolver::new(ContentType::Game, profiles.clone()),
            person: MetadataResolver::new(ContentType::Person, profiles.clone()),
            company: MetadataResolver::new(ContentType::Company, profiles.clone()),
            character: MetadataResolver::new(ContentType::Character, profiles.clone()),
            profiles,
        }
    }

    pub fn resolver(&self, content_type: ContentType) -> &MetadataResolver {
        match content_type {
            ContentType::Game => &self.game,
            ContentType::Person => &self.person,
            ContentType::Company => &self.company,
            ContentType::Character => &self.character,
        }
    }

    pub fn profiles(&self) -> &Arc<dyn ProfileStore> {
        &self.profiles
    }

    /// Register a provider with the resolver for its content type.
    pub async fn register(&self, provider: Arc<dyn ScraperProvider>) -> Result<(), RegistryError> {
        self.resolver(provider.content_type())
            .register_provider(provider)
            .await
    }

    /// Save a profile unless one with the same id already exists.
    pub fn seed_profile(&self, profile: &ScraperProfile) -> Result<bool, ProfileError> {
        if self.profiles.get(&profile.id)?.is_some() {
            return Ok(false);
        }
        self.profiles.save(profile)?;
        info!(profile_id = %profile.id, media_type = %profile.media_type, "Seeded scraper profile");
        Ok(true)
    }

    pub async fn list_providers(&self) -> Vec<ProviderInfo> {
        let mut all = Vec::new();
        for content_type in ContentType::ALL {
            all.extend(self.resolver(content_type).list_providers().await);
        }
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::{MergeStrategy, SqliteProfileStore, TagRef};
    use crate::testing::{fixtures, MockProvider};

    fn create_test_resolver() -> MetadataResolver {
        let store: Arc<dyn ProfileStore> = Arc::new(SqliteProfileStore::in_memory().unwrap());
        MetadataResolver::new(ContentType::Game, store)
    }

    fn tags(names: &[&str]) -> SlotData {
        SlotData::Tags(names.iter().map(|n| TagRef::new(*n)).collect())
    }

    #[tokio::test]
    async fn test_first_strategy_takes_first_non_empty() {
        let resolver = create_test_resolver();
        let a = MockProvider::new("a", ContentType::Game)
            .with_hits(vec![fixtures::search_hit("a1", "Foo")])
            .with_slot_data(Slot::Tags, tags(&[]));
        let b = MockProvider::new("b", ContentType::Game)
            .with_hits(vec![fixtures::search_hit("b1", "Foo")])
            .with_slot_data(Slot::Tags, tags(&["drama"]));
        resolver.register_provider(Arc::new(a)).await.unwrap();
        resolver.register_provider(Arc::new(b)).await.unwrap();
        resolver
            .profiles
            .save(
                &ScraperProfile::new("p", "P", ContentType::Game, "a").with_slot(
                    Slot::Tags,
                    &["a", "b"],
                    MergeStrategy::First,
                ),
            )
            .unwrap();

        let meta = resolver
            .get_metadata("p", &ScraperLookup::by_name("Foo"), &Default::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(meta.tags, vec![TagRef::new("drama")]);
        assert_eq!(meta.external_ids.get("a").map(String::as_str), Some("a1"));
        assert_eq!(meta.external_ids.get("b").map(String::as_str), Some("b1"));
        assert_eq!(meta.info.name, "Foo");
    }

    #[tokio::test]
    async fn test_no_search_hit_returns_none() {
        let resolver = create_test_resolver();
        let a = MockProvider::new("a", ContentType::Game).with_search();
        resolver.register_provider(Arc::new(a)).await.unwrap();
        resolver
            .profiles
            .save(&ScraperProfile::new("p", "P", ContentType::Game, "a"))
            .unwrap();

        let result = resolver
            .get_metadata("p", &ScraperLookup::by_name("Nothing"), &Default::default())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_unregistered_search_provider_returns_none() {
        let resolver = create_test_resolver();
        resolver
            .profiles
            .save(&ScraperProfile::new("p", "P", ContentType::Game, "ghost"))
            .unwrap();
        let result = resolver
            .get_metadata("p", &ScraperLookup::by_name("Foo"), &Default::default())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_search_transport_error_is_raised() {
        let resolver = create_test_resolver();
        let a = Arc::new(MockProvider::new("a", ContentType::Game).with_search());
        a.fail_next_search(ProviderError::Http("timeout".to_string()))
            .await;
        resolver.register_provider(a).await.unwrap();
        resolver
            .profiles
            .save(&ScraperProfile::new("p", "P", ContentType::Game, "a"))
            .unwrap();

        let result = resolver
            .get_metadata("p", &ScraperLookup::by_name("Foo"), &Default::default())
            .await;
        assert!(matches!(
            result,
            Err(ResolverError::Provider(ProviderError::Http(_)))
        ));
    }

    #[tokio::test]
    async fn test_missing_profile_is_not_found() {
        let resolver = create_test_resolver();
        let result = resolver
            .get_metadata("missing", &ScraperLookup::by_name("Foo"), &Default::default())
            .await;
        assert!(matches!(result, Err(ResolverError::ProfileNotFound(_))));
    }

    #[tokio::test]
    async fn test_known_id_skips_search() {
        let resolver = create_test_resolver();
        let a = Arc::new(
            MockProvider::new("a", ContentType::Game)
                .with_hits(vec![fixtures::search_hit("wrong", "Wrong")])
                .with_slot_data(Slot::Info, SlotData::Info(EntityInfo::named("Right"))),
        );
        resolver.register_provider(a.clone()).await.unwrap();
        resolver
            .profiles
            .save(&ScraperProfile::new("p", "P", ContentType::Game, "a").with_slot(
                Slot::Info,
                &["a"],
                MergeStrategy::First,
            ))
            .unwrap();

        let lookup = ScraperLookup::by_name("Foo").with_known_id("a", "a42");
        let meta = resolver
            .get_metadata("p", &lookup, &Default::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(a.call_count("search").await, 0);
        assert_eq!(meta.info.name, "Right");
        let calls = a.recorded_calls().await;
        assert_eq!(calls[0].item_id.as_deref(), Some("a42"));
    }

    #[tokio::test]
    async fn test_secondary_provider_searched_by_original_name() {
        let resolver = create_test_resolver();
        let mut hit = fixtures::search_hit("a1", "Foo");
        hit.original_name = Some("フー".to_string());
        let a = MockProvider::new("a", ContentType::Game).with_hits(vec![hit]);
        let b = Arc::new(
            MockProvider::new("b", ContentType::Game)
                .with_hits_for("フー", vec![fixtures::search_hit("b7", "Foo")])
                .with_slot_data(Slot::Tags, tags(&["mystery"])),
        );
        resolver.register_provider(Arc::new(a)).await.unwrap();
        resolver.register_provider(b.clone()).await.unwrap();
        resolver
            .profiles
            .save(&ScraperProfile::new("p", "P", ContentType::Game, "a").with_slot(
                Slot::Tags,
                &["b"],
                MergeStrategy::First,
            ))
            .unwrap();

        let meta = resolver
            .get_metadata("p", &ScraperLookup::by_name("Foo"), &Default::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(meta.tags, vec![TagRef::new("mystery")]);
        assert_eq!(meta.info.original_name.as_deref(), Some("フー"));
        let searches: Vec<_> = b
            .recorded_calls()
            .await
            .into_iter()
            .filter(|c| c.operation == "search")
            .collect();
        assert_eq!(searches[0].lookup.name, "フー");
    }

    #[tokio::test]
    async fn test_slot_config_errors_do_not_abort_resolution() {
        let resolver = create_test_resolver();
        let a = MockProvider::new("a", ContentType::Game)
            .with_hits(vec![fixtures::search_hit("a1", "Foo")])
            .with_slot_data(Slot::Tags, tags(&["drama"]))
            .with_slot_error(Slot::Covers, ProviderError::Http("502".to_string()));
        resolver.register_provider(Arc::new(a)).await.unwrap();
        resolver
            .profiles
            .save(
                &ScraperProfile::new("p", "P", ContentType::Game, "a")
                    .with_slot(Slot::Tags, &["a"], MergeStrategy::First)
                    .with_slot(Slot::Covers, &["a"], MergeStrategy::First)
                    .with_slot(Slot::Logos, &["ghost"], MergeStrategy::First)
                    .with_slot(Slot::Icons, &["a"], MergeStrategy::First),
            )
            .unwrap();

        let meta = resolver
            .get_metadata("p", &ScraperLookup::by_name("Foo"), &Default::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(meta.tags.len(), 1);
        let failed: BTreeSet<Slot> = meta.slot_failures.iter().map(|f| f.slot).collect();
        assert_eq!(
            failed,
            BTreeSet::from([Slot::Covers, Slot::Logos, Slot::Icons])
        );
    }

    #[tokio::test]
    async fn test_options_restrict_slots_and_accept_hit() {
        let resolver = create_test_resolver();
        let a = Arc::new(
            MockProvider::new("a", ContentType::Game)
                .with_search()
                .with_slot_data(Slot::Tags, tags(&["drama"]))
                .with_slot_data(Slot::Covers, SlotData::Images(vec!["u".to_string()])),
        );
        resolver.register_provider(a.clone()).await.unwrap();
        resolver
            .profiles
            .save(
                &ScraperProfile::new("p", "P", ContentType::Game, "a")
                    .with_slot(Slot::Tags, &["a"], MergeStrategy::First)
                    .with_slot(Slot::Covers, &["a"], MergeStrategy::First),
            )
            .unwrap();

        let options = GetMetadataOptions {
            accepted_hit: Some(fixtures::search_hit("a9", "Accepted")),
            slots: Some(vec![Slot::Covers]),
        };
        let meta = resolver
            .get_metadata("p", &ScraperLookup::by_name("Foo"), &options)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(a.call_count("search").await, 0);
        assert_eq!(a.call_count("tags").await, 0);
        assert_eq!(meta.images[&Slot::Covers], vec!["u".to_string()]);
        assert_eq!(meta.info.name, "Accepted");
    }

    #[tokio::test]
    async fn test_ensure_profile_valid_actions() {
        let resolver = create_test_resolver();
        resolver
            .register_provider(Arc::new(
                MockProvider::new("a", ContentType::Game)
                    .with_search()
                    .with_slot(Slot::Tags),
            ))
            .await
            .unwrap();
        resolver
            .profiles
            .save(
                &ScraperProfile::new("ok", "Ok", ContentType::Game, "a")
                    .with_slot(Slot::Tags, &["a"], MergeStrategy::First),
            )
            .unwrap();
        resolver
            .profiles
            .save(
                &ScraperProfile::new("strip", "Strip", ContentType::Game, "a")
                    .with_slot(Slot::Tags, &["a", "ghost"], MergeStrategy::Merge)
                    .with_slot(Slot::Covers, &["a"], MergeStrategy::First),
            )
            .unwrap();
        resolver
            .profiles
            .save(&ScraperProfile::new("dead", "Dead", ContentType::Game, "ghost"))
            .unwrap();

        assert_eq!(
            resolver.ensure_profile_valid("ok").await.unwrap(),
            ProfileAction::Unchanged
        );
        assert_eq!(
            resolver.ensure_profile_valid("strip").await.unwrap(),
            ProfileAction::Updated
        );
        assert_eq!(
            resolver.ensure_profile_valid("strip").await.unwrap(),
            ProfileAction::Unchanged
        );
        let stripped = resolver.load_profile("strip").unwrap();
        assert_eq!(stripped.slot_configs[&Slot::Tags].providers.len(), 1);
        assert!(stripped.slot_configs[&Slot::Covers].providers.is_empty());

        assert_eq!(
            resolver.ensure_profile_valid("dead").await.unwrap(),
            ProfileAction::Deleted
        );
        assert!(matches!(
            resolver.load_profile("dead"),
            Err(ResolverError::ProfileNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unregister_cascades_to_profiles() {
        let resolver = create_test_resolver();
        resolver
            .register_provider(Arc::new(MockProvider::new("a", ContentType::Game).with_search()))
            .await
            .unwrap();
        resolver
            .register_provider(Arc::new(
                MockProvider::new("b", ContentType::Game)
                    .with_search()
                    .with_slot(Slot::Tags),
            ))
            .await
            .unwrap();
        resolver
            .profiles
            .save(&ScraperProfile::new("uses-b-for-tags", "1", ContentType::Game, "a")
                .with_slot(Slot::Tags, &["b"], MergeStrategy::First))
            .unwrap();
        resolver
            .profiles
            .save(&ScraperProfile::new("searches-b", "2", ContentType::Game, "b"))
            .unwrap();
        resolver
            .profiles
            .save(&ScraperProfile::new("unrelated", "3", ContentType::Game, "a"))
            .unwrap();

        let actions = resolver.unregister_provider("b").await.unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions["uses-b-for-tags"], ProfileAction::Updated);
        assert_eq!(actions["searches-b"], ProfileAction::Deleted);
    }

    #[tokio::test]
    async fn test_get_provider_images() {
        let resolver = create_test_resolver();
        resolver
            .register_provider(Arc::new(
                MockProvider::new("a", ContentType::Game)
                    .with_hits(vec![fixtures::search_hit("a1", "Foo")])
                    .with_slot_data(
                        Slot::Backgrounds,
                        SlotData::Images(vec!["bg.jpg".to_string()]),
                    ),
            ))
            .await
            .unwrap();

        let urls = resolver
            .get_provider_images("a", &ScraperLookup::by_name("Foo"), Slot::Backgrounds)
            .await
            .unwrap();
        assert_eq!(urls, vec!["bg.jpg".to_string()]);

        let err = resolver
            .get_provider_images("a", &ScraperLookup::by_name("Foo"), Slot::Tags)
            .await;
        assert!(matches!(err, Err(ResolverError::InvalidSlot(Slot::Tags))));
    }

    #[tokio::test]
    async fn test_scrapers_seed_profile_once() {
        let store: Arc<dyn ProfileStore> = Arc::new(SqliteProfileStore::in_memory().unwrap());
        let scrapers = Scrapers::new(store);
        let profile = ScraperProfile::new("p", "P", ContentType::Person, "x");
        assert!(scrapers.seed_profile(&profile).unwrap());
        assert!(!scrapers.seed_profile(&profile).unwrap());
        assert!(scrapers
            .resolver(ContentType::Person)
            .load_profile("p")
            .is_ok());
    }
}
