//! VNDB (visual novel database) provider for games, over its JSON API.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use reqwest::StatusCode;
use serde_json::json;
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

use super::{
    CapabilitySet, ContentType, EntityInfo, ExternalLink, ImageCapability, InfoCapability,
    ProviderError, RelatedCapability, RelatedEntity, ResolvedMetadata, ScraperLookup,
    ScraperProvider, SearchCapability, SearchHit, Slot, TagRef, TagsCapability,
};

pub const VNDB_PROVIDER_ID: &str = "vndb";

const VN_FIELDS: &str = "title, alttitle, released, description, image.url, screenshots.url, \
    tags.name, tags.spoiler, tags.rating, developers.name, developers.original, \
    extlinks.url, extlinks.label";

const SEARCH_LIMIT: u32 = 10;

static MARKUP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[/?(?:url|spoiler|quote|raw|code|b|i|u|s)(?:=[^\]]*)?\]").expect("valid markup pattern")
});

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VndbConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Optional API token, sent as `Authorization: Token <token>`.
    #[serde(default)]
    pub api_token: Option<String>,
    /// Retries for 429 and 5xx responses.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// How long a fetched record is reused across slots and lookups.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

fn default_enabled() -> bool {
    true
}

fn default_base_url() -> String {
    "https://api.vndb.org/kana".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    2
}

fn default_cache_ttl_secs() -> u64 {
    600
}

fn default_cache_capacity() -> usize {
    256
}

impl Default for VndbConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            api_token: None,
            max_retries: default_max_retries(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct VnResponse {
    results: Vec<VnRecord>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct VnRecord {
    id: String,
    title: String,
    #[serde(default)]
    alttitle: Option<String>,
    #[serde(default)]
    released: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    image: Option<VnImage>,
    #[serde(default)]
    screenshots: Vec<VnImage>,
    #[serde(default)]
    tags: Vec<VnTag>,
    #[serde(default)]
    developers: Vec<VnProducer>,
    #[serde(default)]
    extlinks: Vec<VnLink>,
}

#[derive(Debug, Clone, Deserialize)]
struct VnImage {
    url: String,
}

#[derive(Debug, Clone, Deserialize)]
struct VnTag {
    name: String,
    #[serde(default)]
    spoiler: u8,
    #[serde(default)]
    rating: f32,
}

#[derive(Debug, Clone, Deserialize)]
struct VnProducer {
    id: String,
    name: String,
    #[serde(default)]
    original: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct VnLink {
    url: String,
    label: String,
}

impl VnRecord {
    fn to_hit(&self) -> SearchHit {
        SearchHit {
            id: self.id.clone(),
            name: self.title.clone(),
            original_name: self.alttitle.clone(),
            release_date: self.released.clone().filter(|r| r != "TBA"),
            external_ids: Default::default(),
        }
    }

    fn to_info(&self) -> EntityInfo {
        EntityInfo {
            name: self.title.clone(),
            original_name: self.alttitle.clone(),
            description: self.description.as_deref().map(strip_markup),
            release_date: self.released.clone().filter(|r| r != "TBA"),
            links: self
                .extlinks
                .iter()
                .map(|l| ExternalLink {
                    label: l.label.clone(),
                    url: l.url.clone(),
                })
                .collect(),
        }
    }

    /// Tags by descending rating.
    fn to_tags(&self) -> Vec<TagRef> {
        let mut tags = self.tags.clone();
        tags.sort_by(|a, b| b.rating.total_cmp(&a.rating));
        tags.into_iter()
            .map(|t| TagRef {
                name: t.name,
                is_spoiler: t.spoiler > 0,
            })
            .collect()
    }

    fn to_developers(&self) -> Vec<RelatedEntity> {
        self.developers
            .iter()
            .map(|dev| {
                let info = EntityInfo {
                    name: dev.name.clone(),
                    original_name: dev.original.clone(),
                    ..Default::default()
                };
                let meta = ResolvedMetadata::new(ContentType::Company, info)
                    .with_external_id(VNDB_PROVIDER_ID, dev.id.clone());
                RelatedEntity::new(meta).with_relation("developer")
            })
            .collect()
    }
}

fn strip_markup(text: &str) -> String {
    MARKUP.replace_all(text, "").trim().to_string()
}

struct CachedRecord {
    cell: Arc<OnceCell<VnRecord>>,
    inserted: Instant,
}

/// Records keyed by VNDB id, dropped after a TTL and capped in size.
/// When full, the oldest entry is evicted.
struct RecordCache {
    entries: HashMap<String, CachedRecord>,
    ttl: Duration,
    capacity: usize,
}

impl RecordCache {
    fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// The cell for `id`, replacing it when expired.
    fn cell(&mut self, id: &str, now: Instant) -> Arc<OnceCell<VnRecord>> {
        if let Some(entry) = self.entries.get(id) {
            if now.duration_since(entry.inserted) < self.ttl {
                return Arc::clone(&entry.cell);
            }
        }
        self.make_room(now);
        let cell = Arc::new(OnceCell::new());
        self.entries.insert(
            id.to_string(),
            CachedRecord {
                cell: Arc::clone(&cell),
                inserted: now,
            },
        );
        cell
    }

    fn prime(&mut self, record: VnRecord, now: Instant) {
        let cell = self.cell(&record.id, now);
        let _ = cell.set(record);
    }

    fn make_room(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| now.duration_since(entry.inserted) < ttl);
        while self.entries.len() >= self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    self.entries.remove(&id);
                }
                None => break,
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Game metadata from VNDB: search, info, tags, covers, backgrounds and developers.
///
/// Records are fetched once per item id and shared by every slot until
/// the cache entry expires.
pub struct VndbProvider {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
    max_retries: u32,
    records: Mutex<RecordCache>,
}

impl VndbProvider {
    pub fn new(config: &VndbConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Http(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone().filter(|t| !t.is_empty()),
            max_retries: config.max_retries,
            records: Mutex::new(RecordCache::new(
                Duration::from_secs(config.cache_ttl_secs),
                config.cache_capacity,
            )),
        })
    }

    async fn query(&self, filters: serde_json::Value, results: u32) -> Result<Vec<VnRecord>, ProviderError> {
        let body = json!({
            "filters": filters,
            "fields": VN_FIELDS,
            "results": results,
        });
        let url = format!("{}/vn", self.base_url);
        debug!(url = %url, filters = %body["filters"], "Querying VNDB");

        let mut attempt = 0;
        loop {
            match self.query_once(&url, &body).await {
                Ok(records) => return Ok(records),
                Err((err, retryable)) if retryable && attempt < self.max_retries => {
                    let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                    debug!(url = %url, attempt, error = %err, "Retrying VNDB query");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err((err, _)) => return Err(err),
            }
        }
    }

    async fn query_once(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<Vec<VnRecord>, (ProviderError, bool)> {
        let mut request = self.client.post(url).json(body);
        if let Some(token) = &self.api_token {
            request = request.header(reqwest::header::AUTHORIZATION, format!("Token {}", token));
        }
        let response = request
            .send()
            .await
            .map_err(|e| (ProviderError::Http(e.to_string()), true))?;

        let status = response.status();
        if !status.is_success() {
            let retryable = status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS;
            return Err((
                ProviderError::Http(format!("VNDB returned status {}", status)),
                retryable,
            ));
        }
        let parsed: VnResponse = response
            .json()
            .await
            .map_err(|e| (ProviderError::Parse(e.to_string()), false))?;
        Ok(parsed.results)
    }

    async fn record(&self, id: &str) -> Result<VnRecord, ProviderError> {
        let cell = self.records.lock().await.cell(id, Instant::now());
        let record = cell
            .get_or_try_init(|| async {
                self.query(json!(["id", "=", id]), 1)
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| ProviderError::NotFound(id.to_string()))
            })
            .await?;
        Ok(record.clone())
    }
}

impl ScraperProvider for VndbProvider {
    fn id(&self) -> &str {
        VNDB_PROVIDER_ID
    }

    fn name(&self) -> &str {
        "VNDB"
    }

    fn content_type(&self) -> ContentType {
        ContentType::Game
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::new().with_search().with_slots(&[
            Slot::Info,
            Slot::Tags,
            Slot::Covers,
            Slot::Backgrounds,
            Slot::Companies,
        ])
    }

    fn as_search(&self) -> Option<&dyn SearchCapability> {
        Some(self)
    }

    fn as_info(&self) -> Option<&dyn InfoCapability> {
        Some(self)
    }

    fn as_tags(&self) -> Option<&dyn TagsCapability> {
        Some(self)
    }

    fn as_images(&self, slot: Slot) -> Option<&dyn ImageCapability> {
        match slot {
            Slot::Covers | Slot::Backgrounds => Some(self),
            _ => None,
        }
    }

    fn as_related(&self, slot: Slot) -> Option<&dyn RelatedCapability> {
        match slot {
            Slot::Companies => Some(self),
            _ => None,
        }
    }
}

#[async_trait]
impl SearchCapability for VndbProvider {
    async fn search(&self, lookup: &ScraperLookup) -> Result<Vec<SearchHit>, ProviderError> {
        let records = self
            .query(json!(["search", "=", lookup.name]), SEARCH_LIMIT)
            .await?;
        let hits = records.iter().map(VnRecord::to_hit).collect();

        // Search returns full records.
        let now = Instant::now();
        let mut cache = self.records.lock().await;
        for record in records {
            cache.prime(record, now);
        }
        Ok(hits)
    }
}

#[async_trait]
impl InfoCapability for VndbProvider {
    async fn get_info(&self, id: &str, _lookup: &ScraperLookup) -> Result<EntityInfo, ProviderError> {
        Ok(self.record(id).await?.to_info())
    }
}

#[async_trait]
impl TagsCapability for VndbProvider {
    async fn get_tags(&self, id: &str, _lookup: &ScraperLookup) -> Result<Vec<TagRef>, ProviderError> {
        Ok(self.record(id).await?.to_tags())
    }
}

#[async_trait]
impl ImageCapability for VndbProvider {
    async fn get_images(
        &self,
        slot: Slot,
        id: &str,
        _lookup: &ScraperLookup,
    ) -> Result<Vec<String>, ProviderError> {
        let record = self.record(id).await?;
        Ok(match slot {
            Slot::Covers => record.image.map(|i| vec![i.url]).unwrap_or_default(),
            Slot::Backgrounds => record.screenshots.into_iter().map(|s| s.url).collect(),
            _ => Vec::new(),
        })
    }
}

#[async_trait]
impl RelatedCapability for VndbProvider {
    async fn get_related(
        &self,
        slot: Slot,
        id: &str,
        _lookup: &ScraperLookup,
    ) -> Result<Vec<RelatedEntity>, ProviderError> {
        if slot != Slot::Companies {
            return Ok(Vec::new());
        }
        Ok(self.record(id).await?.to_developers())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::provider::implemented_capabilities;

    fn sample_record() -> VnRecord {
        serde_json::from_value(json!({
            "id": "v17",
            "title": "Ever17 -the out of infinity-",
            "alttitle": "Ever17",
            "released": "2002-08-29",
            "description": "A story set in [url=https://example.org]LeMU[/url].",
            "image": {"url": "https://t.vndb.org/cv/1.jpg"},
            "screenshots": [{"url": "https://t.vndb.org/sf/1.jpg"}],
            "tags": [
                {"name": "Mystery", "spoiler": 0, "rating": 2.1},
                {"name": "Twist", "spoiler": 2, "rating": 2.9}
            ],
            "developers": [{"id": "p24", "name": "KID", "original": null}],
            "extlinks": [{"url": "https://example.org/ever17", "label": "Official"}]
        }))
        .unwrap()
    }

    #[test]
    fn test_capabilities_match_implementation() {
        let provider = VndbProvider::new(&VndbConfig::default()).unwrap();
        assert_eq!(provider.capabilities(), implemented_capabilities(&provider));
    }

    #[test]
    fn test_record_to_info_strips_markup() {
        let info = sample_record().to_info();
        assert_eq!(info.name, "Ever17 -the out of infinity-");
        assert_eq!(info.original_name.as_deref(), Some("Ever17"));
        assert_eq!(info.description.as_deref(), Some("A story set in LeMU."));
        assert_eq!(info.links.len(), 1);
    }

    #[test]
    fn test_tags_sorted_by_rating_with_spoiler_flag() {
        let tags = sample_record().to_tags();
        assert_eq!(tags[0].name, "Twist");
        assert!(tags[0].is_spoiler);
        assert!(!tags[1].is_spoiler);
    }

    #[test]
    fn test_developers_carry_vndb_id() {
        let devs = sample_record().to_developers();
        assert_eq!(devs.len(), 1);
        assert_eq!(devs[0].metadata.content_type, ContentType::Company);
        assert_eq!(devs[0].metadata.external_ids["vndb"], "p24");
        assert_eq!(devs[0].relation_type.as_deref(), Some("developer"));
    }

    fn record_with_id(id: &str) -> VnRecord {
        let mut record = sample_record();
        record.id = id.to_string();
        record
    }

    #[test]
    fn test_record_cache_is_bounded() {
        let mut cache = RecordCache::new(Duration::from_secs(600), 2);
        let start = Instant::now();
        cache.prime(record_with_id("v1"), start);
        cache.prime(record_with_id("v2"), start + Duration::from_secs(1));
        cache.prime(record_with_id("v3"), start + Duration::from_secs(2));

        assert_eq!(cache.len(), 2);
        let now = start + Duration::from_secs(3);
        assert!(cache.cell("v1", now).get().is_none());
        assert!(cache.len() <= 2);
    }

    #[test]
    fn test_record_cache_expires_entries() {
        let mut cache = RecordCache::new(Duration::from_secs(60), 16);
        let start = Instant::now();
        cache.prime(record_with_id("v1"), start);
        assert!(cache.cell("v1", start + Duration::from_secs(30)).get().is_some());

        let later = start + Duration::from_secs(61);
        assert!(cache.cell("v1", later).get().is_none());
        cache.prime(record_with_id("v2"), later);
        assert_eq!(cache.len(), 2);

        cache.cell("v3", later + Duration::from_secs(61));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_tba_release_dropped() {
        let mut record = sample_record();
        record.released = Some("TBA".to_string());
        assert!(record.to_hit().release_date.is_none());
    }
}
