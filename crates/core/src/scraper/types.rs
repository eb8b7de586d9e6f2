use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Kinds of library entities metadata can be resolved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Game,
    Person,
    Company,
    Character,
}

impl ContentType {
    pub const ALL: [ContentType; 4] = [
        ContentType::Game,
        ContentType::Person,
        ContentType::Company,
        ContentType::Character,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Game => "game",
            ContentType::Person => "person",
            ContentType::Company => "company",
            ContentType::Character => "character",
        }
    }

    /// Slots a profile for this content type carries, in display order.
    pub fn slots(&self) -> &'static [Slot] {
        match self {
            ContentType::Game => &[
                Slot::Info,
                Slot::Tags,
                Slot::Covers,
                Slot::Backgrounds,
                Slot::Logos,
                Slot::Icons,
                Slot::Persons,
                Slot::Companies,
                Slot::Characters,
            ],
            ContentType::Person => &[Slot::Info, Slot::Tags, Slot::Photos],
            ContentType::Company => &[Slot::Info, Slot::Tags, Slot::Logos],
            ContentType::Character => &[Slot::Info, Slot::Tags, Slot::Photos, Slot::Persons],
        }
    }

    pub fn has_slot(&self, slot: Slot) -> bool {
        self.slots().contains(&slot)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "game" => Ok(ContentType::Game),
            "person" => Ok(ContentType::Person),
            "company" => Ok(ContentType::Company),
            "character" => Ok(ContentType::Character),
            other => Err(format!("unknown content type: {}", other)),
        }
    }
}

/// A named category of fetchable metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Info,
    Tags,
    Covers,
    Backgrounds,
    Logos,
    Icons,
    Photos,
    Persons,
    Companies,
    Characters,
}

/// Shape of the data a slot produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Info,
    Tags,
    Images,
    Related(ContentType),
}

impl Slot {
    pub fn as_str(&self) -> &'static str {
        match self {
            Slot::Info => "info",
            Slot::Tags => "tags",
            Slot::Covers => "covers",
            Slot::Backgrounds => "backgrounds",
            Slot::Logos => "logos",
            Slot::Icons => "icons",
            Slot::Photos => "photos",
            Slot::Persons => "persons",
            Slot::Companies => "companies",
            Slot::Characters => "characters",
        }
    }

    pub fn kind(&self) -> SlotKind {
        match self {
            Slot::Info => SlotKind::Info,
            Slot::Tags => SlotKind::Tags,
            Slot::Covers | Slot::Backgrounds | Slot::Logos | Slot::Icons | Slot::Photos => {
                SlotKind::Images
            }
            Slot::Persons => SlotKind::Related(ContentType::Person),
            Slot::Companies => SlotKind::Related(ContentType::Company),
            Slot::Characters => SlotKind::Related(ContentType::Character),
        }
    }

    pub fn is_image(&self) -> bool {
        self.kind() == SlotKind::Images
    }

    /// Column the first downloaded image of this slot is attached to.
    pub fn attachment_field(&self) -> Option<&'static str> {
        match self {
            Slot::Covers => Some("cover"),
            Slot::Backgrounds => Some("background"),
            Slot::Logos => Some("logo"),
            Slot::Icons => Some("icon"),
            Slot::Photos => Some("photo"),
            _ => None,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared abilities of a provider: search plus a set of slots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    pub search: bool,
    pub slots: BTreeSet<Slot>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search(mut self) -> Self {
        self.search = true;
        self
    }

    pub fn with_slot(mut self, slot: Slot) -> Self {
        self.slots.insert(slot);
        self
    }

    pub fn with_slots(mut self, slots: &[Slot]) -> Self {
        self.slots.extend(slots.iter().copied());
        self
    }

    pub fn supports(&self, slot: Slot) -> bool {
        self.slots.contains(&slot)
    }

    /// Human-readable capability names, used in error messages.
    pub fn names(&self) -> Vec<String> {
        let mut names = Vec::new();
        if self.search {
            names.push("search".to_string());
        }
        names.extend(self.slots.iter().map(|s| s.as_str().to_string()));
        names
    }
}

/// The resolver's universal query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScraperLookup {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    /// Provider id -> provider-specific item id. Skips the search for that provider.
    #[serde(default)]
    pub known_ids: BTreeMap<String, String>,
}

impl ScraperLookup {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_known_id(mut self, provider_id: impl Into<String>, id: impl Into<String>) -> Self {
        self.known_ids.insert(provider_id.into(), id.into());
        self
    }
}

/// A single search result returned by a provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Provider-specific item id.
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    /// Ids of the same item on other sources, keyed by provider id.
    #[serde(default)]
    pub external_ids: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalLink {
    pub label: String,
    pub url: String,
}

/// Scalar fields of an entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    #[serde(default)]
    pub links: Vec<ExternalLink>,
}

impl EntityInfo {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.trim().is_empty()
            && self.original_name.is_none()
            && self.description.is_none()
            && self.release_date.is_none()
            && self.links.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRef {
    pub name: String,
    #[serde(default)]
    pub is_spoiler: bool,
}

impl TagRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_spoiler: false,
        }
    }
}

/// A linked sub-entity (person, company, character) with relation annotations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedEntity {
    pub metadata: ResolvedMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default)]
    pub is_spoiler: bool,
}

impl RelatedEntity {
    pub fn new(metadata: ResolvedMetadata) -> Self {
        Self {
            metadata,
            relation_type: None,
            note: None,
            is_spoiler: false,
        }
    }

    pub fn with_relation(mut self, relation_type: impl Into<String>) -> Self {
        self.relation_type = Some(relation_type.into());
        self
    }
}

/// A slot that yielded nothing because of a configuration or provider failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotFailure {
    pub slot: Slot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    pub error: String,
}

/// Complete metadata for one entity, ready for the adder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedMetadata {
    pub content_type: ContentType,
    pub info: EntityInfo,
    /// Source (provider id) -> item id on that source.
    #[serde(default)]
    pub external_ids: BTreeMap<String, String>,
    #[serde(default)]
    pub tags: Vec<TagRef>,
    #[serde(default)]
    pub persons: Vec<RelatedEntity>,
    #[serde(default)]
    pub companies: Vec<RelatedEntity>,
    #[serde(default)]
    pub characters: Vec<RelatedEntity>,
    /// Candidate image URLs per image slot, best first.
    #[serde(default)]
    pub images: BTreeMap<Slot, Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub slot_failures: Vec<SlotFailure>,
}

impl ResolvedMetadata {
    pub fn new(content_type: ContentType, info: EntityInfo) -> Self {
        Self {
            content_type,
            info,
            external_ids: BTreeMap::new(),
            tags: Vec::new(),
            persons: Vec::new(),
            companies: Vec::new(),
            characters: Vec::new(),
            images: BTreeMap::new(),
            slot_failures: Vec::new(),
        }
    }

    pub fn named(content_type: ContentType, name: impl Into<String>) -> Self {
        Self::new(content_type, EntityInfo::named(name))
    }

    pub fn with_external_id(mut self, source: impl Into<String>, value: impl Into<String>) -> Self {
        self.external_ids.insert(source.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Related entities stored under a relation slot.
    pub fn related(&self, slot: Slot) -> &[RelatedEntity] {
        match slot {
            Slot::Persons => &self.persons,
            Slot::Companies => &self.companies,
            Slot::Characters => &self.characters,
            _ => &[],
        }
    }

    /// Store merged slot data on the matching field.
    pub fn apply(&mut self, slot: Slot, data: SlotData) {
        match (slot, data) {
            (_, SlotData::Info(info)) => self.info = info,
            (_, SlotData::Tags(tags)) => self.tags = tags,
            (slot, SlotData::Images(urls)) => {
                if !urls.is_empty() {
                    self.images.insert(slot, urls);
                }
            }
            (Slot::Persons, SlotData::Related(items)) => self.persons = items,
            (Slot::Companies, SlotData::Related(items)) => self.companies = items,
            (Slot::Characters, SlotData::Related(items)) => self.characters = items,
            (_, SlotData::Related(_)) => {}
        }
    }
}

/// Payload fetched for one slot from one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotData {
    Info(EntityInfo),
    Tags(Vec<TagRef>),
    Images(Vec<String>),
    Related(Vec<RelatedEntity>),
}

impl SlotData {
    pub fn empty_for(slot: Slot) -> Self {
        match slot.kind() {
            SlotKind::Info => SlotData::Info(EntityInfo::default()),
            SlotKind::Tags => SlotData::Tags(Vec::new()),
            SlotKind::Images => SlotData::Images(Vec::new()),
            SlotKind::Related(_) => SlotData::Related(Vec::new()),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            SlotData::Info(info) => info.is_empty(),
            SlotData::Tags(tags) => tags.is_empty(),
            SlotData::Images(urls) => urls.is_empty(),
            SlotData::Related(items) => items.is_empty(),
        }
    }
}

/// Registry listing entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub id: String,
    pub name: String,
    pub content_type: ContentType,
    pub capabilities: CapabilitySet,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_round_trip_str() {
        for ct in ContentType::ALL {
            assert_eq!(ct.as_str().parse::<ContentType>().unwrap(), ct);
        }
        assert!("movie".parse::<ContentType>().is_err());
    }

    #[test]
    fn test_slot_kinds() {
        assert_eq!(Slot::Covers.kind(), SlotKind::Images);
        assert_eq!(Slot::Persons.kind(), SlotKind::Related(ContentType::Person));
        assert!(ContentType::Game.has_slot(Slot::Characters));
        assert!(!ContentType::Person.has_slot(Slot::Covers));
    }

    #[test]
    fn test_images_serialize_with_slot_keys() {
        let mut meta = ResolvedMetadata::named(ContentType::Game, "Foo");
        meta.images
            .insert(Slot::Covers, vec!["https://img/1.jpg".to_string()]);
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["images"]["covers"][0], "https://img/1.jpg");
        assert_eq!(json["content_type"], "game");
    }

    #[test]
    fn test_apply_ignores_empty_image_list() {
        let mut meta = ResolvedMetadata::named(ContentType::Game, "Foo");
        meta.apply(Slot::Logos, SlotData::Images(vec![]));
        assert!(meta.images.is_empty());
    }
}
