//! Resolver and profile integration tests.
//!
//! These tests cover provider lifecycle against a persisted profile store:
//! - Capability validation at registration
//! - Cascading profile repair when a provider is removed
//! - Priority-ordered `first` merging across providers

use std::sync::Arc;

use trove_core::{
    scraper::{
        CapabilitySet, ContentType, GetMetadataOptions, MergeStrategy, ProfileAction,
        ProfileStore, RegistryError, ScraperLookup, ScraperProfile, Scrapers, Slot, SlotData,
        SqliteProfileStore, TagRef,
    },
    testing::{fixtures, MockProvider},
};

fn create_scrapers() -> Scrapers {
    Scrapers::new(Arc::new(SqliteProfileStore::in_memory().unwrap()))
}

#[tokio::test]
async fn test_declared_capabilities_must_match() {
    let scrapers = create_scrapers();
    let liar = MockProvider::new("liar", ContentType::Game)
        .with_search()
        .declaring(CapabilitySet::new().with_search().with_slot(Slot::Tags));

    let result = scrapers.register(Arc::new(liar)).await;
    assert!(matches!(
        result,
        Err(RegistryError::CapabilityMismatch { .. })
    ));
    assert!(scrapers.list_providers().await.is_empty());
}

#[tokio::test]
async fn test_unregister_cascades_over_profiles() {
    let scrapers = create_scrapers();
    scrapers
        .register(Arc::new(MockProvider::new("search", ContentType::Game).with_search()))
        .await
        .unwrap();
    scrapers
        .register(Arc::new(
            MockProvider::new("tags", ContentType::Game).with_slot(Slot::Tags),
        ))
        .await
        .unwrap();

    let uses_tags = ScraperProfile::new("a", "A", ContentType::Game, "search")
        .with_slot(Slot::Tags, &["tags", "search"], MergeStrategy::Merge);
    let searches_with_tags = ScraperProfile::new("b", "B", ContentType::Game, "tags");
    let untouched = ScraperProfile::new("c", "C", ContentType::Game, "search");
    for profile in [&uses_tags, &searches_with_tags, &untouched] {
        scrapers.profiles().save(profile).unwrap();
    }

    let resolver = scrapers.resolver(ContentType::Game);
    let actions = resolver.unregister_provider("tags").await.unwrap();

    assert_eq!(actions.get("a"), Some(&ProfileAction::Updated));
    assert_eq!(actions.get("b"), Some(&ProfileAction::Deleted));
    assert!(!actions.contains_key("c"));

    let repaired = scrapers.profiles().get("a").unwrap().unwrap();
    assert!(!repaired.references("tags"));
    assert!(scrapers.profiles().get("b").unwrap().is_none());

    // Idempotent once repaired.
    assert_eq!(
        resolver.ensure_profile_valid("a").await.unwrap(),
        ProfileAction::Unchanged
    );
}

#[tokio::test]
async fn test_first_strategy_takes_first_non_empty() {
    let scrapers = create_scrapers();
    let a = MockProvider::new("a", ContentType::Game)
        .with_search()
        .with_hits(vec![fixtures::search_hit("a-1", "Foo")])
        .with_slot_data(Slot::Tags, SlotData::Tags(vec![]));
    let b = MockProvider::new("b", ContentType::Game)
        .with_search()
        .with_hits(vec![fixtures::search_hit("b-1", "Foo")])
        .with_slot_data(Slot::Tags, SlotData::Tags(vec![TagRef::new("drama")]));
    scrapers.register(Arc::new(a)).await.unwrap();
    scrapers.register(Arc::new(b)).await.unwrap();
    scrapers
        .profiles()
        .save(
            &ScraperProfile::new("p", "P", ContentType::Game, "a").with_slot(
                Slot::Tags,
                &["a", "b"],
                MergeStrategy::First,
            ),
        )
        .unwrap();

    let metadata = scrapers
        .resolver(ContentType::Game)
        .get_metadata("p", &ScraperLookup::by_name("Foo"), &GetMetadataOptions::default())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(metadata.tags, vec![TagRef::new("drama")]);
    assert_eq!(metadata.external_ids["a"], "a-1");
    assert_eq!(metadata.external_ids["b"], "b-1");
}
