//! Combining one slot's results from several providers.

use std::collections::HashSet;

use super::{EntityInfo, MergeStrategy, RelatedEntity, Slot, SlotData, TagRef};
use crate::library::normalize_name;

/// Merge per-provider results, given in priority order.
///
/// Empty results never win `first` and contribute nothing to `merge` or
/// `append`. Scalar info fields cannot be concatenated: both `merge` and
/// `append` fill the fields the higher-priority result left blank.
pub fn merge_slot(slot: Slot, strategy: MergeStrategy, results: Vec<SlotData>) -> SlotData {
    let mut non_empty = results.into_iter().filter(|d| !d.is_empty());
    let Some(first) = non_empty.next() else {
        return SlotData::empty_for(slot);
    };
    if strategy == MergeStrategy::First {
        return first;
    }

    let merged = non_empty.fold(first, |acc, next| combine(acc, next, strategy));
    match (strategy, merged) {
        (MergeStrategy::Merge, SlotData::Tags(tags)) => SlotData::Tags(dedupe_tags(tags)),
        (MergeStrategy::Merge, SlotData::Images(urls)) => SlotData::Images(dedupe_urls(urls)),
        (MergeStrategy::Merge, SlotData::Related(items)) => SlotData::Related(dedupe_related(items)),
        (_, merged) => merged,
    }
}

fn combine(acc: SlotData, next: SlotData, strategy: MergeStrategy) -> SlotData {
    match (acc, next) {
        (SlotData::Info(a), SlotData::Info(b)) => SlotData::Info(fill_info(a, b, strategy)),
        (SlotData::Tags(mut a), SlotData::Tags(b)) => {
            a.extend(b);
            SlotData::Tags(a)
        }
        (SlotData::Images(mut a), SlotData::Images(b)) => {
            a.extend(b);
            SlotData::Images(a)
        }
        (SlotData::Related(mut a), SlotData::Related(b)) => {
            a.extend(b);
            SlotData::Related(a)
        }
        (acc, _) => acc,
    }
}

fn fill_info(mut a: EntityInfo, b: EntityInfo, strategy: MergeStrategy) -> EntityInfo {
    if a.name.trim().is_empty() {
        a.name = b.name;
    }
    a.original_name = a.original_name.or(b.original_name);
    a.description = a.description.or(b.description);
    a.release_date = a.release_date.or(b.release_date);
    match strategy {
        MergeStrategy::Append => a.links.extend(b.links),
        _ => {
            for link in b.links {
                if !a.links.iter().any(|l| l.url == link.url) {
                    a.links.push(link);
                }
            }
        }
    }
    a
}

fn dedupe_tags(tags: Vec<TagRef>) -> Vec<TagRef> {
    let mut seen = HashSet::new();
    tags.into_iter()
        .filter(|t| seen.insert(t.name.trim().to_lowercase()))
        .collect()
}

fn dedupe_urls(urls: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.into_iter().filter(|u| seen.insert(u.clone())).collect()
}

/// Two related entities are the same when they share an external id, or,
/// when either side carries no ids, when their normalised names match.
/// Ids of a dropped duplicate are folded into the kept entity.
fn dedupe_related(items: Vec<RelatedEntity>) -> Vec<RelatedEntity> {
    let mut kept: Vec<RelatedEntity> = Vec::with_capacity(items.len());
    for item in items {
        let position = kept.iter().position(|k| same_entity(k, &item));
        match position {
            Some(i) => {
                for (source, value) in item.metadata.external_ids {
                    kept[i].metadata.external_ids.entry(source).or_insert(value);
                }
            }
            None => kept.push(item),
        }
    }
    kept
}

fn same_entity(a: &RelatedEntity, b: &RelatedEntity) -> bool {
    let a_ids = &a.metadata.external_ids;
    let b_ids = &b.metadata.external_ids;
    if a_ids.iter().any(|(source, value)| b_ids.get(source) == Some(value)) {
        return true;
    }
    if !a_ids.is_empty() && !b_ids.is_empty() {
        return false;
    }
    let a_name = normalize_name(&a.metadata.info.name);
    !a_name.is_empty() && a_name == normalize_name(&b.metadata.info.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::{ContentType, ResolvedMetadata};

    fn tags(names: &[&str]) -> SlotData {
        SlotData::Tags(names.iter().map(|n| TagRef::new(*n)).collect())
    }

    fn person(name: &str, ids: &[(&str, &str)]) -> RelatedEntity {
        let mut meta = ResolvedMetadata::named(ContentType::Person, name);
        for (s, v) in ids {
            meta.external_ids.insert(s.to_string(), v.to_string());
        }
        RelatedEntity::new(meta)
    }

    #[test]
    fn test_first_skips_empty_results() {
        let merged = merge_slot(
            Slot::Tags,
            MergeStrategy::First,
            vec![tags(&[]), tags(&["drama"]), tags(&["comedy"])],
        );
        assert_eq!(merged, tags(&["drama"]));
    }

    #[test]
    fn test_first_with_nothing_yields_empty() {
        let merged = merge_slot(Slot::Covers, MergeStrategy::First, vec![]);
        assert_eq!(merged, SlotData::Images(vec![]));
    }

    #[test]
    fn test_merge_dedupes_tags_case_insensitively() {
        let merged = merge_slot(
            Slot::Tags,
            MergeStrategy::Merge,
            vec![tags(&["Drama", "Romance"]), tags(&["drama", "Mystery"])],
        );
        assert_eq!(merged, tags(&["Drama", "Romance", "Mystery"]));
    }

    #[test]
    fn test_append_keeps_duplicates() {
        let merged = merge_slot(
            Slot::Tags,
            MergeStrategy::Append,
            vec![tags(&["drama"]), tags(&["drama"])],
        );
        assert_eq!(merged, tags(&["drama", "drama"]));
    }

    #[test]
    fn test_merge_info_fills_missing_fields() {
        let a = EntityInfo {
            name: "Foo".to_string(),
            description: None,
            ..Default::default()
        };
        let b = EntityInfo {
            name: "Foo (alt)".to_string(),
            description: Some("A story".to_string()),
            release_date: Some("2004-01-30".to_string()),
            ..Default::default()
        };
        let merged = merge_slot(
            Slot::Info,
            MergeStrategy::Merge,
            vec![SlotData::Info(a), SlotData::Info(b)],
        );
        let SlotData::Info(info) = merged else {
            panic!("expected info");
        };
        assert_eq!(info.name, "Foo");
        assert_eq!(info.description.as_deref(), Some("A story"));
        assert_eq!(info.release_date.as_deref(), Some("2004-01-30"));
    }

    #[test]
    fn test_merge_related_by_external_id_then_name() {
        let merged = merge_slot(
            Slot::Persons,
            MergeStrategy::Merge,
            vec![
                SlotData::Related(vec![person("Jun Maeda", &[("vndb", "s1")])]),
                SlotData::Related(vec![
                    person("Maeda Jun", &[("vndb", "s1"), ("other", "7")]),
                    person("jun-maeda", &[]),
                    person("Itaru Hinoue", &[]),
                ]),
            ],
        );
        let SlotData::Related(items) = merged else {
            panic!("expected related");
        };
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].metadata.external_ids.len(), 2);
        assert_eq!(items[1].metadata.info.name, "Itaru Hinoue");
    }
}
