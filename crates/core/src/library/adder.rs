//! Transactional add with three-tier dedup.
//!
//! Precedence for every entity, parent or linked: external id, then path
//! (games only), then normalised name, then insert.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use rusqlite::{params, Connection, OptionalExtension, ToSql};
use tracing::{info, warn};
use uuid::Uuid;

use super::assets::AssetDownloader;
use super::schema::{entity_table, relation_table, tag_table, RelationTable};
use super::sqlite::{
    find_by_external_ids, find_by_normalized_name, find_game_by_path, path_key, timestamp,
};
use super::{
    normalize_name, AddOptions, AddOutcome, AddResult, AssetReport, CreatedEntity,
    ExistingReason, LibraryError, PendingAsset, SqliteLibrary,
};
use crate::events::{EventBus, LibraryEvent};
use crate::metrics;
use crate::phash::hash_to_hex;
use crate::scraper::{ContentType, ResolvedMetadata, Slot, SlotKind};

const RELATION_SLOTS: [Slot; 3] = [Slot::Persons, Slot::Companies, Slot::Characters];

/// Run the whole add inside an open transaction.
pub(crate) fn add_in_transaction(
    conn: &Connection,
    metadata: &ResolvedMetadata,
    options: &AddOptions,
) -> Result<AddOutcome, LibraryError> {
    let mut created = Vec::new();
    let mut pending_assets = Vec::new();
    let (id, existing_reason) = upsert_entity(
        conn,
        metadata,
        options.path.as_deref(),
        options.icon_phash,
        &mut created,
        &mut pending_assets,
    )?;
    Ok(AddOutcome {
        id,
        is_new: existing_reason.is_none(),
        existing_reason,
        created,
        pending_assets,
    })
}

fn find_existing(
    conn: &Connection,
    metadata: &ResolvedMetadata,
    path: Option<&Path>,
) -> Result<Option<(String, ExistingReason)>, LibraryError> {
    let content_type = metadata.content_type;
    if let Some(id) = find_by_external_ids(conn, content_type, &metadata.external_ids)? {
        return Ok(Some((id, ExistingReason::ExternalId)));
    }
    if content_type == ContentType::Game {
        if let Some(path) = path {
            if let Some(id) = find_game_by_path(conn, path)? {
                return Ok(Some((id, ExistingReason::Path)));
            }
        }
    }
    let normalized = normalize_name(&metadata.info.name);
    if let Some(id) = find_by_normalized_name(conn, content_type, &normalized)? {
        return Ok(Some((id, ExistingReason::Name)));
    }
    Ok(None)
}

/// Find-or-create one entity and, when created, its tags, relations and assets.
fn upsert_entity(
    conn: &Connection,
    metadata: &ResolvedMetadata,
    path: Option<&Path>,
    icon_phash: Option<u64>,
    created: &mut Vec<CreatedEntity>,
    pending: &mut Vec<PendingAsset>,
) -> Result<(String, Option<ExistingReason>), LibraryError> {
    let content_type = metadata.content_type;

    if let Some((id, reason)) = find_existing(conn, metadata, path)? {
        insert_external_ids(conn, content_type, &id, &metadata.external_ids)?;
        return Ok((id, Some(reason)));
    }

    let name = metadata.info.name.trim();
    if name.is_empty() {
        return Err(LibraryError::InvalidInput(format!(
            "{} metadata has no name",
            content_type
        )));
    }

    let id = Uuid::new_v4().to_string();
    let now = timestamp();
    let icon = match content_type {
        ContentType::Game => icon_phash.map(hash_to_hex),
        _ => None,
    };
    conn.execute(
        &format!(
            "INSERT INTO {} (id, name, original_name, normalized_name, description, release_date, path, icon_phash, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            entity_table(content_type)
        ),
        params![
            &id,
            name,
            &metadata.info.original_name,
            normalize_name(name),
            &metadata.info.description,
            &metadata.info.release_date,
            path.map(path_key),
            icon,
            &now,
            &now,
        ],
    )?;
    insert_external_ids(conn, content_type, &id, &metadata.external_ids)?;
    created.push(CreatedEntity {
        content_type,
        id: id.clone(),
        name: name.to_string(),
    });

    let tags = tag_table(content_type);
    for tag in &metadata.tags {
        let tag_name = tag.name.trim();
        if tag_name.is_empty() {
            continue;
        }
        let tag_id = get_or_create_tag(conn, tag_name)?;
        insert_relation(conn, &tags, &id, &tag_id, None, None, tag.is_spoiler)?;
    }

    for slot in RELATION_SLOTS {
        let Some(table) = relation_table(content_type, slot) else {
            continue;
        };
        let SlotKind::Related(expected) = slot.kind() else {
            continue;
        };
        for related in metadata.related(slot) {
            if related.metadata.content_type != expected {
                warn!(
                    slot = %slot,
                    expected = %expected,
                    actual = %related.metadata.content_type,
                    "Skipping related entity of the wrong type"
                );
                continue;
            }
            let (child_id, _) = upsert_entity(conn, &related.metadata, None, None, created, pending)?;
            insert_relation(
                conn,
                &table,
                &id,
                &child_id,
                related.relation_type.as_deref(),
                related.note.as_deref(),
                related.is_spoiler,
            )?;
        }
    }

    for (slot, urls) in &metadata.images {
        let Some(field) = slot.attachment_field() else {
            continue;
        };
        if urls.is_empty() || !content_type.has_slot(*slot) {
            continue;
        }
        pending.push(PendingAsset {
            table: entity_table(content_type).to_string(),
            row_id: id.clone(),
            field: field.to_string(),
            urls: urls.clone(),
        });
    }

    Ok((id, None))
}

fn insert_external_ids(
    conn: &Connection,
    content_type: ContentType,
    id: &str,
    ids: &BTreeMap<String, String>,
) -> Result<(), LibraryError> {
    let mut stmt = conn.prepare_cached(
        "INSERT OR IGNORE INTO external_ids (entity_type, entity_id, source, value) VALUES (?, ?, ?, ?)",
    )?;
    for (source, value) in ids {
        if value.trim().is_empty() {
            continue;
        }
        stmt.execute(params![content_type.as_str(), id, source, value])?;
    }
    Ok(())
}

fn get_or_create_tag(conn: &Connection, name: &str) -> Result<i64, LibraryError> {
    conn.execute(
        "INSERT OR IGNORE INTO tags (name, created_at) VALUES (?, ?)",
        params![name, timestamp()],
    )?;
    let id: Option<i64> = conn
        .query_row("SELECT id FROM tags WHERE name = ?", params![name], |row| {
            row.get(0)
        })
        .optional()?;
    id.ok_or_else(|| LibraryError::Database(format!("tag '{}' vanished after insert", name)))
}

fn insert_relation(
    conn: &Connection,
    table: &RelationTable,
    left_id: &str,
    right_id: &dyn ToSql,
    relation_type: Option<&str>,
    note: Option<&str>,
    is_spoiler: bool,
) -> Result<(), LibraryError> {
    conn.execute(
        &table.insert_sql(),
        params![left_id, right_id, relation_type.unwrap_or(""), note, is_spoiler],
    )?;
    Ok(())
}

/// Adds resolved metadata to the library, then downloads its assets.
pub struct Adder {
    library: Arc<SqliteLibrary>,
    assets: Option<AssetDownloader>,
    events: EventBus,
}

impl Adder {
    pub fn new(library: Arc<SqliteLibrary>, events: EventBus) -> Self {
        Self {
            library,
            assets: None,
            events,
        }
    }

    pub fn with_assets(mut self, assets: AssetDownloader) -> Self {
        self.assets = Some(assets);
        self
    }

    pub fn library(&self) -> &Arc<SqliteLibrary> {
        &self.library
    }

    pub async fn add_game(
        &self,
        metadata: &ResolvedMetadata,
        options: &AddOptions,
    ) -> Result<AddResult, LibraryError> {
        self.add_as(ContentType::Game, metadata, options).await
    }

    pub async fn add_person(
        &self,
        metadata: &ResolvedMetadata,
        options: &AddOptions,
    ) -> Result<AddResult, LibraryError> {
        self.add_as(ContentType::Person, metadata, options).await
    }

    pub async fn add_company(
        &self,
        metadata: &ResolvedMetadata,
        options: &AddOptions,
    ) -> Result<AddResult, LibraryError> {
        self.add_as(ContentType::Company, metadata, options).await
    }

    pub async fn add_character(
        &self,
        metadata: &ResolvedMetadata,
        options: &AddOptions,
    ) -> Result<AddResult, LibraryError> {
        self.add_as(ContentType::Character, metadata, options).await
    }

    /// Add metadata of any content type.
    pub async fn add(
        &self,
        metadata: &ResolvedMetadata,
        options: &AddOptions,
    ) -> Result<AddResult, LibraryError> {
        // The transaction runs on the blocking pool; asset fetches follow
        // once it has committed.
        let library = Arc::clone(&self.library);
        let (resolved, add_options) = (metadata.clone(), options.clone());
        let outcome = tokio::task::spawn_blocking(move || {
            library.add_resolved(&resolved, &add_options)
        })
        .await
        .map_err(|e| LibraryError::Database(format!("add task failed: {}", e)))??;

        match outcome.existing_reason {
            None => info!(
                content_type = %metadata.content_type,
                id = %outcome.id,
                name = %metadata.info.name,
                linked_created = outcome.created.len().saturating_sub(1),
                "Added new entity"
            ),
            Some(reason) => info!(
                content_type = %metadata.content_type,
                id = %outcome.id,
                reason = reason.as_str(),
                "Entity already in library"
            ),
        }

        for entity in &outcome.created {
            metrics::ENTITIES_ADDED
                .with_label_values(&[entity.content_type.as_str()])
                .inc();
            self.events.emit(LibraryEvent::EntityAdded {
                content_type: entity.content_type,
                id: entity.id.clone(),
                name: entity.name.clone(),
            });
        }

        let assets = match (&self.assets, options.download_assets) {
            (Some(downloader), true) if !outcome.pending_assets.is_empty() => {
                downloader.download_all(&outcome.pending_assets).await
            }
            _ => AssetReport::default(),
        };

        Ok(AddResult {
            id: outcome.id,
            is_new: outcome.is_new,
            existing_reason: outcome.existing_reason,
            assets,
        })
    }

    async fn add_as(
        &self,
        expected: ContentType,
        metadata: &ResolvedMetadata,
        options: &AddOptions,
    ) -> Result<AddResult, LibraryError> {
        if metadata.content_type != expected {
            return Err(LibraryError::ContentTypeMismatch {
                expected,
                actual: metadata.content_type,
            });
        }
        self.add(metadata, options).await
    }
}
