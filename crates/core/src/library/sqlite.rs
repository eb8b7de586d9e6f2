//! SQLite-backed library store.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::adder::add_in_transaction;
use super::schema::{entity_table, tag_table, SCHEMA};
use super::{AddOptions, AddOutcome, LibraryEntity, LibraryError, LibraryStats};
use crate::phash::{hash_to_hex, PhashError, PhashRecordSource, PhashRow};
use crate::scraper::{ContentType, ResolvedMetadata};

pub(crate) fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// The library database.
pub struct SqliteLibrary {
    conn: Mutex<Connection>,
}

impl SqliteLibrary {
    /// Open (or create) the library database file.
    pub fn new(path: &Path) -> Result<Self, LibraryError> {
        let conn = Connection::open(path).map_err(|e| LibraryError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory library (useful for testing).
    pub fn in_memory() -> Result<Self, LibraryError> {
        let conn =
            Connection::open_in_memory().map_err(|e| LibraryError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), LibraryError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| LibraryError::Database(e.to_string()))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| LibraryError::Database(e.to_string()))?;
        Ok(())
    }

    /// Persist resolved metadata in one transaction.
    ///
    /// No network I/O happens here; image downloads come back as pending
    /// assets for the caller to run after commit.
    pub fn add_resolved(
        &self,
        metadata: &ResolvedMetadata,
        options: &AddOptions,
    ) -> Result<AddOutcome, LibraryError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let outcome = add_in_transaction(&tx, metadata, options)?;
        tx.commit()?;
        Ok(outcome)
    }

    /// Id of the game stored at exactly `path`.
    pub fn find_game_by_path(&self, path: &Path) -> Result<Option<String>, LibraryError> {
        let conn = self.conn.lock().unwrap();
        find_game_by_path(&conn, path)
    }

    /// Id of the first entity owning any of the given external ids.
    pub fn find_by_external_ids(
        &self,
        content_type: ContentType,
        ids: &BTreeMap<String, String>,
    ) -> Result<Option<String>, LibraryError> {
        let conn = self.conn.lock().unwrap();
        find_by_external_ids(&conn, content_type, ids)
    }

    pub fn find_by_name(
        &self,
        content_type: ContentType,
        name: &str,
    ) -> Result<Option<String>, LibraryError> {
        let conn = self.conn.lock().unwrap();
        find_by_normalized_name(&conn, content_type, &super::normalize_name(name))
    }

    /// Attach an external id to an entity.
    ///
    /// Fails with a conflict, before any write, when the value already
    /// belongs to a different entity of the same type. Replaces any previous
    /// value the entity had for `source`.
    pub fn set_external_id(
        &self,
        content_type: ContentType,
        entity_id: &str,
        source: &str,
        value: &str,
    ) -> Result<(), LibraryError> {
        let mut conn = self.conn.lock().unwrap();
        ensure_exists(&conn, content_type, entity_id)?;

        let owner: Option<String> = conn
            .query_row(
                "SELECT entity_id FROM external_ids WHERE entity_type = ? AND source = ? AND value = ?",
                params![content_type.as_str(), source, value],
                |row| row.get(0),
            )
            .optional()?;
        match owner {
            Some(existing) if existing == entity_id => return Ok(()),
            Some(existing) => {
                return Err(LibraryError::ExternalIdConflict {
                    content_type,
                    id_source: source.to_string(),
                    value: value.to_string(),
                    existing_id: existing,
                })
            }
            None => {}
        }

        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM external_ids WHERE entity_type = ? AND entity_id = ? AND source = ?",
            params![content_type.as_str(), entity_id, source],
        )?;
        tx.execute(
            "INSERT INTO external_ids (entity_type, entity_id, source, value) VALUES (?, ?, ?, ?)",
            params![content_type.as_str(), entity_id, source, value],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Store the icon hash of a game.
    pub fn set_icon_phash(&self, game_id: &str, hash: u64) -> Result<(), LibraryError> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE games SET icon_phash = ?, updated_at = ? WHERE id = ?",
            params![hash_to_hex(hash), timestamp(), game_id],
        )?;
        if updated == 0 {
            return Err(LibraryError::NotFound {
                content_type: ContentType::Game,
                id: game_id.to_string(),
            });
        }
        Ok(())
    }

    pub fn get_entity(
        &self,
        content_type: ContentType,
        id: &str,
    ) -> Result<LibraryEntity, LibraryError> {
        let conn = self.conn.lock().unwrap();
        let table = entity_table(content_type);
        let entity = conn
            .query_row(
                &format!(
                    "SELECT id, name, original_name, description, release_date, path, icon_phash, created_at
                     FROM {} WHERE id = ?",
                    table
                ),
                params![id],
                |row| {
                    Ok(LibraryEntity {
                        id: row.get(0)?,
                        content_type,
                        name: row.get(1)?,
                        original_name: row.get(2)?,
                        description: row.get(3)?,
                        release_date: row.get(4)?,
                        path: row.get(5)?,
                        icon_phash: row.get(6)?,
                        external_ids: BTreeMap::new(),
                        tags: Vec::new(),
                        created_at: row.get(7)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| LibraryError::NotFound {
                content_type,
                id: id.to_string(),
            })?;

        let external_ids = load_external_ids(&conn, content_type, id)?;
        let tags = load_tags(&conn, content_type, id)?;
        Ok(LibraryEntity {
            external_ids,
            tags,
            ..entity
        })
    }

    /// Ids of entities linked to `id` through a relation table, in the
    /// parent's order.
    pub fn related_ids(
        &self,
        parent: ContentType,
        id: &str,
        slot: crate::scraper::Slot,
    ) -> Result<Vec<String>, LibraryError> {
        let Some(rel) = super::schema::relation_table(parent, slot) else {
            return Ok(Vec::new());
        };
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {r} FROM {t} WHERE {l} = ? ORDER BY {lo}",
            r = rel.right,
            t = rel.table,
            l = rel.left,
            lo = rel.left_order
        ))?;
        let rows = stmt.query_map(params![id], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    pub fn count(&self, content_type: ContentType) -> Result<u64, LibraryError> {
        let conn = self.conn.lock().unwrap();
        count_rows(&conn, entity_table(content_type))
    }

    pub fn stats(&self) -> Result<LibraryStats, LibraryError> {
        let conn = self.conn.lock().unwrap();
        Ok(LibraryStats {
            games: count_rows(&conn, "games")?,
            persons: count_rows(&conn, "persons")?,
            companies: count_rows(&conn, "companies")?,
            characters: count_rows(&conn, "characters")?,
            tags: count_rows(&conn, "tags")?,
            external_ids: count_rows(&conn, "external_ids")?,
        })
    }
}

impl PhashRecordSource for SqliteLibrary {
    fn phash_rows(&self, content_type: ContentType) -> Result<Vec<PhashRow>, PhashError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT id, name, icon_phash FROM {} WHERE icon_phash IS NOT NULL ORDER BY created_at, id",
                entity_table(content_type)
            ))
            .map_err(|e| PhashError::Source(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(|e| PhashError::Source(e.to_string()))?;

        let mut records = Vec::new();
        for row in rows {
            let (id, name, hash) = row.map_err(|e| PhashError::Source(e.to_string()))?;
            let external_ids = load_external_ids(&conn, content_type, &id)
                .map_err(|e| PhashError::Source(e.to_string()))?;
            records.push(PhashRow {
                id,
                name,
                external_ids,
                hash,
            });
        }
        Ok(records)
    }
}

pub(crate) fn ensure_exists(
    conn: &Connection,
    content_type: ContentType,
    id: &str,
) -> Result<(), LibraryError> {
    let exists = conn
        .query_row(
            &format!("SELECT 1 FROM {} WHERE id = ?", entity_table(content_type)),
            params![id],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    if !exists {
        return Err(LibraryError::NotFound {
            content_type,
            id: id.to_string(),
        });
    }
    Ok(())
}

pub(crate) fn find_game_by_path(
    conn: &Connection,
    path: &Path,
) -> Result<Option<String>, LibraryError> {
    Ok(conn
        .query_row(
            "SELECT id FROM games WHERE path = ? ORDER BY created_at, id LIMIT 1",
            params![path_key(path)],
            |row| row.get(0),
        )
        .optional()?)
}

pub(crate) fn find_by_external_ids(
    conn: &Connection,
    content_type: ContentType,
    ids: &BTreeMap<String, String>,
) -> Result<Option<String>, LibraryError> {
    let mut stmt = conn.prepare_cached(
        "SELECT entity_id FROM external_ids WHERE entity_type = ? AND source = ? AND value = ?",
    )?;
    for (source, value) in ids {
        let found: Option<String> = stmt
            .query_row(params![content_type.as_str(), source, value], |row| {
                row.get(0)
            })
            .optional()?;
        if found.is_some() {
            return Ok(found);
        }
    }
    Ok(None)
}

pub(crate) fn find_by_normalized_name(
    conn: &Connection,
    content_type: ContentType,
    normalized: &str,
) -> Result<Option<String>, LibraryError> {
    if normalized.is_empty() {
        return Ok(None);
    }
    Ok(conn
        .query_row(
            &format!(
                "SELECT id FROM {} WHERE normalized_name = ? ORDER BY created_at, id LIMIT 1",
                entity_table(content_type)
            ),
            params![normalized],
            |row| row.get(0),
        )
        .optional()?)
}

pub(crate) fn load_external_ids(
    conn: &Connection,
    content_type: ContentType,
    id: &str,
) -> Result<BTreeMap<String, String>, LibraryError> {
    let mut stmt = conn.prepare_cached(
        "SELECT source, value FROM external_ids WHERE entity_type = ? AND entity_id = ? ORDER BY id",
    )?;
    let rows = stmt.query_map(params![content_type.as_str(), id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    let mut ids = BTreeMap::new();
    for row in rows {
        let (source, value) = row?;
        ids.entry(source).or_insert(value);
    }
    Ok(ids)
}

fn load_tags(
    conn: &Connection,
    content_type: ContentType,
    id: &str,
) -> Result<Vec<String>, LibraryError> {
    let rel = tag_table(content_type);
    let mut stmt = conn.prepare(&format!(
        "SELECT tags.name FROM {t} JOIN tags ON tags.id = {t}.tag_id WHERE {t}.{l} = ? ORDER BY {t}.{lo}",
        t = rel.table,
        l = rel.left,
        lo = rel.left_order
    ))?;
    let rows = stmt.query_map(params![id], |row| row.get::<_, String>(0))?;
    let mut tags = Vec::new();
    for row in rows {
        tags.push(row?);
    }
    Ok(tags)
}

fn count_rows(conn: &Connection, table: &str) -> Result<u64, LibraryError> {
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
        row.get(0)
    })?;
    Ok(count as u64)
}
