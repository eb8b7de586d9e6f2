//! SQLite-backed scraper profile store.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{ContentType, ProfileError, ProfileStore, ScraperProfile};

pub struct SqliteProfileStore {
    conn: Mutex<Connection>,
}

impl SqliteProfileStore {
    pub fn new(path: &Path) -> Result<Self, ProfileError> {
        let conn = Connection::open(path).map_err(|e| ProfileError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, ProfileError> {
        let conn =
            Connection::open_in_memory().map_err(|e| ProfileError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), ProfileError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS scraper_profiles (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                media_type TEXT NOT NULL,
                search_provider_id TEXT NOT NULL,
                slot_configs TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_scraper_profiles_media_type ON scraper_profiles(media_type);
            "#,
        )
        .map_err(|e| ProfileError::Database(e.to_string()))?;
        Ok(())
    }

    fn row_to_profile(row: &rusqlite::Row) -> rusqlite::Result<RawProfile> {
        Ok(RawProfile {
            id: row.get(0)?,
            name: row.get(1)?,
            media_type: row.get(2)?,
            search_provider_id: row.get(3)?,
            slot_configs: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }
}

struct RawProfile {
    id: String,
    name: String,
    media_type: String,
    search_provider_id: String,
    slot_configs: String,
    created_at: String,
    updated_at: String,
}

impl RawProfile {
    fn into_profile(self) -> Result<ScraperProfile, ProfileError> {
        let media_type: ContentType = self
            .media_type
            .parse()
            .map_err(ProfileError::Serialization)?;
        let slot_configs = serde_json::from_str(&self.slot_configs)
            .map_err(|e| ProfileError::Serialization(e.to_string()))?;
        let mut profile = ScraperProfile {
            id: self.id,
            name: self.name,
            media_type,
            search_provider_id: self.search_provider_id,
            slot_configs,
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
        };
        profile.normalize();
        Ok(profile)
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

const SELECT_COLUMNS: &str =
    "SELECT id, name, media_type, search_provider_id, slot_configs, created_at, updated_at FROM scraper_profiles";

impl ProfileStore for SqliteProfileStore {
    fn get(&self, id: &str) -> Result<Option<ScraperProfile>, ProfileError> {
        let conn = self.conn.lock().unwrap();
        let raw = conn
            .query_row(
                &format!("{} WHERE id = ?", SELECT_COLUMNS),
                params![id],
                Self::row_to_profile,
            )
            .optional()
            .map_err(|e| ProfileError::Database(e.to_string()))?;
        raw.map(RawProfile::into_profile).transpose()
    }

    fn list(&self, media_type: Option<ContentType>) -> Result<Vec<ScraperProfile>, ProfileError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&format!(
                "{} WHERE (?1 IS NULL OR media_type = ?1) ORDER BY created_at, id",
                SELECT_COLUMNS
            ))
            .map_err(|e| ProfileError::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![media_type.map(|m| m.as_str())], Self::row_to_profile)
            .map_err(|e| ProfileError::Database(e.to_string()))?;

        let mut profiles = Vec::new();
        for row in rows {
            let raw = row.map_err(|e| ProfileError::Database(e.to_string()))?;
            profiles.push(raw.into_profile()?);
        }
        Ok(profiles)
    }

    fn save(&self, profile: &ScraperProfile) -> Result<(), ProfileError> {
        let slot_configs = serde_json::to_string(&profile.slot_configs)
            .map_err(|e| ProfileError::Serialization(e.to_string()))?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO scraper_profiles (id, name, media_type, search_provider_id, slot_configs, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                media_type = excluded.media_type,
                search_provider_id = excluded.search_provider_id,
                slot_configs = excluded.slot_configs,
                updated_at = excluded.updated_at",
            params![
                &profile.id,
                &profile.name,
                profile.media_type.as_str(),
                &profile.search_provider_id,
                &slot_configs,
                profile.created_at.to_rfc3339(),
                profile.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| ProfileError::Database(e.to_string()))?;
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<bool, ProfileError> {
        let conn = self.conn.lock().unwrap();
        let affected = conn
            .execute("DELETE FROM scraper_profiles WHERE id = ?", params![id])
            .map_err(|e| ProfileError::Database(e.to_string()))?;
        Ok(affected > 0)
    }
}
