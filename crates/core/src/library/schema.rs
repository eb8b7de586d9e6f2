use crate::scraper::{ContentType, Slot};

pub(crate) const SCHEMA: &str = r#"
    -- Entities (shared column set)
    CREATE TABLE IF NOT EXISTS games (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        original_name TEXT,
        normalized_name TEXT NOT NULL,
        description TEXT,
        release_date TEXT,
        path TEXT,
        icon_phash TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_games_normalized_name ON games(normalized_name);
    CREATE INDEX IF NOT EXISTS idx_games_path ON games(path);

    CREATE TABLE IF NOT EXISTS persons (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        original_name TEXT,
        normalized_name TEXT NOT NULL,
        description TEXT,
        release_date TEXT,
        path TEXT,
        icon_phash TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_persons_normalized_name ON persons(normalized_name);

    CREATE TABLE IF NOT EXISTS companies (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        original_name TEXT,
        normalized_name TEXT NOT NULL,
        description TEXT,
        release_date TEXT,
        path TEXT,
        icon_phash TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_companies_normalized_name ON companies(normalized_name);

    CREATE TABLE IF NOT EXISTS characters (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        original_name TEXT,
        normalized_name TEXT NOT NULL,
        description TEXT,
        release_date TEXT,
        path TEXT,
        icon_phash TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_characters_normalized_name ON characters(normalized_name);

    -- External ids, unique per entity type + source + value
    CREATE TABLE IF NOT EXISTS external_ids (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        entity_type TEXT NOT NULL,
        entity_id TEXT NOT NULL,
        source TEXT NOT NULL,
        value TEXT NOT NULL,
        UNIQUE(entity_type, source, value)
    );
    CREATE INDEX IF NOT EXISTS idx_external_ids_entity ON external_ids(entity_type, entity_id);

    CREATE TABLE IF NOT EXISTS tags (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        created_at TEXT NOT NULL
    );

    -- Relations: annotation columns plus one ordinal per side
    CREATE TABLE IF NOT EXISTS game_persons (
        game_id TEXT NOT NULL REFERENCES games(id) ON DELETE CASCADE,
        person_id TEXT NOT NULL REFERENCES persons(id) ON DELETE CASCADE,
        relation_type TEXT NOT NULL DEFAULT '',
        note TEXT,
        is_spoiler INTEGER NOT NULL DEFAULT 0,
        game_order INTEGER NOT NULL,
        person_order INTEGER NOT NULL,
        PRIMARY KEY (game_id, person_id, relation_type)
    );

    CREATE TABLE IF NOT EXISTS game_companies (
        game_id TEXT NOT NULL REFERENCES games(id) ON DELETE CASCADE,
        company_id TEXT NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
        relation_type TEXT NOT NULL DEFAULT '',
        note TEXT,
        is_spoiler INTEGER NOT NULL DEFAULT 0,
        game_order INTEGER NOT NULL,
        company_order INTEGER NOT NULL,
        PRIMARY KEY (game_id, company_id, relation_type)
    );

    CREATE TABLE IF NOT EXISTS game_characters (
        game_id TEXT NOT NULL REFERENCES games(id) ON DELETE CASCADE,
        character_id TEXT NOT NULL REFERENCES characters(id) ON DELETE CASCADE,
        relation_type TEXT NOT NULL DEFAULT '',
        note TEXT,
        is_spoiler INTEGER NOT NULL DEFAULT 0,
        game_order INTEGER NOT NULL,
        character_order INTEGER NOT NULL,
        PRIMARY KEY (game_id, character_id, relation_type)
    );

    CREATE TABLE IF NOT EXISTS character_persons (
        character_id TEXT NOT NULL REFERENCES characters(id) ON DELETE CASCADE,
        person_id TEXT NOT NULL REFERENCES persons(id) ON DELETE CASCADE,
        relation_type TEXT NOT NULL DEFAULT '',
        note TEXT,
        is_spoiler INTEGER NOT NULL DEFAULT 0,
        character_order INTEGER NOT NULL,
        person_order INTEGER NOT NULL,
        PRIMARY KEY (character_id, person_id, relation_type)
    );

    CREATE TABLE IF NOT EXISTS game_tags (
        game_id TEXT NOT NULL REFERENCES games(id) ON DELETE CASCADE,
        tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
        relation_type TEXT NOT NULL DEFAULT '',
        note TEXT,
        is_spoiler INTEGER NOT NULL DEFAULT 0,
        game_order INTEGER NOT NULL,
        tag_order INTEGER NOT NULL,
        PRIMARY KEY (game_id, tag_id)
    );

    CREATE TABLE IF NOT EXISTS person_tags (
        person_id TEXT NOT NULL REFERENCES persons(id) ON DELETE CASCADE,
        tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
        relation_type TEXT NOT NULL DEFAULT '',
        note TEXT,
        is_spoiler INTEGER NOT NULL DEFAULT 0,
        person_order INTEGER NOT NULL,
        tag_order INTEGER NOT NULL,
        PRIMARY KEY (person_id, tag_id)
    );

    CREATE TABLE IF NOT EXISTS company_tags (
        company_id TEXT NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
        tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
        relation_type TEXT NOT NULL DEFAULT '',
        note TEXT,
        is_spoiler INTEGER NOT NULL DEFAULT 0,
        company_order INTEGER NOT NULL,
        tag_order INTEGER NOT NULL,
        PRIMARY KEY (company_id, tag_id)
    );

    CREATE TABLE IF NOT EXISTS character_tags (
        character_id TEXT NOT NULL REFERENCES characters(id) ON DELETE CASCADE,
        tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
        relation_type TEXT NOT NULL DEFAULT '',
        note TEXT,
        is_spoiler INTEGER NOT NULL DEFAULT 0,
        character_order INTEGER NOT NULL,
        tag_order INTEGER NOT NULL,
        PRIMARY KEY (character_id, tag_id)
    );
"#;

/// Entity table for a content type.
pub(crate) fn entity_table(content_type: ContentType) -> &'static str {
    match content_type {
        ContentType::Game => "games",
        ContentType::Person => "persons",
        ContentType::Company => "companies",
        ContentType::Character => "characters",
    }
}

/// A relation table: `left` is the owning side, `right` the linked side.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RelationTable {
    pub table: &'static str,
    pub left: &'static str,
    pub left_order: &'static str,
    pub right: &'static str,
    pub right_order: &'static str,
}

impl RelationTable {
    const fn new(
        table: &'static str,
        left: &'static str,
        left_order: &'static str,
        right: &'static str,
        right_order: &'static str,
    ) -> Self {
        Self {
            table,
            left,
            left_order,
            right,
            right_order,
        }
    }

    /// Insert one row; each side's ordinal is one past its current maximum.
    pub fn insert_sql(&self) -> String {
        format!(
            "INSERT OR IGNORE INTO {t} ({l}, {r}, relation_type, note, is_spoiler, {lo}, {ro})
             VALUES (?1, ?2, ?3, ?4, ?5,
                (SELECT COALESCE(MAX({lo}) + 1, 0) FROM {t} WHERE {l} = ?1),
                (SELECT COALESCE(MAX({ro}) + 1, 0) FROM {t} WHERE {r} = ?2))",
            t = self.table,
            l = self.left,
            r = self.right,
            lo = self.left_order,
            ro = self.right_order,
        )
    }
}

/// Relation table linking a parent to entities of a relation slot.
pub(crate) fn relation_table(parent: ContentType, slot: Slot) -> Option<RelationTable> {
    match (parent, slot) {
        (ContentType::Game, Slot::Persons) => Some(RelationTable::new(
            "game_persons", "game_id", "game_order", "person_id", "person_order",
        )),
        (ContentType::Game, Slot::Companies) => Some(RelationTable::new(
            "game_companies", "game_id", "game_order", "company_id", "company_order",
        )),
        (ContentType::Game, Slot::Characters) => Some(RelationTable::new(
            "game_characters", "game_id", "game_order", "character_id", "character_order",
        )),
        (ContentType::Character, Slot::Persons) => Some(RelationTable::new(
            "character_persons", "character_id", "character_order", "person_id", "person_order",
        )),
        _ => None,
    }
}

pub(crate) fn tag_table(parent: ContentType) -> RelationTable {
    match parent {
        ContentType::Game => RelationTable::new("game_tags", "game_id", "game_order", "tag_id", "tag_order"),
        ContentType::Person => {
            RelationTable::new("person_tags", "person_id", "person_order", "tag_id", "tag_order")
        }
        ContentType::Company => {
            RelationTable::new("company_tags", "company_id", "company_order", "tag_id", "tag_order")
        }
        ContentType::Character => RelationTable::new(
            "character_tags", "character_id", "character_order", "tag_id", "tag_order",
        ),
    }
}
