//! Library persistence: the SQLite store, the transactional adder and
//! deferred asset downloads.

mod adder;
mod assets;
mod attachments;
mod schema;
mod sqlite;
mod types;

pub use adder::Adder;
pub use assets::{AssetDownloader, AssetError, AssetsConfig, Fetcher, HttpFetcher};
pub use attachments::{AttachmentSource, AttachmentStore, FsAttachmentStore};
pub use sqlite::SqliteLibrary;
pub use types::*;

/// Lowercase and keep alphanumeric characters only.
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphanumeric())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("Ever17 -the out of infinity-"), "ever17theoutofinfinity");
        assert_eq!(normalize_name("  Clannad!! "), "clannad");
        assert_eq!(normalize_name("ひぐらしのなく頃に"), "ひぐらしのなく頃に");
        assert_eq!(normalize_name("---"), "");
    }
}
