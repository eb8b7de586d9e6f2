use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::library::AssetsConfig;
use crate::phash::PhashConfig;
use crate::scanner::ScannerDefinition;
use crate::scraper::{ContentType, MergeStrategy, ScraperProfile, Slot, VndbConfig};

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub scanner: ScanQueueConfig,
    #[serde(default)]
    pub phash: PhashConfig,
    #[serde(default)]
    pub assets: AssetsConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    /// Profiles inserted into the profile store when absent.
    #[serde(default)]
    pub profiles: Vec<ProfileSeedConfig>,
    #[serde(default)]
    pub scanners: Vec<ScannerDefinition>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("trove.db")
}

/// Library storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LibraryConfig {
    #[serde(default = "default_attachments_dir")]
    pub attachments_dir: PathBuf,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            attachments_dir: default_attachments_dir(),
        }
    }
}

fn default_attachments_dir() -> PathBuf {
    PathBuf::from("attachments")
}

/// Scan queue configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScanQueueConfig {
    /// Requests buffered before callers wait for space.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for ScanQueueConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_queue_capacity() -> usize {
    64
}

/// Bundled provider configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub vndb: Option<VndbConfig>,
}

/// A scraper profile to seed
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProfileSeedConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub media_type: ContentType,
    pub search_provider_id: String,
    #[serde(default)]
    pub slots: Vec<SlotSeedConfig>,
}

/// One slot of a seeded profile; providers are listed in priority order.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SlotSeedConfig {
    pub slot: Slot,
    #[serde(default)]
    pub providers: Vec<String>,
    #[serde(default)]
    pub merge_strategy: MergeStrategy,
}

impl ProfileSeedConfig {
    pub fn to_profile(&self) -> ScraperProfile {
        let name = self.name.clone().unwrap_or_else(|| self.id.clone());
        let mut profile = ScraperProfile::new(
            self.id.clone(),
            name,
            self.media_type,
            self.search_provider_id.clone(),
        );
        for slot in &self.slots {
            let providers: Vec<&str> = slot.providers.iter().map(String::as_str).collect();
            profile = profile.with_slot(slot.slot, &providers, slot.merge_strategy);
        }
        profile.normalize();
        profile
    }
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub library: LibraryConfig,
    pub scanner: ScanQueueConfig,
    pub phash: PhashConfig,
    pub assets: AssetsConfig,
    pub providers: SanitizedProvidersConfig,
    pub profiles: Vec<ProfileSeedConfig>,
    pub scanners: Vec<ScannerDefinition>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedProvidersConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vndb: Option<SanitizedVndbConfig>,
}

/// Sanitized VNDB config (token hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedVndbConfig {
    pub enabled: bool,
    pub base_url: String,
    pub timeout_secs: u64,
    pub api_token_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            library: config.library.clone(),
            scanner: config.scanner.clone(),
            phash: config.phash.clone(),
            assets: config.assets.clone(),
            providers: SanitizedProvidersConfig {
                vndb: config.providers.vndb.as_ref().map(|v| SanitizedVndbConfig {
                    enabled: v.enabled,
                    base_url: v.base_url.clone(),
                    timeout_secs: v.timeout_secs,
                    api_token_configured: v.api_token.as_ref().is_some_and(|t| !t.is_empty()),
                }),
            },
            profiles: config.profiles.clone(),
            scanners: config.scanners.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.path, PathBuf::from("trove.db"));
        assert_eq!(config.scanner.queue_capacity, 64);
        assert_eq!(config.phash.max_distance(ContentType::Game), 10);
        assert_eq!(config.phash.max_distance(ContentType::Person), 8);
        assert!(config.providers.vndb.is_none());
    }

    #[test]
    fn test_profile_seed_to_profile() {
        let seed: ProfileSeedConfig = toml::from_str(
            r#"
            id = "default"
            media_type = "game"
            search_provider_id = "vndb"

            [[slots]]
            slot = "tags"
            providers = ["vndb", "other"]
            merge_strategy = "merge"
            "#,
        )
        .unwrap();

        let profile = seed.to_profile();
        assert_eq!(profile.name, "default");
        assert_eq!(profile.media_type, ContentType::Game);
        let tags = &profile.slot_configs[&Slot::Tags];
        assert_eq!(tags.merge_strategy, MergeStrategy::Merge);
        assert_eq!(tags.providers[1].provider_id, "other");
        assert_eq!(tags.providers[1].priority, 1);
        assert!(profile.slot_configs.contains_key(&Slot::Covers));
    }

    #[test]
    fn test_sanitized_hides_token() {
        let mut config = Config::default();
        config.providers.vndb = Some(VndbConfig {
            api_token: Some("secret".to_string()),
            ..Default::default()
        });
        let sanitized = SanitizedConfig::from(&config);
        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("secret"));
        assert!(sanitized.providers.vndb.unwrap().api_token_configured);
    }
}
