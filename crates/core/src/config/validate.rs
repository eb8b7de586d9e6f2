use std::collections::HashSet;

use tracing::warn;

use super::{types::Config, ConfigError};
use crate::extractor::NameExtractor;
use crate::scanner::MAX_INTERVAL_MINUTES;

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Scanner ids are non-empty and unique
/// - Every scanner rule compiles and has a `name` group
/// - Scanner intervals are at most one year
/// - Profile seeds have unique ids and only slots of their media type
///
/// A scanner referencing a profile that is not seeded only logs a warning;
/// the profile may already exist in the store.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    let mut profile_ids = HashSet::new();
    for profile in &config.profiles {
        if profile.id.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "profile id cannot be empty".to_string(),
            ));
        }
        if !profile_ids.insert(profile.id.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate profile id '{}'",
                profile.id
            )));
        }
        for slot in &profile.slots {
            if !profile.media_type.has_slot(slot.slot) {
                return Err(ConfigError::ValidationError(format!(
                    "profile '{}': slot '{}' does not apply to {}",
                    profile.id, slot.slot, profile.media_type
                )));
            }
        }
    }

    let mut scanner_ids = HashSet::new();
    for scanner in &config.scanners {
        if scanner.id.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "scanner id cannot be empty".to_string(),
            ));
        }
        if !scanner_ids.insert(scanner.id.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate scanner id '{}'",
                scanner.id
            )));
        }
        if scanner.interval_minutes > MAX_INTERVAL_MINUTES {
            return Err(ConfigError::ValidationError(format!(
                "scanner '{}': interval_minutes exceeds {}",
                scanner.id, MAX_INTERVAL_MINUTES
            )));
        }
        NameExtractor::new(&scanner.rules).map_err(|e| {
            ConfigError::ValidationError(format!("scanner '{}': {}", scanner.id, e))
        })?;
        if !profile_ids.contains(scanner.profile_id.as_str()) {
            warn!(
                scanner_id = %scanner.id,
                profile_id = %scanner.profile_id,
                "Scanner profile is not seeded from config"
            );
        }
    }

    Ok(())
}
