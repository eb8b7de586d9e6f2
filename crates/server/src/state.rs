use std::sync::Arc;
use trove_core::{Adder, Config, EventBus, SanitizedConfig, ScannerService, Scrapers, SqliteLibrary};

/// Shared application state
pub struct AppState {
    config: Config,
    config_hash: String,
    scrapers: Arc<Scrapers>,
    adder: Arc<Adder>,
    scanner: Arc<ScannerService>,
    events: EventBus,
}

impl AppState {
    pub fn new(
        config: Config,
        config_hash: String,
        scrapers: Arc<Scrapers>,
        adder: Arc<Adder>,
        scanner: Arc<ScannerService>,
        events: EventBus,
    ) -> Self {
        Self {
            config,
            config_hash,
            scrapers,
            adder,
            scanner,
            events,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn config_hash(&self) -> &str {
        &self.config_hash
    }

    pub fn scrapers(&self) -> &Scrapers {
        self.scrapers.as_ref()
    }

    pub fn adder(&self) -> &Adder {
        self.adder.as_ref()
    }

    pub fn library(&self) -> &SqliteLibrary {
        self.adder.library().as_ref()
    }

    pub fn scanner(&self) -> &ScannerService {
        self.scanner.as_ref()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }
}
