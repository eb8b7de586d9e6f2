pub mod config;
pub mod events;
pub mod extractor;
pub mod library;
pub mod metrics;
pub mod phash;
pub mod scanner;
pub mod scraper;
pub mod testing;

pub use config::{
    config_path_from_env, load_config, load_config_from_str, validate_config, Config,
    ConfigError, SanitizedConfig,
};
pub use events::{EventBus, EventEnvelope, LibraryEvent};
pub use library::{Adder, SqliteLibrary};
pub use scanner::{ScannerDefinition, ScannerService};
pub use scraper::{MetadataResolver, Scrapers};
