//! Metadata scraping: capability-gated providers, per-type registries,
//! user profiles and the resolver that combines them.
//!
//! A resolution runs in three phases: the profile's search provider finds
//! the item, every other referenced provider resolves its own id, then every
//! configured slot is fetched from its providers concurrently and merged.

mod merge;
mod profile;
mod profile_store;
mod provider;
mod registry;
mod resolver;
mod types;
mod vndb;

pub use merge::merge_slot;
pub use profile::*;
pub use profile_store::SqliteProfileStore;
pub use provider::*;
pub use registry::{ProviderRegistry, RegistryError};
pub use resolver::{GetMetadataOptions, MetadataResolver, ResolverError, Scrapers};
pub use types::*;
pub use vndb::{VndbConfig, VndbProvider, VNDB_PROVIDER_ID};
