//! Perceptual hashing and nearest-match lookup against persisted entities.

mod hash;
mod matcher;
mod types;

pub use hash::{compute_phash, hamming_distance, hash_from_hex, hash_to_hex, phash_image};
pub use matcher::{best_match, PhashMatcher};
pub use types::*;
