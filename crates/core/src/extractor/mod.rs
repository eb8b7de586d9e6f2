//! Name extraction: maps a filesystem entry name to a candidate entity name
//! through an ordered list of regex rules.

mod rules;
mod types;

pub use rules::{base_name, NameExtractor};
pub use types::*;
