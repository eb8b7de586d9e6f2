//! Library event bus: scanner lifecycle and entity-added notifications.

mod bus;
mod types;

pub use bus::EventBus;
pub use types::*;
