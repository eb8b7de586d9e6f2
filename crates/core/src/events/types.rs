use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scanner::{ScanCompletedData, ScanProgressData};
use crate::scraper::ContentType;

/// Event types published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LibraryEvent {
    ScannerStarted {
        scanner_id: String,
        started_at: DateTime<Utc>,
    },
    /// Complete progress snapshot; replaces any earlier one for the scanner.
    ScannerProgress(ScanProgressData),
    ScannerCompleted(ScanCompletedData),
    ScannerError {
        scanner_id: String,
        error: String,
    },
    EntityAdded {
        content_type: ContentType,
        id: String,
        name: String,
    },
}

impl LibraryEvent {
    /// Topic name, e.g. `scanner:progress` or `game:added`.
    pub fn topic(&self) -> String {
        match self {
            LibraryEvent::ScannerStarted { .. } => "scanner:started".to_string(),
            LibraryEvent::ScannerProgress(_) => "scanner:progress".to_string(),
            LibraryEvent::ScannerCompleted(_) => "scanner:completed".to_string(),
            LibraryEvent::ScannerError { .. } => "scanner:error".to_string(),
            LibraryEvent::EntityAdded { content_type, .. } => format!("{}:added", content_type),
        }
    }
}

/// Envelope wrapping an event with metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub timestamp: DateTime<Utc>,
    pub topic: String,
    pub event: LibraryEvent,
}
