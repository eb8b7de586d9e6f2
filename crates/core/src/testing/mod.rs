//! Testing utilities and mock implementations.
//!
//! Mocks stand in for the network-facing collaborators (scraper providers,
//! the asset fetcher, attachment storage) so the scan pipeline can run
//! end to end against an in-memory library.
//!
//! # Example
//!
//! ```rust,ignore
//! use trove_core::testing::{fixtures, MockProvider};
//!
//! let provider = MockProvider::new("mock", ContentType::Game)
//!     .with_search()
//!     .with_hits_for("Foo", vec![fixtures::search_hit("1", "Foo")]);
//! ```

mod mock_fetcher;
mod mock_provider;

pub use mock_fetcher::{MemoryAttachmentStore, MockFetcher};
pub use mock_provider::{MockProvider, RecordedCall};

/// Test fixtures and helper functions.
pub mod fixtures {
    use image::{DynamicImage, GrayImage, ImageFormat, Luma};
    use std::io::Cursor;

    use crate::scraper::{ContentType, ResolvedMetadata, SearchHit};

    /// Create a search hit.
    pub fn search_hit(id: &str, name: &str) -> SearchHit {
        SearchHit {
            id: id.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Game metadata carrying one external id.
    pub fn game_metadata(name: &str, source: &str, value: &str) -> ResolvedMetadata {
        ResolvedMetadata::named(ContentType::Game, name).with_external_id(source, value)
    }

    /// A textured grayscale PNG. Different seeds give visibly different
    /// images; the same seed always gives the same bytes.
    pub fn icon_png(seed: u32) -> Vec<u8> {
        let img = GrayImage::from_fn(64, 64, |x, y| {
            let (x, y) = (x + seed * 17, y + seed * 5);
            Luma([(((x * 7 + y * 13) ^ (x * y)) % 200) as u8])
        });
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(img)
            .write_to(&mut buf, ImageFormat::Png)
            .expect("encode fixture png");
        buf.into_inner()
    }
}
