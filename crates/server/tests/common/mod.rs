//! Common test utilities for API testing with mocks.
//!
//! Builds an in-process router over file-backed stores in a temp directory,
//! a mock metadata provider and a mock image fetcher, so the whole
//! scan -> resolve -> add flow runs without network access.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use trove_core::config::DatabaseConfig;
use trove_core::library::{AssetDownloader, FsAttachmentStore};
use trove_core::phash::PhashMatcher;
use trove_core::scanner::{ScanContext, ScannerRegistry};
use trove_core::scraper::{
    ContentType, MergeStrategy, ScraperProfile, SlotData, SqliteProfileStore, Slot, TagRef,
};
use trove_core::testing::{MockFetcher, MockProvider};
use trove_core::{
    Adder, Config, EventBus, ScannerDefinition, ScannerService, Scrapers,
    SqliteLibrary,
};
use trove_server::state::AppState;

/// Re-export fixtures for test convenience
pub use trove_core::testing::fixtures;

pub const PROVIDER_ID: &str = "mockdb";
pub const PROFILE_ID: &str = "default";
pub const SCANNER_ID: &str = "games";
pub const COVER_URL: &str = "https://img.test/clannad-cover.png";

/// In-process server with controllable collaborators.
pub struct TestFixture {
    pub router: Router,
    pub scanner: Arc<ScannerService>,
    pub fetcher: Arc<MockFetcher>,
    pub events: EventBus,
    /// Root directory the `games` scanner walks
    pub games_dir: PathBuf,
    pub attachments_dir: PathBuf,
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// The mock provider every fixture registers unless told otherwise.
pub fn default_provider() -> MockProvider {
    let mut clannad = fixtures::search_hit("v4", "Clannad");
    clannad.release_date = Some("2004-04-28".to_string());

    MockProvider::new(PROVIDER_ID, ContentType::Game)
        .with_hits_for("Clannad", vec![clannad])
        .with_hits_for("Kanon", vec![fixtures::search_hit("v13", "Kanon")])
        .with_slot_data(Slot::Tags, SlotData::Tags(vec![TagRef::new("Drama")]))
        .with_slot_data(Slot::Covers, SlotData::Images(vec![COVER_URL.to_string()]))
}

pub fn default_profile() -> ScraperProfile {
    ScraperProfile::new(PROFILE_ID, "Default", ContentType::Game, PROVIDER_ID)
        .with_slot(Slot::Tags, &[PROVIDER_ID], MergeStrategy::Merge)
        .with_slot(Slot::Covers, &[PROVIDER_ID], MergeStrategy::First)
}

impl TestFixture {
    pub async fn new() -> Self {
        Self::with_provider(default_provider()).await
    }

    pub async fn with_provider(provider: MockProvider) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");
        let games_dir = temp_dir.path().join("games");
        let attachments_dir = temp_dir.path().join("attachments");
        fs::create_dir_all(&games_dir).expect("Failed to create games dir");

        let config = Config {
            database: DatabaseConfig {
                path: db_path.clone(),
            },
            ..Default::default()
        };

        let library = Arc::new(SqliteLibrary::new(&db_path).expect("Failed to open library"));
        let profiles =
            Arc::new(SqliteProfileStore::new(&db_path).expect("Failed to open profile store"));
        let scrapers = Arc::new(Scrapers::new(profiles));
        scrapers
            .register(Arc::new(provider))
            .await
            .expect("Failed to register provider");
        scrapers
            .seed_profile(&default_profile())
            .expect("Failed to seed profile");

        let events = EventBus::new(1024);
        let fetcher = Arc::new(MockFetcher::new());
        fetcher
            .set_response(COVER_URL, fixtures::icon_png(1))
            .await;
        let attachments = Arc::new(FsAttachmentStore::new(&attachments_dir));
        let adder = Arc::new(
            Adder::new(Arc::clone(&library), events.clone())
                .with_assets(AssetDownloader::new(fetcher.clone(), attachments)),
        );

        let registry = Arc::new(
            ScannerRegistry::from_definitions(&[ScannerDefinition::new(
                SCANNER_ID,
                &games_dir,
                PROFILE_ID,
            )])
            .await
            .expect("Failed to build scanner registry"),
        );
        let scanner = Arc::new(ScannerService::new(
            ScanContext {
                registry,
                scrapers: Arc::clone(&scrapers),
                adder: Arc::clone(&adder),
                matcher: Arc::new(PhashMatcher::new(library)),
                events: events.clone(),
                phash: config.phash.clone(),
            },
            16,
        ));
        scanner.start();

        let state = Arc::new(AppState::new(
            config,
            "test-config-hash".to_string(),
            scrapers,
            adder,
            Arc::clone(&scanner),
            events.clone(),
        ));
        let router = trove_server::api::create_router(state);

        Self {
            router,
            scanner,
            fetcher,
            events,
            games_dir,
            attachments_dir,
            temp_dir,
        }
    }

    /// Create a directory under the scanned root.
    pub fn mkdir(&self, name: &str) -> PathBuf {
        let path = self.games_dir.join(name);
        fs::create_dir_all(&path).expect("Failed to create game dir");
        path
    }

    pub fn attachment(&self, table: &str, row_id: &str, field: &str) -> PathBuf {
        self.attachments_dir.join(table).join(row_id).join(field)
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a PUT request with JSON body.
    pub async fn put(&self, path: &str, body: Value) -> TestResponse {
        self.request("PUT", path, Some(body)).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a GET request and return the raw body text.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
