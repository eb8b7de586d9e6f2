use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::{handlers, library, middleware::metrics_middleware, scanners, scrapers, ws};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // System
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/metrics", get(handlers::get_metrics))
        .route("/ws", get(ws::ws_handler))
        // Scanners
        .route("/scanners", get(scanners::list_scanners))
        .route("/scanners/scan-all", post(scanners::scan_all))
        .route("/scanners/test-rules", post(scanners::test_rules))
        .route(
            "/scanners/{id}",
            get(scanners::get_scanner)
                .put(scanners::upsert_scanner)
                .delete(scanners::delete_scanner),
        )
        .route("/scanners/{id}/scan", post(scanners::scan_scanner))
        .route(
            "/scanners/{id}/schedule",
            post(scanners::schedule_scanner).delete(scanners::unschedule_scanner),
        )
        .route("/scans/active", get(scanners::active_scans))
        // Scrapers
        .route(
            "/scrapers/{content_type}/providers",
            get(scrapers::list_providers),
        )
        .route(
            "/scrapers/{content_type}/providers/{provider_id}",
            axum::routing::delete(scrapers::unregister_provider),
        )
        .route(
            "/scrapers/{content_type}/providers/{provider_id}/images",
            post(scrapers::provider_images),
        )
        .route(
            "/scrapers/{content_type}/profiles",
            get(scrapers::list_profiles),
        )
        .route(
            "/scrapers/{content_type}/profiles/{id}/search",
            post(scrapers::search),
        )
        .route(
            "/scrapers/{content_type}/profiles/{id}/metadata",
            post(scrapers::get_metadata),
        )
        .route(
            "/scrapers/{content_type}/profiles/{id}/validate",
            post(scrapers::validate_profile),
        )
        // Library
        .route("/library/stats", get(library::get_stats))
        .route("/library/{content_type}", post(library::add_entity))
        .route("/library/{content_type}/{id}", get(library::get_entity))
        .route(
            "/library/{content_type}/{id}/external-ids",
            axum::routing::put(library::set_external_id),
        )
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
