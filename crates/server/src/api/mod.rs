pub mod error;
pub mod handlers;
pub mod library;
pub mod middleware;
pub mod routes;
pub mod scanners;
pub mod scrapers;
pub mod ws;

pub use routes::create_router;
