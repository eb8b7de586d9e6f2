//! Error responses shared by the API handlers.

use axum::{http::StatusCode, Json};
use serde::Serialize;
use trove_core::library::LibraryError;
use trove_core::scanner::ScanError;
use trove_core::scraper::{ProfileError, RegistryError, ResolverError};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn error_response(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

pub fn bad_request(message: impl Into<String>) -> ApiError {
    error_response(StatusCode::BAD_REQUEST, message)
}

pub fn not_found(message: impl Into<String>) -> ApiError {
    error_response(StatusCode::NOT_FOUND, message)
}

pub fn from_resolver_error(e: ResolverError) -> ApiError {
    let status = match &e {
        ResolverError::ProfileNotFound(_) | ResolverError::ProviderNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        ResolverError::WrongMediaType { .. } | ResolverError::InvalidSlot(_) => {
            StatusCode::BAD_REQUEST
        }
        ResolverError::Registry(RegistryError::NotFound(_)) => StatusCode::NOT_FOUND,
        ResolverError::Profile(ProfileError::NotFound(_)) => StatusCode::NOT_FOUND,
        ResolverError::Registry(_) | ResolverError::Profile(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        ResolverError::Provider(_) => StatusCode::BAD_GATEWAY,
    };
    error_response(status, e.to_string())
}

pub fn from_library_error(e: LibraryError) -> ApiError {
    let status = match &e {
        LibraryError::NotFound { .. } => StatusCode::NOT_FOUND,
        LibraryError::ContentTypeMismatch { .. } | LibraryError::InvalidInput(_) => {
            StatusCode::BAD_REQUEST
        }
        LibraryError::ExternalIdConflict { .. } => StatusCode::CONFLICT,
        LibraryError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, e.to_string())
}

pub fn from_scan_error(e: ScanError) -> ApiError {
    let status = match &e {
        ScanError::ScannerNotFound(_) => StatusCode::NOT_FOUND,
        ScanError::InvalidDefinition(_) | ScanError::Extract(_) | ScanError::RootNotFound(_) => {
            StatusCode::BAD_REQUEST
        }
        ScanError::QueueClosed => StatusCode::SERVICE_UNAVAILABLE,
        ScanError::Resolver(_)
        | ScanError::Library(_)
        | ScanError::Phash(_)
        | ScanError::Io { .. }
        | ScanError::NoMatch(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scanner_not_found_maps_to_404() {
        let (status, body) = from_scan_error(ScanError::ScannerNotFound("x".to_string()));
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.error.contains("x"));
    }

    #[test]
    fn test_queue_closed_maps_to_503() {
        let (status, _) = from_scan_error(ScanError::QueueClosed);
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_nameless_add_maps_to_400() {
        let (status, _) =
            from_library_error(LibraryError::InvalidInput("name is empty".to_string()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
