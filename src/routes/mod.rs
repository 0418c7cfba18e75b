//! Route modules for Academy Sync

pub mod health;
pub mod records;
pub mod sync;

use axum::{http::HeaderMap, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::records::OwnerId;
use crate::state::AppState;

/// Header carrying the authenticated coach id
pub const OWNER_HEADER: &str = "x-owner-id";

/// Build the application router
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/health", health::router())
        .nest("/api/v1/sync", sync::router())
        .nest("/api/v1/records", records::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Owner from the request headers, if any
pub(crate) fn owner_from(headers: &HeaderMap) -> Option<OwnerId> {
    headers
        .get(OWNER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(OwnerId::from)
}

pub(crate) fn require_owner(headers: &HeaderMap) -> Result<OwnerId, AppError> {
    owner_from(headers)
        .ok_or_else(|| AppError::Unauthorized(format!("missing {} header", OWNER_HEADER)))
}
