use std::time::Duration;

use axum::http::Method;
use tower_http::cors::{Any, CorsLayer};

/// Permissive CORS for browser-based MCP clients.
///
/// - Origins: any
/// - Methods: GET, POST, OPTIONS
/// - Headers: any (credential headers included)
/// - Max age: 3600s
pub fn build_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(Duration::from_secs(3600))
}
