use axum::{Router, routing::get};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// Liveness probe. The gateway holds no backing store, so this never degrades.
pub async fn health_check() -> &'static str {
    "ok"
}
