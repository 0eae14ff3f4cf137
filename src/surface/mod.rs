pub mod handlers;

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;

use crate::AppState;

/// Request surface (C8): a single notification, a bulk batch, a streaming
/// NDJSON variant, health, status lookup, and preference updates. Realised
/// over axum HTTP rather than a gRPC service, since neither the teacher
/// repo nor the rest of the retrieval pack depends on tonic.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/notifications", post(handlers::send_notification))
        .route("/notifications/bulk", post(handlers::send_bulk))
        .route("/notifications/stream", post(handlers::send_stream))
        .route("/notifications/:id", get(handlers::get_status))
        .route("/notifications/:id/retry", post(handlers::retry))
        .route("/users/:user_id/preferences", put(handlers::update_preference))
        .route("/users/:user_id/device-tokens", post(handlers::register_device_token))
        .route("/metrics", get(handlers::metrics))
        .route("/events/ingest", post(handlers::ingest_event))
}
