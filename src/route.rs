//! Route definitions
//!
//! This module configures all HTTP routes and maps them to their handlers.
//! The scan-resolution endpoint is public; everything under /api requires an
//! authenticated actor.

use axum::routing::{get, post, put};
use axum::Router;

use crate::database::AppState;
use crate::handler::{
    ad_chat_context, approve_ad, close_ad, create_ad, delete_ad, extend_ad, issue_code_batch,
    lookup_code, next_code_sequence, relink_code, resolve_code, toggle_ad_status, unlink_code,
    update_ad,
};

use crate::middleware::actor_middleware;
use axum::middleware;

/// Creates and configures the application router
///
/// # Route Definitions
///
/// - `GET /{code}` - public scan resolution (redirect decision)
/// - `POST /api/codes/batch` - issue a sequential code batch (admin)
/// - `GET /api/codes/next-sequence` - batch numbering continuity (admin)
/// - `GET /api/codes/{id}` - code record diagnostics (admin)
/// - `POST /api/ads` - create an ad, optionally binding a code
/// - `PUT /api/ads/{id}` - update mutable fields
/// - `DELETE /api/ads/{id}` - release codes, then delete
/// - `POST /api/ads/{id}/approve|toggle|extend|close` - lifecycle actions
/// - `POST /api/ads/{id}/unlink-code|relink-code` - admin binding repair
/// - `GET /api/ads/{id}/context` - flattened text for the chat collaborator
pub fn create_app(state: AppState) -> Router {
    // API routes; the middleware injects the actor identity or rejects
    let api_routes = Router::new()
        .route("/codes/batch", post(issue_code_batch))
        .route("/codes/next-sequence", get(next_code_sequence))
        .route("/codes/{id}", get(lookup_code))
        .route("/ads", post(create_ad))
        .route("/ads/{id}", put(update_ad).delete(delete_ad))
        .route("/ads/{id}/approve", post(approve_ad))
        .route("/ads/{id}/toggle", post(toggle_ad_status))
        .route("/ads/{id}/extend", post(extend_ad))
        .route("/ads/{id}/close", post(close_ad))
        .route("/ads/{id}/unlink-code", post(unlink_code))
        .route("/ads/{id}/relink-code", post(relink_code))
        .route("/ads/{id}/context", get(ad_chat_context))
        .layer(middleware::from_fn(actor_middleware));

    Router::new()
        // Public scan endpoint - resolves a sticker to its redirect target
        .route("/{code}", get(resolve_code))
        // Mount API routes under /api
        .nest("/api", api_routes)
        // Inject the application state into all handlers
        .with_state(state)
}
