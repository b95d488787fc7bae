use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Authenticated actor identity, injected into request extensions
///
/// The session layer in front of this service resolves cookies/credentials
/// to an identity and forwards it in the `X-Actor-Id` header; the core
/// treats it as an opaque comparable id.
#[derive(Clone, Debug)]
pub struct Actor(pub String);

/// Middleware guarding the mutating API surface
///
/// Rejects requests carrying no actor identity with 401 before any handler
/// runs. Whether the actor is *allowed* to touch a given ad (owner or
/// configured administrator) is decided per operation in the lifecycle
/// module.
pub async fn actor_middleware(
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, Response> {
    let actor = headers
        .get("x-actor-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty());

    match actor {
        Some(actor) => {
            request.extensions_mut().insert(Actor(actor.to_string()));
            Ok(next.run(request).await)
        }
        None => Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": "invalid credentials",
                "code": "unauthenticated"
            })),
        )
            .into_response()),
    }
}
