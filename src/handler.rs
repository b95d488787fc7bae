//! HTTP request handlers
//!
//! Thin mapping between the HTTP surface and the core modules:
//! - `GET /{code}` - public scan resolution, the redirect surface
//! - `/api/codes/*` - registry administration (batch issuance, diagnostics)
//! - `/api/ads/*` - ad lifecycle operations
//!
//! Handlers validate nothing themselves; they pass the authenticated actor
//! and payload down and translate results and `AppError`s into responses.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Extension, Json,
};
use serde_json::json;

use crate::database::AppState;
use crate::error::AppError;
use crate::middleware::Actor;
use crate::model::{CreateAdRequest, IssueBatchRequest, RelinkRequest, UpdateAdRequest};
use crate::resolve::{self, Resolution};
use crate::{lifecycle, registry};

/// Resolves a scanned code to its redirect target
///
/// This is the only public endpoint. The decision table lives in the
/// resolve module; this handler just maps decisions to URLs:
///
/// - free code -> `/publicar?code={id}[&hint={hint}]`
/// - published bound ad -> `/anuncio/{slug-or-id}`
/// - non-visible bound ad -> `/` (home fallback, never a dead end)
/// - unknown identifier -> 404
/// - unroutable stored status -> 409, raw status surfaced for diagnostics
pub async fn resolve_code(
    Path(code): Path<String>,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    match resolve::resolve_scan(&state.db, &code)? {
        Resolution::CreateAd { code, hint } => {
            let url = match hint {
                Some(hint) => format!("/publicar?code={}&hint={}", code, hint),
                None => format!("/publicar?code={}", code),
            };
            Ok(Redirect::temporary(&url).into_response())
        }
        Resolution::AdDetail { target } => {
            Ok(Redirect::temporary(&format!("/anuncio/{}", target)).into_response())
        }
        Resolution::Home => Ok(Redirect::temporary("/").into_response()),
        Resolution::Invalid => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": "invalid code",
                "code": "not_found"
            })),
        )
            .into_response()),
        Resolution::Unusable { raw_status } => Ok((
            StatusCode::CONFLICT,
            Json(json!({
                "error": format!("code is not usable (status: {})", raw_status),
                "code": "unusable_code"
            })),
        )
            .into_response()),
    }
}

/// Issues a batch of sequential code identifiers (admin)
///
/// Duplicates within the requested range are skipped, not errored, so a
/// failed print job can be re-run safely.
pub async fn issue_code_batch(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(payload): Json<IssueBatchRequest>,
) -> Result<Response, AppError> {
    if !state.config.is_admin(&actor.0) {
        return Err(AppError::Unauthorized);
    }

    let outcome = registry::issue_batch(
        &state.db,
        &state.config.code_prefix,
        payload.count,
        payload.starting_sequence,
        payload.category,
    )?;

    Ok((StatusCode::CREATED, Json(outcome)).into_response())
}

/// Returns the next unused sequence number for batch numbering continuity
/// (admin)
pub async fn next_code_sequence(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Response, AppError> {
    if !state.config.is_admin(&actor.0) {
        return Err(AppError::Unauthorized);
    }

    let next = registry::peek_next_sequence(&state.db, &state.config.code_prefix)?;
    Ok(Json(json!({ "next_sequence": next })).into_response())
}

/// Point lookup of a code record (admin diagnostics)
pub async fn lookup_code(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Response, AppError> {
    if !state.config.is_admin(&actor.0) {
        return Err(AppError::Unauthorized);
    }

    match registry::lookup(&state.db, &id)? {
        Some(code) => Ok(Json(code).into_response()),
        None => Err(AppError::NotFound("code")),
    }
}

/// Creates a new ad, optionally binding a scanned code
///
/// Binding is best-effort: a failure is reported in the 201 body as
/// `code_linked: false` plus a warning, never as a failed creation.
pub async fn create_ad(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(payload): Json<CreateAdRequest>,
) -> Result<Response, AppError> {
    let outcome = lifecycle::create(&state.db, &actor.0, payload)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": outcome.ad.id,
            "status": outcome.ad.status,
            "slug": outcome.ad.slug,
            "valid_until": outcome.ad.valid_until,
            "code_linked": outcome.code_linked,
            "warning": outcome.warning,
        })),
    )
        .into_response())
}

/// Updates mutable fields of an ad (owner or admin)
pub async fn update_ad(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(payload): Json<UpdateAdRequest>,
) -> Result<Response, AppError> {
    let ad = lifecycle::update(&state.db, &state.config, &actor.0, &id, payload)?;
    Ok(Json(json!({ "id": ad.id, "status": ad.status, "updated_at": ad.updated_at })).into_response())
}

/// Moderates a pending ad to `aprobado` (admin)
pub async fn approve_ad(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Response, AppError> {
    let ad = lifecycle::approve(&state.db, &state.config, &actor.0, &id)?;
    Ok(Json(json!({ "id": ad.id, "status": ad.status })).into_response())
}

/// Pause/reactivate toggle between `aprobado` and `draft` (owner or admin)
pub async fn toggle_ad_status(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Response, AppError> {
    let ad = lifecycle::toggle_status(&state.db, &state.config, &actor.0, &id)?;
    Ok(Json(json!({ "id": ad.id, "status": ad.status })).into_response())
}

/// Extends the validity window by 30 days, anchored to max(now, current end)
pub async fn extend_ad(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Response, AppError> {
    let ad = lifecycle::extend(&state.db, &state.config, &actor.0, &id)?;
    Ok(Json(json!({ "id": ad.id, "valid_until": ad.valid_until })).into_response())
}

/// Closes an ad and releases its codes (owner or admin)
pub async fn close_ad(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Response, AppError> {
    let (ad, released) = lifecycle::close_and_release(&state.db, &state.config, &actor.0, &id)?;
    Ok(Json(json!({
        "id": ad.id,
        "status": ad.status,
        "codes_released": released
    }))
    .into_response())
}

/// Deletes an ad after releasing every code referencing it (owner or admin)
pub async fn delete_ad(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Response, AppError> {
    let released = lifecycle::delete(&state.db, &state.config, &actor.0, &id)?;
    Ok(Json(json!({
        "deleted_id": id,
        "codes_released": released
    }))
    .into_response())
}

/// Frees the codes bound to an ad without touching the ad (admin)
pub async fn unlink_code(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Response, AppError> {
    let released = lifecycle::unlink_qr(&state.db, &state.config, &actor.0, &id)?;
    Ok(Json(json!({ "id": id, "codes_released": released })).into_response())
}

/// Re-attempts binding a code to an existing ad (admin repair path)
pub async fn relink_code(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(payload): Json<RelinkRequest>,
) -> Result<Response, AppError> {
    lifecycle::relink_qr(&state.db, &state.config, &actor.0, &id, &payload.code)?;
    Ok(Json(json!({ "id": id, "code": registry::normalize(&payload.code), "linked": true }))
        .into_response())
}

/// Flattened textual context for the external text-completion service
pub async fn ad_chat_context(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Extension(_actor): Extension<Actor>,
) -> Result<Response, AppError> {
    let ad = lifecycle::load_ad(&state.db, &id)?;
    Ok(ad.chat_context().into_response())
}
