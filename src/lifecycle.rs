//! Ad Lifecycle Manager
//!
//! Create, update, moderate and terminate ad records, enforcing the flat
//! owner-or-admin authorization rule. All code-binding side effects are
//! delegated to the coordinator module; this module only decides *when*
//! binding work happens and whether its failure is fatal.
//!
//! Failure policy:
//! - create + bind: the ad is the primary value; a bind failure is logged
//!   and reported as a warning, never fails the creation.
//! - delete/close + unbind: the unbind is mandatory and runs first; its
//!   failure aborts the ad mutation entirely.

use chrono::{Duration, Utc};
use rand::{distr::Alphanumeric, Rng};
use redb::{Database, ReadableDatabase, ReadableTable};

use crate::config::AppConfig;
use crate::coordinator;
use crate::database::TABLE_ADS;
use crate::error::AppError;
use crate::model::{slugify, Ad, AdStatus, CreateAdRequest, UpdateAdRequest};

/// Days added to the validity window at creation and per extension
const VALIDITY_DAYS: i64 = 30;

/// Outcome of an ad creation, including the best-effort binding result
pub struct CreateOutcome {
    pub ad: Ad,
    pub code_linked: bool,
    pub warning: Option<String>,
}

/// Actor must own the ad or belong to the configured admin set
fn authorize(config: &AppConfig, actor: &str, ad: &Ad) -> Result<(), AppError> {
    if actor == ad.owner_id || config.is_admin(actor) {
        Ok(())
    } else {
        Err(AppError::Unauthorized)
    }
}

fn require_admin(config: &AppConfig, actor: &str) -> Result<(), AppError> {
    if config.is_admin(actor) {
        Ok(())
    } else {
        Err(AppError::Unauthorized)
    }
}

/// Terminal ads accept no further mutation
fn require_mutable(ad: &Ad) -> Result<(), AppError> {
    if ad.status.is_terminal() {
        Err(AppError::Validation(format!(
            "ad {} is {:?} and can no longer be changed",
            ad.id, ad.status
        )))
    } else {
        Ok(())
    }
}

pub fn load_ad(db: &Database, ad_id: &str) -> Result<Ad, AppError> {
    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(TABLE_ADS)?;
    match table.get(ad_id)? {
        Some(guard) => Ok(serde_json::from_str::<Ad>(guard.value())?),
        None => Err(AppError::NotFound("ad")),
    }
}

fn store_ad(db: &Database, ad: &Ad) -> Result<(), AppError> {
    let ad_json = serde_json::to_string(ad)?;
    let write_txn = db.begin_write()?;
    {
        let mut table = write_txn.open_table(TABLE_ADS)?;
        table.insert(ad.id.as_str(), ad_json.as_str())?;
    }
    write_txn.commit()?;
    Ok(())
}

fn random_ad_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect()
}

/// Inserts a freshly created ad, regenerating its random id while it
/// collides with an existing row. The check and the insert share one write
/// transaction so another ad can never be overwritten.
fn insert_new_ad(db: &Database, ad: &mut Ad) -> Result<(), AppError> {
    let write_txn = db.begin_write()?;
    {
        let mut table = write_txn.open_table(TABLE_ADS)?;
        while table.get(ad.id.as_str())?.is_some() {
            ad.id = random_ad_id();
        }
        let ad_json = serde_json::to_string(&ad)?;
        table.insert(ad.id.as_str(), ad_json.as_str())?;
    }
    write_txn.commit()?;
    Ok(())
}

/// Creates a new ad in `pending_verification` and, when a code identifier
/// was scanned, binds it best-effort after the ad row is committed.
///
/// Validation (title, media) happens before any write. Price defaults to 0,
/// displayed as "price on request". The validity window opens now and runs
/// for 30 days.
pub fn create(db: &Database, owner: &str, payload: CreateAdRequest) -> Result<CreateOutcome, AppError> {
    let title = payload
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Validation("title is required".to_string()))?
        .to_string();

    let media_ref = payload
        .media_ref
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| AppError::Validation("media_ref is required".to_string()))?
        .to_string();

    let id = random_ad_id();

    let slug = payload
        .slug
        .filter(|s| !s.is_empty())
        .or_else(|| Some(slugify(&title)).filter(|s| !s.is_empty()));

    let now = Utc::now();
    let mut ad = Ad {
        id,
        owner_id: owner.to_string(),
        title,
        description: payload.description,
        features: payload.features,
        price: payload.price.unwrap_or(0),
        media_ref,
        status: AdStatus::PendingVerification,
        slug,
        valid_from: Some(now),
        valid_until: Some(now + Duration::days(VALIDITY_DAYS)),
        created_at: now,
        updated_at: now,
    };

    // The ad row must be committed before binding is attempted, so a bind
    // failure can only ever leave an orphaned-but-valid ad
    insert_new_ad(db, &mut ad)?;

    let (code_linked, warning) = match payload.code.as_deref().map(str::trim) {
        Some(code) if !code.is_empty() => match coordinator::bind(db, code, &ad.id) {
            Ok(()) => (true, None),
            Err(e) => {
                // Soft failure: the seller still gets their ad; an admin can
                // relink the code later
                tracing::warn!(ad = %ad.id, code, "code binding failed after create: {}", e);
                (
                    false,
                    Some(format!("ad created but code {} was not linked: {}", code, e)),
                )
            }
        },
        _ => (false, None),
    };

    Ok(CreateOutcome {
        ad,
        code_linked,
        warning,
    })
}

/// Updates mutable fields of an ad. Owner-or-admin. Media is replaced only
/// when a new reference is supplied; code binding is never touched.
pub fn update(
    db: &Database,
    config: &AppConfig,
    actor: &str,
    ad_id: &str,
    payload: UpdateAdRequest,
) -> Result<Ad, AppError> {
    let mut ad = load_ad(db, ad_id)?;
    authorize(config, actor, &ad)?;
    require_mutable(&ad)?;

    if let Some(title) = payload.title {
        let title = title.trim().to_string();
        if title.is_empty() {
            return Err(AppError::Validation("title cannot be empty".to_string()));
        }
        ad.title = title;
    }
    if let Some(description) = payload.description {
        ad.description = Some(description);
    }
    if let Some(price) = payload.price {
        ad.price = price;
    }
    if let Some(media_ref) = payload.media_ref.map(|m| m.trim().to_string()) {
        if !media_ref.is_empty() {
            ad.media_ref = media_ref;
        }
    }
    if let Some(features) = payload.features {
        ad.features = features;
    }
    if let Some(slug) = payload.slug {
        ad.slug = Some(slug).filter(|s| !s.is_empty());
    }
    ad.updated_at = Utc::now();

    store_ad(db, &ad)?;
    Ok(ad)
}

/// Moderates a pending ad to `aprobado`. Administrator-only.
pub fn approve(db: &Database, config: &AppConfig, actor: &str, ad_id: &str) -> Result<Ad, AppError> {
    require_admin(config, actor)?;

    let mut ad = load_ad(db, ad_id)?;
    if ad.status != AdStatus::PendingVerification {
        return Err(AppError::Validation(format!(
            "only pending ads can be approved, ad {} is {:?}",
            ad.id, ad.status
        )));
    }

    ad.status = AdStatus::Aprobado;
    ad.updated_at = Utc::now();
    store_ad(db, &ad)?;

    tracing::info!(ad = %ad.id, "ad approved");
    Ok(ad)
}

/// Pause/reactivate toggle between `aprobado` and `draft`. Owner-or-admin.
/// Does not affect code binding.
pub fn toggle_status(
    db: &Database,
    config: &AppConfig,
    actor: &str,
    ad_id: &str,
) -> Result<Ad, AppError> {
    let mut ad = load_ad(db, ad_id)?;
    authorize(config, actor, &ad)?;

    ad.status = match ad.status {
        AdStatus::Aprobado => AdStatus::Draft,
        AdStatus::Draft => AdStatus::Aprobado,
        other => {
            return Err(AppError::Validation(format!(
                "ad {} is {:?} and cannot be toggled",
                ad.id, other
            )))
        }
    };
    ad.updated_at = Utc::now();

    store_ad(db, &ad)?;
    Ok(ad)
}

/// Extends the validity window by 30 days, anchored to the later of "now"
/// and the current end date: a lapsed ad extends to 30 days from now, a
/// still-valid ad gains 30 days on top of its current end.
pub fn extend(db: &Database, config: &AppConfig, actor: &str, ad_id: &str) -> Result<Ad, AppError> {
    let mut ad = load_ad(db, ad_id)?;
    authorize(config, actor, &ad)?;
    require_mutable(&ad)?;

    let now = Utc::now();
    let anchor = match ad.valid_until {
        Some(end) => end.max(now),
        None => now,
    };
    ad.valid_until = Some(anchor + Duration::days(VALIDITY_DAYS));
    if ad.valid_from.is_none() {
        ad.valid_from = Some(now);
    }
    ad.updated_at = now;

    store_ad(db, &ad)?;
    Ok(ad)
}

/// Closes an ad and releases its codes. Owner-or-admin.
///
/// The release runs first and is mandatory: if it fails, the ad keeps its
/// current status and the error surfaces to the caller.
pub fn close_and_release(
    db: &Database,
    config: &AppConfig,
    actor: &str,
    ad_id: &str,
) -> Result<(Ad, usize), AppError> {
    let mut ad = load_ad(db, ad_id)?;
    authorize(config, actor, &ad)?;

    let released = coordinator::unbind_all(db, ad_id).map_err(|e| {
        AppError::BindingInconsistency(format!("could not release codes for ad {}: {}", ad_id, e))
    })?;

    ad.status = AdStatus::Closed;
    ad.updated_at = Utc::now();
    store_ad(db, &ad)?;

    Ok((ad, released))
}

/// Deletes an ad row. Owner-or-admin.
///
/// Ordering: (1) release every code referencing the ad, (2) only then remove
/// the row. A release failure aborts the delete; a code must never claim to
/// point at a row that no longer exists.
pub fn delete(
    db: &Database,
    config: &AppConfig,
    actor: &str,
    ad_id: &str,
) -> Result<usize, AppError> {
    let ad = load_ad(db, ad_id)?;
    authorize(config, actor, &ad)?;

    let released = coordinator::unbind_all(db, ad_id).map_err(|e| {
        AppError::BindingInconsistency(format!("could not release codes for ad {}: {}", ad_id, e))
    })?;

    let write_txn = db.begin_write()?;
    {
        let mut table = write_txn.open_table(TABLE_ADS)?;
        table.remove(ad_id)?;
    }
    write_txn.commit()?;

    tracing::info!(ad = %ad_id, released, "ad deleted");
    Ok(released)
}

/// Frees the codes bound to an ad without changing the ad itself.
/// Administrator convenience for lost or replaced stickers; idempotent.
pub fn unlink_qr(
    db: &Database,
    config: &AppConfig,
    actor: &str,
    ad_id: &str,
) -> Result<usize, AppError> {
    require_admin(config, actor)?;

    // The ad must exist; releasing codes for an arbitrary id would mask typos
    load_ad(db, ad_id)?;

    coordinator::unbind_all(db, ad_id)
}

/// Re-attempts binding a code to an existing ad. Administrator repair path
/// for create-time soft failures; idempotent when the pair is already bound.
pub fn relink_qr(
    db: &Database,
    config: &AppConfig,
    actor: &str,
    ad_id: &str,
    raw_code: &str,
) -> Result<(), AppError> {
    require_admin(config, actor)?;

    let ad = load_ad(db, ad_id)?;
    require_mutable(&ad)?;

    coordinator::bind(db, raw_code, ad_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::init_db;
    use crate::model::Features;
    use std::collections::BTreeMap;
    use tempfile::NamedTempFile;

    fn sample_ad(id: &str) -> Ad {
        let now = Utc::now();
        Ad {
            id: id.to_string(),
            owner_id: "user1".to_string(),
            title: "Bicicleta de montaña".to_string(),
            description: None,
            features: Features::Vehicle {
                brand: None,
                model: None,
                year: None,
                mileage_km: None,
                fuel: None,
                transmission: None,
                extra: BTreeMap::new(),
            },
            price: 0,
            media_ref: "media/bike.jpg".to_string(),
            status: AdStatus::PendingVerification,
            slug: None,
            valid_from: Some(now),
            valid_until: Some(now + Duration::days(VALIDITY_DAYS)),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn insert_regenerates_colliding_id() {
        let temp = NamedTempFile::new().unwrap();
        let db = init_db(temp.path().to_str().unwrap()).unwrap();

        let mut first = sample_ad("abcd1234");
        insert_new_ad(&db, &mut first).unwrap();
        assert_eq!(first.id, "abcd1234");

        // A second ad arriving with the same candidate id must not clobber
        // the stored row
        let mut second = sample_ad("abcd1234");
        second.owner_id = "user2".to_string();
        insert_new_ad(&db, &mut second).unwrap();
        assert_ne!(second.id, "abcd1234");

        let kept = load_ad(&db, "abcd1234").unwrap();
        assert_eq!(kept.owner_id, "user1");
        let added = load_ad(&db, &second.id).unwrap();
        assert_eq!(added.owner_id, "user2");
    }
}
