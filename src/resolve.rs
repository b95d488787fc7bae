//! Code Resolution Gateway
//!
//! Given a scanned identifier, decides a single redirect target. Pure apart
//! from the two reads it performs (code record, then bound ad record).
//!
//! Decision table, evaluated in this precedence order:
//!
//! | Code status  | Bound ad            | Decision                          |
//! |--------------|---------------------|-----------------------------------|
//! | not found    | -                   | invalid code                      |
//! | new/printed  | - (none)            | ad-creation flow + category hint  |
//! | active       | aprobado            | ad detail (slug, falling back id) |
//! | active       | missing/not visible | home fallback                     |
//! | anything else| -                   | unusable, raw status surfaced     |
//!
//! A stale binding (ad deleted outside the normal flow) must never dead-end
//! the scanner: it degrades to home rather than erroring.

use redb::{Database, ReadableDatabase};

use crate::database::TABLE_ADS;
use crate::error::AppError;
use crate::model::{Ad, AdStatus, CodeCategory, CodeStatus};
use crate::registry;

/// Redirect decision for one scanned identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Free code: route to the ad-creation flow carrying the identifier
    /// and, when the sticker batch had one, a category hint
    CreateAd {
        code: String,
        hint: Option<&'static str>,
    },

    /// Bound, published ad: route to its detail view
    AdDetail { target: String },

    /// Bound ad is missing or not publicly visible: degrade to home
    Home,

    /// Identifier not present in the registry
    Invalid,

    /// Code record carries a status this version does not route
    Unusable { raw_status: String },
}

/// Category hint carried on the ad-creation redirect
pub fn form_hint(category: CodeCategory) -> Option<&'static str> {
    match category {
        CodeCategory::Vehicle => Some("vehiculo"),
        CodeCategory::PropertySale => Some("inmueble-venta"),
        CodeCategory::PropertyRent => Some("inmueble-alquiler"),
        CodeCategory::Generic => None,
    }
}

/// Resolves a scanned identifier to a redirect decision
pub fn resolve_scan(db: &Database, raw: &str) -> Result<Resolution, AppError> {
    let code = match registry::lookup(db, raw)? {
        Some(code) => code,
        None => return Ok(Resolution::Invalid),
    };

    match code.status {
        // Active takes priority: review the bound ad's visibility before
        // falling back
        CodeStatus::Active => {
            let ad = match code.bound_ad.as_deref() {
                Some(ad_id) => load_ad(db, ad_id)?,
                None => None,
            };
            match ad {
                Some(ad) if ad.status == AdStatus::Aprobado => Ok(Resolution::AdDetail {
                    target: ad.slug.clone().unwrap_or(ad.id),
                }),
                // Draft, pending, closed, deleted, or a stale binding
                _ => Ok(Resolution::Home),
            }
        }
        CodeStatus::New | CodeStatus::Printed => Ok(Resolution::CreateAd {
            code: code.id,
            hint: code.category.and_then(form_hint),
        }),
        CodeStatus::Other(raw_status) => Ok(Resolution::Unusable { raw_status }),
    }
}

fn load_ad(db: &Database, ad_id: &str) -> Result<Option<Ad>, AppError> {
    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(TABLE_ADS)?;
    match table.get(ad_id)? {
        Some(guard) => Ok(Some(serde_json::from_str::<Ad>(guard.value())?)),
        None => Ok(None),
    }
}
