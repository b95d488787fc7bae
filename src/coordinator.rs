//! Consistency Coordinator
//!
//! The only module that writes the code side of the code/ad relationship.
//! The store has no cross-table transactions, so multi-step operations rely
//! on ordering instead:
//!
//! - create path: the ad row is committed first, then `bind` runs. A bind
//!   failure leaves a valid ad and a still-free code; an administrator can
//!   re-attempt the bind later (relink). Never a dangling reference.
//! - delete/close path: `unbind_all` must succeed and commit *before* the ad
//!   row is mutated. A code claiming to point at a row that no longer exists
//!   would break resolution, which is the one inconsistency this protocol
//!   must never produce.

use redb::{Database, ReadableTable};

use crate::database::TABLE_CODES;
use crate::error::AppError;
use crate::model::{Code, CodeStatus};
use crate::registry;

/// Binds a code to an ad: status `active`, `bound_ad` set, in one committed
/// write.
///
/// Must run after the ad row exists. Rejected when the code is unknown,
/// already bound to a different ad (double-use guard), or carries an
/// unusable status. Re-binding the same pair is a no-op, which makes the
/// repair path idempotent.
pub fn bind(db: &Database, raw_code: &str, ad_id: &str) -> Result<(), AppError> {
    let code_id = registry::normalize(raw_code);

    let write_txn = db.begin_write()?;
    {
        let mut table = write_txn.open_table(TABLE_CODES)?;

        let mut code = match table.get(code_id.as_str())? {
            Some(guard) => serde_json::from_str::<Code>(guard.value())?,
            None => return Err(AppError::NotFound("code")),
        };

        match &code.status {
            CodeStatus::Active if code.bound_ad.as_deref() == Some(ad_id) => {
                // Already bound to this ad; nothing to write
                return Ok(());
            }
            CodeStatus::Active => {
                return Err(AppError::Validation(format!(
                    "code {} is already bound to another ad",
                    code_id
                )));
            }
            CodeStatus::Other(raw) => {
                return Err(AppError::Validation(format!(
                    "code {} is not usable (status: {})",
                    code_id, raw
                )));
            }
            CodeStatus::New | CodeStatus::Printed => {}
        }

        code.status = CodeStatus::Active;
        code.bound_ad = Some(ad_id.to_string());
        let code_json = serde_json::to_string(&code)?;
        table.insert(code_id.as_str(), code_json.as_str())?;
    }
    write_txn.commit()?;

    tracing::info!(code = %code_id, ad = %ad_id, "bound code to ad");
    Ok(())
}

/// Releases *every* code currently bound to the given ad: status `printed`,
/// `bound_ad` cleared. Returns the number of codes released.
///
/// Over-inclusive on purpose: matching by ad reference rather than by a
/// remembered single code id self-heals any earlier state that left multiple
/// codes pointing at one ad. Idempotent; a second call releases nothing.
///
/// A code record that cannot be read aborts the scan with a storage error:
/// the unreadable row might reference this ad, so the caller must not
/// proceed with the dependent ad mutation.
pub fn unbind_all(db: &Database, ad_id: &str) -> Result<usize, AppError> {
    let write_txn = db.begin_write()?;
    let released;
    {
        let mut table = write_txn.open_table(TABLE_CODES)?;

        let mut bound: Vec<(String, Code)> = Vec::new();
        for entry in table.iter()? {
            let (key, value) = entry?;
            let code = serde_json::from_str::<Code>(value.value())?;
            if code.bound_ad.as_deref() == Some(ad_id) {
                bound.push((key.value().to_string(), code));
            }
        }

        released = bound.len();
        for (key, mut code) in bound {
            code.status = CodeStatus::Printed;
            code.bound_ad = None;
            let code_json = serde_json::to_string(&code)?;
            table.insert(key.as_str(), code_json.as_str())?;
        }
    }
    write_txn.commit()?;

    if released > 0 {
        tracing::info!(ad = %ad_id, released, "released codes bound to ad");
    }
    Ok(released)
}
