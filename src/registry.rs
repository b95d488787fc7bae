//! Code Registry
//!
//! Owns the set of physical code identifiers: batch issuance, point lookups
//! and sequence continuity. Identifiers are `PREFIX-NNN` (zero-padded 3-digit
//! sequence) and are compared uppercase-normalized.

use chrono::Utc;
use redb::{Database, ReadableDatabase, ReadableTable};
use serde::Serialize;

use crate::database::TABLE_CODES;
use crate::error::AppError;
use crate::model::{Code, CodeCategory, CodeStatus};

/// Largest batch issued in one request
const MAX_BATCH: u32 = 500;

/// Normalizes a scanned or typed identifier for comparison
pub fn normalize(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Outcome of a batch issuance
#[derive(Serialize, Debug)]
pub struct BatchOutcome {
    /// Identifiers inserted by this request
    pub issued: Vec<String>,

    /// Identifiers that already existed and were left untouched
    pub skipped: Vec<String>,
}

/// Issues `count` sequential identifiers starting at `starting_sequence`
/// (or the next unused sequence when omitted), inserting them with status
/// `new` and no binding.
///
/// Duplicate-safe: an identifier that already exists is skipped, never an
/// error, and its record is preserved as-is. This supports re-running a
/// failed print job over a partially issued range.
pub fn issue_batch(
    db: &Database,
    prefix: &str,
    count: u32,
    starting_sequence: Option<u32>,
    category: Option<CodeCategory>,
) -> Result<BatchOutcome, AppError> {
    if count == 0 || count > MAX_BATCH {
        return Err(AppError::Validation(format!(
            "batch count must be between 1 and {}",
            MAX_BATCH
        )));
    }

    let start = match starting_sequence {
        Some(s) => s,
        None => peek_next_sequence(db, prefix)?,
    };

    // The whole range must fit in the sequence space; without this check an
    // admin-supplied start near u32::MAX wraps around to low identifiers
    if start.checked_add(count - 1).is_none() {
        return Err(AppError::Validation(format!(
            "starting sequence {} leaves no room for {} identifiers",
            start, count
        )));
    }

    let mut outcome = BatchOutcome {
        issued: Vec::new(),
        skipped: Vec::new(),
    };

    let write_txn = db.begin_write()?;
    {
        let mut table = write_txn.open_table(TABLE_CODES)?;
        for n in 0..count {
            let id = format!("{}-{:03}", prefix, start + n);

            // Insert-or-skip: a conflicting identifier keeps its record
            if table.get(id.as_str())?.is_some() {
                outcome.skipped.push(id);
                continue;
            }

            let code = Code {
                id: id.clone(),
                category,
                status: CodeStatus::New,
                bound_ad: None,
                created_at: Utc::now(),
            };
            let code_json = serde_json::to_string(&code)?;
            table.insert(id.as_str(), code_json.as_str())?;
            outcome.issued.push(id);
        }
    }
    write_txn.commit()?;

    tracing::info!(
        issued = outcome.issued.len(),
        skipped = outcome.skipped.len(),
        "issued code batch"
    );

    Ok(outcome)
}

/// Point lookup by identifier, uppercase-normalized
pub fn lookup(db: &Database, raw: &str) -> Result<Option<Code>, AppError> {
    let id = normalize(raw);

    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(TABLE_CODES)?;

    match table.get(id.as_str())? {
        Some(guard) => Ok(Some(serde_json::from_str::<Code>(guard.value())?)),
        None => Ok(None),
    }
}

/// Returns the next unused sequence number for the given prefix by
/// inspecting the highest-numbered issued identifier; 1 if none exist.
pub fn peek_next_sequence(db: &Database, prefix: &str) -> Result<u32, AppError> {
    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(TABLE_CODES)?;

    // Range query over "{prefix}-": '.' is the character after '-', so it
    // forms the exclusive upper bound for all keys carrying this prefix.
    let start_key = format!("{}-", prefix);
    let end_key = format!("{}.", prefix);

    let mut highest: u32 = 0;
    for entry in table.range(start_key.as_str()..end_key.as_str())? {
        let (key, _) = entry?;
        // Keys above 999 lose zero-padding, so compare numerically
        if let Some(seq) = key
            .value()
            .rsplit('-')
            .next()
            .and_then(|s| s.parse::<u32>().ok())
        {
            highest = highest.max(seq);
        }
    }

    Ok(highest.saturating_add(1))
}
