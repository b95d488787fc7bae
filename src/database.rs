//! Database initialization and table definitions
//!
//! This module handles the setup of the embedded redb database and defines
//! the two tables the core operates on. Records are stored as JSON strings;
//! the coordinator module owns the protocol that keeps the two tables in
//! agreement.

use redb::{Database, TableDefinition};
use std::sync::Arc;

use crate::config::AppConfig;

/// Table for physical code records
///
/// Key: uppercase code identifier (e.g. "QV-001")
/// Value: JSON-serialized Code
///
/// Example:
/// - Key: "QV-001"
/// - Value: '{"id":"QV-001","status":"new","bound_ad":null,...}'
pub const TABLE_CODES: TableDefinition<&str, &str> = TableDefinition::new("codes_v1");

/// Table for ad records
///
/// Key: ad id (random alphanumeric)
/// Value: JSON-serialized Ad
pub const TABLE_ADS: TableDefinition<&str, &str> = TableDefinition::new("ads_v1");

/// Application state shared across all request handlers
///
/// Wraps the database and the startup configuration in Arcs for cheap
/// cloning into async handlers.
#[derive(Clone)]
pub struct AppState {
    /// Thread-safe reference to the embedded database
    pub db: Arc<Database>,

    /// Injected runtime configuration (admin allow-list, code prefix)
    pub config: Arc<AppConfig>,
}

/// Initializes the embedded database and creates required tables
///
/// Opens (or creates) the database file at the specified path, opens both
/// tables so later read transactions never hit a missing table, and commits.
///
/// # Arguments
///
/// * `db_path` - File path where the database should be stored (e.g. "data.db")
///
/// # Example
///
/// ```no_run
/// # use qventa::database::init_db;
/// let db = init_db("data.db").expect("Failed to initialize database");
/// ```
pub fn init_db(db_path: &str) -> Result<Database, redb::Error> {
    let db = Database::create(db_path)?;

    let write_txn = db.begin_write()?;
    {
        write_txn.open_table(TABLE_CODES)?;
        write_txn.open_table(TABLE_ADS)?;
    }
    write_txn.commit()?;

    Ok(db)
}
