//! Runtime configuration
//!
//! Read once at startup from environment variables and injected through the
//! application state. The administrator allow-list is a configured set of
//! actor ids compared against the authenticated actor; there is no role
//! table.

use std::collections::HashSet;
use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Actor identities permitted to moderate and override ownership checks
    pub admin_ids: HashSet<String>,

    /// Textual prefix for issued code identifiers (e.g. "QV" -> "QV-001")
    pub code_prefix: String,
}

impl AppConfig {
    /// Loads configuration from the environment
    ///
    /// - `ADMIN_IDS` - comma-separated administrator actor ids
    /// - `CODE_PREFIX` - identifier prefix (default: "QV")
    pub fn from_env() -> Self {
        let admin_ids = env::var("ADMIN_IDS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        // Lookups compare uppercase, so issued identifiers must too
        let code_prefix = env::var("CODE_PREFIX")
            .unwrap_or_else(|_| "QV".to_string())
            .trim()
            .to_ascii_uppercase();

        AppConfig {
            admin_ids,
            code_prefix,
        }
    }

    pub fn is_admin(&self, actor: &str) -> bool {
        self.admin_ids.contains(actor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_from_env_is_uppercased() {
        env::set_var("CODE_PREFIX", " qv ");
        let config = AppConfig::from_env();
        env::remove_var("CODE_PREFIX");

        // Identifier lookups are uppercase-normalized, so a lowercase
        // configured prefix would issue unreachable codes
        assert_eq!(config.code_prefix, "QV");
    }
}
