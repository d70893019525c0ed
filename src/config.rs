use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub database_url: String,
    pub max_append_retries: u32,
    pub store_timeout_secs: u64,
}

impl LedgerConfig {
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let database_url = env::var("LEDGER_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://ledger.db".to_string());

        let max_append_retries = env::var("LEDGER_MAX_APPEND_RETRIES")
            .unwrap_or_else(|_| "3".to_string())
            .parse()?;

        let store_timeout_secs = env::var("LEDGER_STORE_TIMEOUT_SECS")
            .unwrap_or_else(|_| "5".to_string())
            .parse()?;

        Ok(LedgerConfig {
            database_url,
            max_append_retries,
            store_timeout_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LedgerConfig::load().unwrap();
        assert!(config.database_url.starts_with("sqlite:"));
        assert_eq!(config.max_append_retries, 3);
        assert_eq!(config.store_timeout_secs, 5);
    }
}
