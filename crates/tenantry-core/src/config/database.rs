use serde::{Deserialize, Serialize};

use crate::error::{Result, TenantryError};

/// The migration lock pins one connection for the whole run; ledger reads
/// and unit transactions need a second.
pub const MIN_POOL_SIZE: u32 = 2;

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,

    /// Connection pool size.
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Pool checkout timeout in seconds.
    #[serde(default = "default_pool_timeout")]
    pub pool_timeout_secs: u64,

    /// Statement timeout applied inside each migration transaction (0 disables it).
    #[serde(default)]
    pub statement_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            pool_size: default_pool_size(),
            pool_timeout_secs: default_pool_timeout(),
            statement_timeout_secs: 0,
        }
    }
}

impl DatabaseConfig {
    pub fn validate(&self) -> Result<()> {
        if self.pool_size < MIN_POOL_SIZE {
            return Err(TenantryError::Config(format!(
                "database.pool_size must be at least {}, got {}",
                MIN_POOL_SIZE, self.pool_size
            )));
        }
        Ok(())
    }
}

fn default_pool_size() -> u32 {
    5
}

fn default_pool_timeout() -> u64 {
    30
}
