use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Migration executor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationsConfig {
    /// Table holding the applied-units ledger.
    #[serde(default = "default_ledger_table")]
    pub ledger_table: String,

    /// Directory scanned for file-based units.
    #[serde(default = "default_directory")]
    pub directory: String,

    /// How long to wait for the migration lock. Zero fails fast.
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_secs: u64,

    /// Delay between lock attempts while waiting.
    #[serde(default = "default_lock_poll_interval")]
    pub lock_poll_interval_ms: u64,
}

impl MigrationsConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    pub fn lock_poll_interval(&self) -> Duration {
        Duration::from_millis(self.lock_poll_interval_ms.max(1))
    }
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            ledger_table: default_ledger_table(),
            directory: default_directory(),
            lock_timeout_secs: default_lock_timeout(),
            lock_poll_interval_ms: default_lock_poll_interval(),
        }
    }
}

fn default_ledger_table() -> String {
    "tenantry_migrations".to_string()
}

fn default_directory() -> String {
    "migrations".to_string()
}

fn default_lock_timeout() -> u64 {
    30
}

fn default_lock_poll_interval() -> u64 {
    250
}
