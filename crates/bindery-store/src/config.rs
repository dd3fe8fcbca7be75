use std::time::Duration;

/// Environment variable overriding [`StoreConfig::txn_timeout`], in milliseconds.
pub const TXN_TIMEOUT_ENV: &str = "BINDERY_TXN_TIMEOUT_MS";

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Upper bound on a transaction's lifetime. Operations issued after the
    /// deadline abort the transaction.
    pub txn_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            txn_timeout: Duration::from_millis(1000),
        }
    }
}

impl StoreConfig {
    /// Build from environment, falling back to defaults for unset or malformed values.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(ms) = env_millis(TXN_TIMEOUT_ENV) {
            config.txn_timeout = Duration::from_millis(ms);
        }
        config
    }

    pub fn with_txn_timeout(mut self, timeout: Duration) -> Self {
        self.txn_timeout = timeout;
        self
    }
}

pub(crate) fn env_millis(var: &str) -> Option<u64> {
    let raw = std::env::var(var).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(ms) => Some(ms),
        Err(err) => {
            log::warn!("ignoring {var}={raw:?}: {err}");
            None
        }
    }
}
