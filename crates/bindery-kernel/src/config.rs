use std::str::FromStr;
use std::time::Duration;

use bindery_store::StoreConfig;

pub const TXN_TIMEOUT_ENV: &str = "BINDERY_TXN_TIMEOUT_MS";
pub const TASK_RETRIES_ENV: &str = "BINDERY_TASK_RETRIES";
pub const WORKERS_ENV: &str = "BINDERY_WORKERS";

#[derive(Debug, Clone)]
pub struct KernelConfig {
    /// Lifetime bound for every transaction the kernel starts.
    pub txn_timeout: Duration,
    /// How many times a unit of work is re-run after a conflict or timeout.
    pub max_task_retries: u32,
    /// Worker threads used to drain the task queue; 1 runs tasks inline.
    pub worker_threads: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            txn_timeout: StoreConfig::default().txn_timeout,
            max_task_retries: 5,
            worker_threads: 1,
        }
    }
}

impl KernelConfig {
    /// Build from environment, keeping defaults for unset or malformed values.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(ms) = env_parse::<u64>(TXN_TIMEOUT_ENV) {
            config.txn_timeout = Duration::from_millis(ms);
        }
        if let Some(retries) = env_parse(TASK_RETRIES_ENV) {
            config.max_task_retries = retries;
        }
        if let Some(workers) = env_parse::<usize>(WORKERS_ENV) {
            config.worker_threads = workers.max(1);
        }
        config
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::default().with_txn_timeout(self.txn_timeout)
    }
}

fn env_parse<T>(var: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(var).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(err) => {
            log::warn!("ignoring {var}={raw:?}: {err}");
            None
        }
    }
}
