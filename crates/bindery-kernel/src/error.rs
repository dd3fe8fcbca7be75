use bindery_store::StoreError;
use thiserror::Error;

use crate::collections::KeyError;

pub type KernelResult<T> = Result<T, KernelError>;

#[derive(Debug, Error)]
pub enum KernelError {
    #[error("no active transaction")]
    NoActiveTransaction,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{0}")]
    TransactionConflict(String),
    #[error("{0}")]
    TransactionTimeout(String),
    #[error("application '{app}': service '{service}' failed to configure: {source}")]
    ServiceConfiguration {
        app: String,
        service: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to schedule task '{task}': {reason}")]
    SchedulingFailure { task: String, reason: String },
    #[error("application '{app}' startup failed: {source}")]
    AppStartup {
        app: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    #[error("store error: {0}")]
    Store(StoreError),
}

impl KernelError {
    /// Whether the failed unit of work may succeed if re-run in a new
    /// transaction. Looks through service and startup failures so a conflict
    /// raised inside user code is still retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            KernelError::TransactionConflict(_) | KernelError::TransactionTimeout(_) => true,
            KernelError::ServiceConfiguration { source, .. }
            | KernelError::AppStartup { source, .. } => retryable_cause(source),
            _ => false,
        }
    }
}

fn retryable_cause(err: &anyhow::Error) -> bool {
    if let Some(kernel) = err.downcast_ref::<KernelError>() {
        return kernel.is_retryable();
    }
    err.downcast_ref::<StoreError>()
        .is_some_and(StoreError::is_retryable)
}

impl From<StoreError> for KernelError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NoActiveTransaction => KernelError::NoActiveTransaction,
            err @ StoreError::Conflict { .. } => KernelError::TransactionConflict(err.to_string()),
            err @ StoreError::Timeout { .. } => KernelError::TransactionTimeout(err.to_string()),
            other => KernelError::Store(other),
        }
    }
}
