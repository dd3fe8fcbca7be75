//! Transactional kernel pieces built on the binding store: scalable keyed
//! collections, the service bootstrap protocol, and a transactional task
//! scheduler.

pub mod app;
pub mod bootstrap;
pub mod collections;
pub mod config;
pub mod error;
pub mod kernel;
pub mod scheduler;
pub mod service;

pub use app::{AppListener, AppProperties, StartupContext};
pub use bootstrap::{BootstrapPhase, BootstrapReport, LISTENER_BINDING, ServiceBootstrap};
pub use collections::{
    BindingKeyedCollections, BindingKeyedMap, BindingKeyedSet, DecodeKey, EncodeKey, KeyError,
};
pub use config::KernelConfig;
pub use error::{KernelError, KernelResult};
pub use kernel::{Kernel, StartupReport};
pub use scheduler::{Task, TaskReport, TaskScheduler, TxnScheduler, run_transaction};
pub use service::{ComponentRegistry, Service};
