use std::path::Path;
use std::sync::Arc;

use bindery_store::{BindingStore, Namespace, OpCounters};

use crate::app::{AppListener, AppProperties};
use crate::bootstrap::{BootstrapReport, ServiceBootstrap};
use crate::collections::BindingKeyedCollections;
use crate::config::KernelConfig;
use crate::error::KernelResult;
use crate::scheduler::{TaskReport, TxnScheduler, run_transaction};
use crate::service::Service;

/// Outcome of [`Kernel::start_application`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupReport {
    pub bootstrap: BootstrapReport,
    /// Tasks run after the bootstrap committed, the startup task included.
    pub tasks: TaskReport,
}

/// Store, scheduler and counters wired together.
pub struct Kernel {
    store: BindingStore,
    scheduler: TxnScheduler,
    counters: OpCounters,
    config: KernelConfig,
}

impl Kernel {
    /// Wrap an existing store. Operation counts are recorded only by the
    /// kernel's own components, not by the store.
    pub fn new(store: BindingStore, config: KernelConfig) -> Self {
        let scheduler = TxnScheduler::new(store.clone(), config.max_task_retries);
        Self {
            store,
            scheduler,
            counters: OpCounters::new(),
            config,
        }
    }

    pub fn in_memory(config: KernelConfig) -> KernelResult<Self> {
        let counters = OpCounters::new();
        let store = BindingStore::builder()
            .config(config.store_config())
            .recorder(counters.shared())
            .build()?;
        Ok(Self::with_counters(store, counters, config))
    }

    /// Open (or create) a file-backed store under `root`.
    pub fn open_fs(root: impl AsRef<Path>, config: KernelConfig) -> KernelResult<Self> {
        let counters = OpCounters::new();
        let log = bindery_store::FsCommitLog::open(root.as_ref())?;
        let store = BindingStore::builder()
            .config(config.store_config())
            .recorder(counters.shared())
            .log(log)
            .build()?;
        Ok(Self::with_counters(store, counters, config))
    }

    fn with_counters(store: BindingStore, counters: OpCounters, config: KernelConfig) -> Self {
        Self {
            counters,
            ..Self::new(store, config)
        }
    }

    pub fn store(&self) -> &BindingStore {
        &self.store
    }

    pub fn scheduler(&self) -> &TxnScheduler {
        &self.scheduler
    }

    pub fn counters(&self) -> &OpCounters {
        &self.counters
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Collections in the service namespace, counted by this kernel.
    pub fn collections(&self) -> BindingKeyedCollections {
        BindingKeyedCollections::with_recorder(Namespace::Service, self.counters.shared())
    }

    /// Bootstrap `app_name` in a retried transaction, then run the startup
    /// task and anything else pending.
    pub fn start_application<L: AppListener>(
        &self,
        app_name: &str,
        services: Vec<Arc<dyn Service>>,
        listener: L,
        properties: AppProperties,
    ) -> KernelResult<StartupReport> {
        log::info!("{app_name}: starting application");
        let bootstrap = ServiceBootstrap::new(
            app_name,
            services,
            listener,
            properties,
            Arc::new(self.scheduler.clone()),
        )
        .with_recorder(self.counters.shared());

        let outcome = run_transaction(
            &self.store,
            self.config.max_task_retries,
            &format!("{app_name}:bootstrap"),
            |txn| bootstrap.run(txn),
        );
        let report = match outcome {
            Ok(report) => report,
            Err(err) => {
                bootstrap.mark_failed();
                log::warn!("{app_name}: bootstrap failed: {err}");
                return Err(err);
            }
        };
        Ok(StartupReport {
            bootstrap: report,
            tasks: self.run_tasks(),
        })
    }

    pub fn run_tasks(&self) -> TaskReport {
        match self.config.worker_threads {
            0 | 1 => self.scheduler.run_pending(),
            workers => self.scheduler.run_with_workers(workers),
        }
    }

    /// Stop accepting tasks. Already queued tasks stay queued.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }
}
