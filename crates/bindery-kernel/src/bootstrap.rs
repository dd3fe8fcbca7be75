//! Per-application bootstrap: configure services, claim the listener
//! singleton, then hand application startup to the scheduler.
//!
//! All three steps run in one transaction supplied by the caller. Startup
//! itself runs later in a separate transaction, so application code never
//! holds the transaction that configured the services.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::anyhow;
use bindery_store::{Bindings, NoopRecorder, SharedRecorder, Transaction};

use crate::app::{AppListener, AppProperties, StartupContext};
use crate::error::{KernelError, KernelResult};
use crate::scheduler::{Task, TaskScheduler};
use crate::service::{ComponentRegistry, Service};

/// Service-namespace binding holding the application's listener. Written by
/// the first successful bootstrap and never overwritten.
///
/// The slot is kernel state, so it stays out of the app namespace: application
/// code owns every name there and may walk or unbind any of them, including
/// through app-namespace collections.
pub const LISTENER_BINDING: &str = "bindery.kernel.AppListener";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapPhase {
    ConfiguringServices,
    BindingListener,
    SchedulingStartup,
    Done,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    /// Whether this run created the listener binding.
    pub listener_created: bool,
    /// Service names in configuration order.
    pub configured: Vec<String>,
}

pub struct ServiceBootstrap<L> {
    app_name: String,
    services: Vec<Arc<dyn Service>>,
    listener: L,
    properties: AppProperties,
    scheduler: Arc<dyn TaskScheduler>,
    recorder: SharedRecorder,
    phase: Arc<Mutex<BootstrapPhase>>,
}

impl<L: AppListener> ServiceBootstrap<L> {
    pub fn new(
        app_name: impl Into<String>,
        services: Vec<Arc<dyn Service>>,
        listener: L,
        properties: AppProperties,
        scheduler: Arc<dyn TaskScheduler>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            services,
            listener,
            properties,
            scheduler,
            recorder: Arc::new(NoopRecorder),
            phase: Arc::new(Mutex::new(BootstrapPhase::ConfiguringServices)),
        }
    }

    pub fn with_recorder(mut self, recorder: SharedRecorder) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn phase(&self) -> BootstrapPhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a failure that happened outside [`run`](Self::run), such as the
    /// bootstrap transaction failing to commit.
    pub fn mark_failed(&self) {
        self.set_phase(BootstrapPhase::Failed);
    }

    /// Run one bootstrap attempt inside `txn`. The phase becomes `Done` only
    /// once `txn` commits. On error the caller must abort `txn`, which
    /// discards every binding written by services configured in this attempt.
    pub fn run(&self, txn: &Transaction) -> KernelResult<BootstrapReport> {
        log::debug!("{}: starting service configuration", self.app_name);
        let result = self.run_phases(txn);
        if let Err(err) = &result {
            let failed_in = self.phase();
            self.set_phase(BootstrapPhase::Failed);
            log::warn!("{}: bootstrap failed during {failed_in:?}: {err}", self.app_name);
        }
        result
    }

    fn run_phases(&self, txn: &Transaction) -> KernelResult<BootstrapReport> {
        self.set_phase(BootstrapPhase::ConfiguringServices);
        let registry = self.configure_services(txn)?;

        self.set_phase(BootstrapPhase::BindingListener);
        let listener_created = self.bind_listener(txn)?;

        self.set_phase(BootstrapPhase::SchedulingStartup);
        self.schedule_startup(txn, registry.clone(), listener_created)?;

        let phase = self.phase.clone();
        let app = self.app_name.clone();
        txn.on_commit(move || {
            *phase.lock().unwrap_or_else(PoisonError::into_inner) = BootstrapPhase::Done;
            log::info!("{app}: services configured, startup scheduled");
        })?;

        Ok(BootstrapReport {
            listener_created,
            configured: registry.names().map(str::to_string).collect(),
        })
    }

    fn configure_services(&self, txn: &Transaction) -> KernelResult<ComponentRegistry> {
        let mut registry = ComponentRegistry::new();
        for service in &self.services {
            self.recorder.record("configure");
            if let Err(source) = service.configure(&registry, txn) {
                log::warn!(
                    "{}: failed to configure service {}: {source:#}",
                    self.app_name,
                    service.name()
                );
                return Err(KernelError::ServiceConfiguration {
                    app: self.app_name.clone(),
                    service: service.name().to_string(),
                    source,
                });
            }
            registry.add(service.clone())?;
        }
        Ok(registry)
    }

    /// Check-then-create on the listener slot. Safe without a lock because a
    /// concurrent bootstrap that also saw the slot empty fails to commit.
    fn bind_listener(&self, txn: &Transaction) -> KernelResult<bool> {
        let view = txn.service();
        if view.is_bound(LISTENER_BINDING)? {
            log::debug!("{}: listener already bound", self.app_name);
            return Ok(false);
        }
        view.bind(LISTENER_BINDING, &self.listener)?;
        log::debug!("{}: bound listener", self.app_name);
        Ok(true)
    }

    fn schedule_startup(
        &self,
        txn: &Transaction,
        services: ComponentRegistry,
        first_boot: bool,
    ) -> KernelResult<()> {
        self.recorder.record("scheduleStartup");
        let task = AppStartupTask::<L> {
            name: format!("{}:startup", self.app_name),
            app_name: self.app_name.clone(),
            properties: self.properties.clone(),
            services,
            first_boot,
            _listener: PhantomData,
        };
        self.scheduler
            .schedule(txn, Box::new(task), false)
            .inspect_err(|err| {
                log::warn!("{}: failed to schedule app startup task: {err}", self.app_name)
            })
    }

    fn set_phase(&self, next: BootstrapPhase) {
        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        if *phase != next {
            log::debug!("{}: bootstrap {:?} -> {:?}", self.app_name, *phase, next);
            *phase = next;
        }
    }
}

/// Follow-up task that starts the application from the bound listener.
struct AppStartupTask<L> {
    name: String,
    app_name: String,
    properties: AppProperties,
    services: ComponentRegistry,
    first_boot: bool,
    _listener: PhantomData<fn() -> L>,
}

impl<L: AppListener> Task for AppStartupTask<L> {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, txn: &Transaction) -> KernelResult<()> {
        let listener: L = txn
            .service()
            .lookup(LISTENER_BINDING)?
            .ok_or_else(|| KernelError::AppStartup {
                app: self.app_name.clone(),
                source: anyhow!("binding '{LISTENER_BINDING}' is not bound"),
            })?;
        let ctx = StartupContext {
            app_name: &self.app_name,
            properties: &self.properties,
            services: &self.services,
            txn,
            first_boot: self.first_boot,
        };
        listener
            .initialize(&ctx)
            .map_err(|source| KernelError::AppStartup {
                app: self.app_name.clone(),
                source,
            })?;
        log::info!("{}: application started", self.app_name);
        Ok(())
    }
}
