use std::fmt;
use std::sync::Arc;

use bindery_store::Transaction;
use indexmap::IndexMap;

use crate::error::{KernelError, KernelResult};

/// A kernel service configured once per application bootstrap.
///
/// `configure` runs inside the bootstrap transaction. Any bindings it writes
/// become visible only if every service configures and the bootstrap commits.
pub trait Service: Send + Sync {
    fn name(&self) -> &str;

    /// `registry` holds the services configured before this one, in order.
    fn configure(&self, registry: &ComponentRegistry, txn: &Transaction) -> anyhow::Result<()>;
}

/// Services configured so far, in configuration order.
#[derive(Clone, Default)]
pub struct ComponentRegistry {
    services: IndexMap<String, Arc<dyn Service>>,
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.services.keys()).finish()
    }
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&mut self, service: Arc<dyn Service>) -> KernelResult<()> {
        let name = service.name().to_string();
        if self.services.contains_key(&name) {
            return Err(KernelError::InvalidArgument(format!(
                "service '{name}' registered twice"
            )));
        }
        self.services.insert(name, service);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Service>> {
        self.services.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Service>> {
        self.services.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }
}
