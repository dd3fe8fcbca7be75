use std::collections::BTreeMap;

use bindery_store::Transaction;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::service::ComponentRegistry;

/// String properties handed to an application at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppProperties(BTreeMap<String, String>);

impl AppProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for AppProperties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// An application's entry point.
///
/// The listener is stored in a singleton binding the first time the
/// application boots, so it must be serializable. Later boots load the stored
/// listener and ignore the one passed in.
pub trait AppListener: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Runs in its own transaction after the bootstrap transaction commits.
    fn initialize(&self, ctx: &StartupContext<'_>) -> anyhow::Result<()>;
}

pub struct StartupContext<'a> {
    pub app_name: &'a str,
    pub properties: &'a AppProperties,
    pub services: &'a ComponentRegistry,
    pub txn: &'a Transaction,
    /// True iff the bootstrap that scheduled this startup created the
    /// listener binding.
    pub first_boot: bool,
}
