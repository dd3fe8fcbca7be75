//! Keyed collections stored one binding per entry.
//!
//! A collection owns every binding whose name starts with `<prefix>.`; entry
//! `k` lives at `<prefix>.<encode(k)>`. Transactions that touch different
//! entries touch different bindings and therefore never conflict. The price
//! is that `size` and `clear` walk the whole prefix range (O(n) binding
//! operations inside the calling transaction) and that iteration follows the
//! byte-wise order of encoded keys rather than insertion order.
//!
//! Two live collections must not use prefixes where one is a prefix of the
//! other; nothing checks this at construction time.

mod key;
mod map;
mod set;

pub use key::{DecodeKey, EncodeKey, KeyError};
pub use map::{BindingKeyedMap, Iter, Keys, Values};
pub use set::{BindingKeyedSet, SetIter};

use std::sync::Arc;

use bindery_store::{Bindings, Namespace, NamespaceView, NoopRecorder, SharedRecorder};

use crate::error::{KernelError, KernelResult};

pub const KEY_SEPARATOR: char = '.';
/// Sorts immediately after [`KEY_SEPARATOR`].
const RANGE_END: char = '/';

/// Factory for maps and sets that share a namespace and an operation recorder.
#[derive(Clone)]
pub struct BindingKeyedCollections {
    namespace: Namespace,
    recorder: SharedRecorder,
}

impl Default for BindingKeyedCollections {
    fn default() -> Self {
        Self::new(Namespace::Service)
    }
}

impl BindingKeyedCollections {
    pub fn new(namespace: Namespace) -> Self {
        Self::with_recorder(namespace, Arc::new(NoopRecorder))
    }

    pub fn with_recorder(namespace: Namespace, recorder: SharedRecorder) -> Self {
        Self {
            namespace,
            recorder,
        }
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// Map over the bindings under `prefix`. Fails if `prefix` is empty.
    pub fn new_map<K, V>(&self, prefix: &str) -> KernelResult<BindingKeyedMap<K, V>> {
        Ok(BindingKeyedMap::new(
            PrefixRange::new(prefix)?,
            self.namespace,
            self.recorder.clone(),
        ))
    }

    /// Set over the bindings under `prefix`. Fails if `prefix` is empty.
    pub fn new_set<E>(&self, prefix: &str) -> KernelResult<BindingKeyedSet<E>> {
        Ok(BindingKeyedSet::from_map(self.new_map(prefix)?))
    }
}

/// The slice of the binding namespace owned by one collection prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PrefixRange {
    prefix: String,
    /// `prefix` followed by the separator; every entry name starts with it.
    start: String,
    /// `prefix` followed by the character after the separator; every entry
    /// name sorts below it.
    end: String,
}

impl PrefixRange {
    pub(crate) fn new(prefix: &str) -> KernelResult<Self> {
        if prefix.is_empty() {
            return Err(KernelError::InvalidArgument(
                "collection key prefix must not be empty".into(),
            ));
        }
        let mut start = String::with_capacity(prefix.len() + 1);
        start.push_str(prefix);
        start.push(KEY_SEPARATOR);
        let mut end = String::with_capacity(prefix.len() + 1);
        end.push_str(prefix);
        end.push(RANGE_END);
        Ok(Self {
            prefix: prefix.to_string(),
            start,
            end,
        })
    }

    pub(crate) fn prefix(&self) -> &str {
        &self.prefix
    }

    pub(crate) fn name_for(&self, encoded: &str) -> String {
        let mut name = String::with_capacity(self.start.len() + encoded.len());
        name.push_str(&self.start);
        name.push_str(encoded);
        name
    }

    pub(crate) fn key_of<'n>(&self, name: &'n str) -> Option<&'n str> {
        name.strip_prefix(self.start.as_str())
    }

    /// First bound entry name after `cursor` (or from the start of the range).
    /// Names that sort between the bare prefix and `<prefix>.` are skipped.
    /// Lookups stop at `<prefix>/`, so bindings outside the range never take
    /// part in conflict detection.
    pub(crate) fn next_in_range(
        &self,
        view: &NamespaceView<'_>,
        cursor: Option<&str>,
    ) -> KernelResult<Option<String>> {
        let mut after = cursor.unwrap_or(self.prefix.as_str()).to_string();
        loop {
            match view.next_bound_name_before(Some(&after), &self.end)? {
                Some(name) if name.starts_with(&self.start) => return Ok(Some(name)),
                Some(name) if name.as_str() < self.start.as_str() => after = name,
                _ => return Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bindery_store::BindingStore;

    #[test]
    fn empty_prefix_is_rejected() {
        let collections = BindingKeyedCollections::default();
        assert!(matches!(
            collections.new_map::<String, u32>(""),
            Err(KernelError::InvalidArgument(_))
        ));
        assert!(collections.new_set::<String>("").is_err());
    }

    #[test]
    fn range_skips_names_outside_the_separator() {
        let store = BindingStore::new();
        let txn = store.begin();
        let view = txn.service();
        for name in ["p", "p!", "p.a", "p.b", "p/", "pq.a"] {
            view.bind(name, &0u8).unwrap();
        }
        let range = PrefixRange::new("p").unwrap();
        let first = range.next_in_range(&view, None).unwrap();
        assert_eq!(first.as_deref(), Some("p.a"));
        assert_eq!(range.key_of("p.a"), Some("a"));
        let second = range.next_in_range(&view, first.as_deref()).unwrap();
        assert_eq!(second.as_deref(), Some("p.b"));
        assert_eq!(range.next_in_range(&view, second.as_deref()).unwrap(), None);
    }
}
