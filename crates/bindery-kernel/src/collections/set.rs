use std::fmt;

use bindery_store::{Bindings, Transaction};
use serde::{Serialize, de::DeserializeOwned};

use super::key::EncodeKey;
use super::map::{BindingKeyedMap, NameCursor, check_value};
use crate::error::KernelResult;

/// Set whose elements are stored as individual bindings named
/// `<prefix>.<encode(element)>`, with the element itself as the bound value.
///
/// Two distinct elements whose encodings collide share a slot. `add` then
/// replaces the stored element, and `contains`/`remove` only match the element
/// that is actually stored.
pub struct BindingKeyedSet<E> {
    map: BindingKeyedMap<String, E>,
}

impl<E> Clone for BindingKeyedSet<E> {
    fn clone(&self) -> Self {
        Self {
            map: self.map.clone(),
        }
    }
}

impl<E> fmt::Debug for BindingKeyedSet<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingKeyedSet")
            .field("prefix", &self.map.key_prefix())
            .finish()
    }
}

impl<E> BindingKeyedSet<E> {
    pub(crate) fn from_map(map: BindingKeyedMap<String, E>) -> Self {
        Self { map }
    }

    pub fn key_prefix(&self) -> &str {
        self.map.key_prefix()
    }

    pub fn is_empty(&self, txn: &Transaction) -> KernelResult<bool> {
        self.map.is_empty(txn)
    }

    /// O(n) in the number of elements.
    pub fn size(&self, txn: &Transaction) -> KernelResult<usize> {
        self.map.size(txn)
    }

    pub fn clear(&self, txn: &Transaction) -> KernelResult<usize> {
        self.map.clear(txn)
    }
}

impl<E> BindingKeyedSet<E>
where
    E: EncodeKey + PartialEq + Serialize + DeserializeOwned,
{
    fn slot(&self, element: &E) -> String {
        self.map.name_of(&element.encode_key())
    }

    fn stored(&self, txn: &Transaction, name: &str) -> KernelResult<Option<E>> {
        Ok(self.map.view(txn).lookup(name)?)
    }

    /// Add `element`; returns `false` without writing if it is already present.
    pub fn add(&self, txn: &Transaction, element: &E) -> KernelResult<bool> {
        self.map.record("add");
        check_value(element)?;
        let name = self.slot(element);
        if self.stored(txn, &name)?.as_ref() == Some(element) {
            return Ok(false);
        }
        self.map.view(txn).bind(&name, element)?;
        Ok(true)
    }

    pub fn contains(&self, txn: &Transaction, element: &E) -> KernelResult<bool> {
        self.map.record("contains");
        let name = self.slot(element);
        Ok(self.stored(txn, &name)?.as_ref() == Some(element))
    }

    /// Remove `element`; a different element stored in the same slot is left alone.
    pub fn remove(&self, txn: &Transaction, element: &E) -> KernelResult<bool> {
        self.map.record("remove");
        let name = self.slot(element);
        if self.stored(txn, &name)?.as_ref() != Some(element) {
            return Ok(false);
        }
        Ok(self.map.view(txn).unbind(&name)?)
    }

    pub fn iter<'t>(&self, txn: &'t Transaction) -> SetIter<'t, E> {
        self.map.record("iterate");
        SetIter {
            names: self.map.names(txn),
            _marker: std::marker::PhantomData,
        }
    }

    /// Remove every element for which `keep` returns false. Returns the
    /// number of elements removed.
    pub fn retain<F>(&self, txn: &Transaction, mut keep: F) -> KernelResult<usize>
    where
        F: FnMut(&E) -> bool,
    {
        self.map.record("retain");
        let view = self.map.view(txn);
        let mut doomed = Vec::new();
        for name in self.map.names(txn) {
            let name = name?;
            if let Some(element) = view.lookup::<E>(&name)? {
                if !keep(&element) {
                    doomed.push(name);
                }
            }
        }
        for name in &doomed {
            view.unbind(name)?;
        }
        Ok(doomed.len())
    }
}

pub struct SetIter<'t, E> {
    names: NameCursor<'t>,
    _marker: std::marker::PhantomData<fn() -> E>,
}

impl<E: DeserializeOwned> Iterator for SetIter<'_, E> {
    type Item = KernelResult<E>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let name = match self.names.next()? {
                Ok(name) => name,
                Err(err) => return Some(Err(err)),
            };
            match self.names.view().lookup::<E>(&name) {
                Ok(Some(element)) => return Some(Ok(element)),
                Ok(None) => continue,
                Err(err) => return Some(Err(err.into())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::BindingKeyedCollections;
    use crate::error::KernelError;
    use bindery_store::BindingStore;
    use serde::Deserialize;

    /// Host record keyed by name only, so two ports on one host collide.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Host {
        name: String,
        port: u16,
    }

    impl EncodeKey for Host {
        fn encode_key(&self) -> String {
            self.name.clone()
        }
    }

    fn host(name: &str, port: u16) -> Host {
        Host {
            name: name.into(),
            port,
        }
    }

    fn tags() -> BindingKeyedSet<String> {
        BindingKeyedCollections::default().new_set("tags").unwrap()
    }

    #[test]
    fn add_contains_remove() {
        let store = BindingStore::new();
        let set = tags();
        let txn = store.begin();
        assert!(set.add(&txn, &"red".to_string()).unwrap());
        assert!(!set.add(&txn, &"red".to_string()).unwrap());
        assert!(set.add(&txn, &"blue".to_string()).unwrap());
        assert!(set.contains(&txn, &"red".to_string()).unwrap());
        assert!(!set.contains(&txn, &"green".to_string()).unwrap());
        assert_eq!(set.size(&txn).unwrap(), 2);
        txn.commit().unwrap();

        let txn = store.begin();
        assert!(set.remove(&txn, &"red".to_string()).unwrap());
        assert!(!set.remove(&txn, &"red".to_string()).unwrap());
        let left: Vec<String> = set.iter(&txn).collect::<KernelResult<_>>().unwrap();
        assert_eq!(left, vec!["blue"]);
    }

    #[test]
    fn colliding_elements_share_a_slot() {
        let store = BindingStore::new();
        let hosts: BindingKeyedSet<Host> =
            BindingKeyedCollections::default().new_set("hosts").unwrap();
        let txn = store.begin();
        assert!(hosts.add(&txn, &host("alpha", 80)).unwrap());
        assert!(!hosts.remove(&txn, &host("alpha", 443)).unwrap());
        assert!(hosts.contains(&txn, &host("alpha", 80)).unwrap());

        assert!(hosts.add(&txn, &host("alpha", 443)).unwrap());
        assert!(!hosts.contains(&txn, &host("alpha", 80)).unwrap());
        assert_eq!(hosts.size(&txn).unwrap(), 1);
    }

    #[test]
    fn retain_removes_rejected_elements() {
        let store = BindingStore::new();
        let hosts: BindingKeyedSet<Host> =
            BindingKeyedCollections::default().new_set("hosts").unwrap();
        let txn = store.begin();
        for (name, port) in [("a", 80), ("b", 8080), ("c", 443), ("d", 9000)] {
            hosts.add(&txn, &host(name, port)).unwrap();
        }
        let removed = hosts.retain(&txn, |h| h.port < 1024).unwrap();
        assert_eq!(removed, 2);
        let names: Vec<String> = hosts
            .iter(&txn)
            .map(|h| h.map(|h| h.name))
            .collect::<KernelResult<_>>()
            .unwrap();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[test]
    fn clear_and_is_empty() {
        let store = BindingStore::new();
        let set = tags();
        let txn = store.begin();
        assert!(set.is_empty(&txn).unwrap());
        set.add(&txn, &"x".to_string()).unwrap();
        assert!(!set.is_empty(&txn).unwrap());
        assert_eq!(set.clear(&txn).unwrap(), 1);
        assert!(set.is_empty(&txn).unwrap());
        txn.commit().unwrap();
        assert!(matches!(
            set.add(&txn, &"y".to_string()),
            Err(KernelError::NoActiveTransaction)
        ));
    }
}
