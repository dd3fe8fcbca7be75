use std::fmt;
use std::marker::PhantomData;

use bindery_store::codec::encodes_to_null;
use bindery_store::{Bindings, Namespace, NamespaceView, SharedRecorder, Transaction};
use serde::{Serialize, de::DeserializeOwned};

use super::key::{DecodeKey, EncodeKey};
use super::PrefixRange;
use crate::error::{KernelError, KernelResult};

/// Map whose entries are individual bindings named `<prefix>.<encode(key)>`.
///
/// The map itself holds no entries, only the prefix; every operation runs
/// against the transaction passed in. Values are never null: a value that
/// serializes to nothing but CBOR `null` is rejected.
pub struct BindingKeyedMap<K, V> {
    range: PrefixRange,
    namespace: Namespace,
    recorder: SharedRecorder,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> Clone for BindingKeyedMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            range: self.range.clone(),
            namespace: self.namespace,
            recorder: self.recorder.clone(),
            _marker: PhantomData,
        }
    }
}

impl<K, V> fmt::Debug for BindingKeyedMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingKeyedMap")
            .field("prefix", &self.range.prefix())
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl<K, V> BindingKeyedMap<K, V> {
    pub(crate) fn new(range: PrefixRange, namespace: Namespace, recorder: SharedRecorder) -> Self {
        Self {
            range,
            namespace,
            recorder,
            _marker: PhantomData,
        }
    }

    pub fn key_prefix(&self) -> &str {
        self.range.prefix()
    }

    pub(crate) fn view<'t>(&self, txn: &'t Transaction) -> NamespaceView<'t> {
        txn.bindings(self.namespace)
    }

    pub(crate) fn record(&self, op: &'static str) {
        self.recorder.record(op);
    }

    /// True iff no binding exists in this map's range. Looks at one name at most
    /// (plus any stray names between the bare prefix and the separator).
    pub fn is_empty(&self, txn: &Transaction) -> KernelResult<bool> {
        self.record("isEmpty");
        Ok(self
            .range
            .next_in_range(&self.view(txn), None)?
            .is_none())
    }

    /// Number of entries. Walks the whole range, so this is O(n) binding
    /// lookups inside `txn`, not a constant-time counter.
    pub fn size(&self, txn: &Transaction) -> KernelResult<usize> {
        self.record("size");
        let mut names = NameCursor::new(self.view(txn), self.range.clone());
        let mut count = 0;
        while let Some(name) = names.next() {
            name?;
            count += 1;
        }
        Ok(count)
    }

    /// Remove every entry, one unbind per entry, all inside `txn`. Aborting
    /// `txn` restores every entry. Returns how many entries were removed.
    pub fn clear(&self, txn: &Transaction) -> KernelResult<usize> {
        self.record("clear");
        let view = self.view(txn);
        let mut cursor: Option<String> = None;
        let mut removed = 0;
        while let Some(name) = self.range.next_in_range(&view, cursor.as_deref())? {
            view.unbind(&name)?;
            removed += 1;
            cursor = Some(name);
        }
        Ok(removed)
    }

    /// Names of all bindings in range, in order.
    pub(crate) fn names<'t>(&self, txn: &'t Transaction) -> NameCursor<'t> {
        NameCursor::new(self.view(txn), self.range.clone())
    }
}

impl<K: EncodeKey, V> BindingKeyedMap<K, V> {
    pub(crate) fn name_of(&self, key: &K) -> String {
        self.range.name_for(&key.encode_key())
    }

    pub fn contains_key(&self, txn: &Transaction, key: &K) -> KernelResult<bool> {
        self.record("containsKey");
        Ok(self.view(txn).is_bound(&self.name_of(key))?)
    }

    /// Remove `key` without reading its value back.
    pub fn remove_override(&self, txn: &Transaction, key: &K) -> KernelResult<bool> {
        self.record("removeOverride");
        Ok(self.view(txn).unbind(&self.name_of(key))?)
    }
}

impl<K, V> BindingKeyedMap<K, V>
where
    K: EncodeKey,
    V: Serialize + DeserializeOwned,
{
    pub fn get(&self, txn: &Transaction, key: &K) -> KernelResult<Option<V>> {
        self.record("get");
        Ok(self.view(txn).lookup(&self.name_of(key))?)
    }

    /// Bind `key` to `value`, returning the value it replaced.
    pub fn put(&self, txn: &Transaction, key: &K, value: &V) -> KernelResult<Option<V>> {
        self.record("put");
        check_value(value)?;
        let view = self.view(txn);
        let name = self.name_of(key);
        let previous = view.lookup(&name)?;
        view.bind(&name, value)?;
        Ok(previous)
    }

    /// Bind `key` to `value` without reading the previous value. Two
    /// transactions overriding the same key do not conflict; the later commit wins.
    pub fn put_override(&self, txn: &Transaction, key: &K, value: &V) -> KernelResult<()> {
        self.record("putOverride");
        check_value(value)?;
        Ok(self.view(txn).bind(&self.name_of(key), value)?)
    }

    /// Remove `key`, returning the value that was bound to it.
    pub fn remove(&self, txn: &Transaction, key: &K) -> KernelResult<Option<V>> {
        self.record("remove");
        let view = self.view(txn);
        let name = self.name_of(key);
        let previous = view.lookup(&name)?;
        if previous.is_some() {
            view.unbind(&name)?;
        }
        Ok(previous)
    }

    pub fn values<'t>(&self, txn: &'t Transaction) -> Values<'t, V> {
        self.record("iterate");
        Values {
            names: self.names(txn),
            _marker: PhantomData,
        }
    }
}

impl<K, V> BindingKeyedMap<K, V>
where
    K: EncodeKey + DecodeKey,
    V: Serialize + DeserializeOwned,
{
    /// Lazily walk entries in encoded-key order.
    ///
    /// The cursor is the last binding name returned, so the iterator is only
    /// meaningful while `txn` is active. Entries added beyond the cursor during
    /// the walk are seen; changes at or before the cursor may or may not be.
    pub fn iter<'t>(&self, txn: &'t Transaction) -> Iter<'t, K, V> {
        self.record("iterate");
        Iter {
            names: self.names(txn),
            _marker: PhantomData,
        }
    }

    pub fn keys<'t>(&self, txn: &'t Transaction) -> Keys<'t, K> {
        self.record("iterate");
        Keys {
            names: self.names(txn),
            _marker: PhantomData,
        }
    }
}

pub(crate) fn check_value<V: Serialize + ?Sized>(value: &V) -> KernelResult<()> {
    match encodes_to_null(value) {
        Ok(false) => Ok(()),
        Ok(true) => Err(KernelError::InvalidArgument(
            "collections do not store null values".into(),
        )),
        Err(err) => Err(KernelError::InvalidArgument(format!(
            "value is not representable: {err}"
        ))),
    }
}

/// Ordered walk over the binding names of one prefix range.
pub(crate) struct NameCursor<'t> {
    view: NamespaceView<'t>,
    range: PrefixRange,
    cursor: Option<String>,
    done: bool,
}

impl<'t> NameCursor<'t> {
    fn new(view: NamespaceView<'t>, range: PrefixRange) -> Self {
        Self {
            view,
            range,
            cursor: None,
            done: false,
        }
    }

    pub(crate) fn view(&self) -> &NamespaceView<'t> {
        &self.view
    }

    pub(crate) fn range(&self) -> &PrefixRange {
        &self.range
    }
}

impl Iterator for NameCursor<'_> {
    type Item = KernelResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.range.next_in_range(&self.view, self.cursor.as_deref()) {
            Ok(Some(name)) => {
                self.cursor = Some(name.clone());
                Some(Ok(name))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

fn load<V: DeserializeOwned>(view: &NamespaceView<'_>, name: &str) -> KernelResult<Option<V>> {
    view.lookup(name).map_err(KernelError::from)
}

fn decode_entry_key<K: DecodeKey>(range: &PrefixRange, name: &str) -> KernelResult<K> {
    let encoded = range.key_of(name).unwrap_or_default();
    Ok(K::decode_key(encoded)?)
}

pub struct Iter<'t, K, V> {
    names: NameCursor<'t>,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K: DecodeKey, V: DeserializeOwned> Iter<'_, K, V> {
    fn entry(&self, name: &str) -> KernelResult<Option<(K, V)>> {
        let key = decode_entry_key::<K>(self.names.range(), name)?;
        Ok(load::<V>(self.names.view(), name)?.map(|value| (key, value)))
    }
}

impl<K: DecodeKey, V: DeserializeOwned> Iterator for Iter<'_, K, V> {
    type Item = KernelResult<(K, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let name = match self.names.next()? {
                Ok(name) => name,
                Err(err) => return Some(Err(err)),
            };
            match self.entry(&name) {
                Ok(Some(entry)) => return Some(Ok(entry)),
                Ok(None) => continue,
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

pub struct Keys<'t, K> {
    names: NameCursor<'t>,
    _marker: PhantomData<fn() -> K>,
}

impl<K: DecodeKey> Iterator for Keys<'_, K> {
    type Item = KernelResult<K>;

    fn next(&mut self) -> Option<Self::Item> {
        let name = match self.names.next()? {
            Ok(name) => name,
            Err(err) => return Some(Err(err)),
        };
        Some(decode_entry_key(self.names.range(), &name))
    }
}

pub struct Values<'t, V> {
    names: NameCursor<'t>,
    _marker: PhantomData<fn() -> V>,
}

impl<V: DeserializeOwned> Iterator for Values<'_, V> {
    type Item = KernelResult<V>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let name = match self.names.next()? {
                Ok(name) => name,
                Err(err) => return Some(Err(err)),
            };
            match load::<V>(self.names.view(), &name) {
                Ok(Some(value)) => return Some(Ok(value)),
                Ok(None) => continue,
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::BindingKeyedCollections;
    use bindery_store::{BindingStore, OpCounters};
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Session {
        user: String,
        level: u8,
    }

    fn map<V>(prefix: &str) -> BindingKeyedMap<String, V> {
        BindingKeyedCollections::default().new_map(prefix).unwrap()
    }

    fn key(k: &str) -> String {
        k.to_string()
    }

    #[test]
    fn put_get_remove_scenario() {
        let store = BindingStore::new();
        let txn = store.begin();
        let numbers = map::<u32>("p");
        assert_eq!(numbers.put(&txn, &key("a"), &1).unwrap(), None);
        assert_eq!(numbers.put(&txn, &key("b"), &2).unwrap(), None);
        assert_eq!(numbers.remove(&txn, &key("a")).unwrap(), Some(1));
        txn.commit().unwrap();

        let txn = store.begin();
        assert_eq!(numbers.size(&txn).unwrap(), 1);
        assert_eq!(numbers.get(&txn, &key("a")).unwrap(), None);
        assert_eq!(numbers.get(&txn, &key("b")).unwrap(), Some(2));
        let entries: Vec<(String, u32)> =
            numbers.iter(&txn).collect::<KernelResult<_>>().unwrap();
        assert_eq!(entries, vec![(key("b"), 2)]);
    }

    #[test]
    fn put_returns_previous_value() {
        let store = BindingStore::new();
        let txn = store.begin();
        let sessions = map::<Session>("sessions");
        let first = Session {
            user: "ada".into(),
            level: 1,
        };
        let second = Session {
            user: "ada".into(),
            level: 2,
        };
        assert_eq!(sessions.put(&txn, &key("ada"), &first).unwrap(), None);
        assert_eq!(
            sessions.put(&txn, &key("ada"), &second).unwrap(),
            Some(first)
        );
        assert!(sessions.contains_key(&txn, &key("ada")).unwrap());
        assert!(!sessions.contains_key(&txn, &key("bob")).unwrap());
        assert_eq!(sessions.remove(&txn, &key("bob")).unwrap(), None);
    }

    #[test]
    fn null_values_are_rejected() {
        let store = BindingStore::new();
        let txn = store.begin();
        let optional = map::<Option<u32>>("opt");
        let err = optional.put(&txn, &key("k"), &None).unwrap_err();
        assert!(matches!(err, KernelError::InvalidArgument(_)));
        optional.put(&txn, &key("k"), &Some(3)).unwrap();
        assert_eq!(optional.get(&txn, &key("k")).unwrap(), Some(Some(3)));
        assert!(matches!(
            optional.put_override(&txn, &key("j"), &None),
            Err(KernelError::InvalidArgument(_))
        ));
    }

    #[test]
    fn iteration_follows_encoded_key_order() {
        let store = BindingStore::new();
        let txn = store.begin();
        let scores: BindingKeyedMap<u64, String> =
            BindingKeyedCollections::default().new_map("scores").unwrap();
        for n in [100u64, 3, 25, 7] {
            scores.put(&txn, &n, &format!("n{n}")).unwrap();
        }
        let keys: Vec<u64> = scores.keys(&txn).collect::<KernelResult<_>>().unwrap();
        assert_eq!(keys, vec![3, 7, 25, 100]);
        let values: Vec<String> = scores.values(&txn).collect::<KernelResult<_>>().unwrap();
        assert_eq!(values, vec!["n3", "n7", "n25", "n100"]);
    }

    #[test]
    fn additions_beyond_the_cursor_are_observed() {
        let store = BindingStore::new();
        let txn = store.begin();
        let letters = map::<u8>("letters");
        letters.put(&txn, &key("a"), &0).unwrap();
        letters.put(&txn, &key("m"), &0).unwrap();
        let mut iter = letters.iter(&txn);
        assert_eq!(iter.next().unwrap().unwrap().0, "a");
        letters.put(&txn, &key("z"), &0).unwrap();
        let rest: Vec<String> = iter.map(|entry| entry.unwrap().0).collect();
        assert_eq!(rest, vec!["m", "z"]);
    }

    #[test]
    fn clear_twice_is_a_noop_the_second_time() {
        let store = BindingStore::new();
        let txn = store.begin();
        let items = map::<u32>("items");
        for (i, k) in ["x", "y", "z"].into_iter().enumerate() {
            items.put(&txn, &key(k), &(i as u32)).unwrap();
        }
        txn.commit().unwrap();

        let txn = store.begin();
        assert_eq!(items.clear(&txn).unwrap(), 3);
        assert!(items.is_empty(&txn).unwrap());
        assert_eq!(items.clear(&txn).unwrap(), 0);
        txn.commit().unwrap();
        assert_eq!(store.status().service_bindings, 0);
    }

    #[test]
    fn aborted_clear_restores_entries() {
        let store = BindingStore::new();
        let items = map::<u32>("items");
        let txn = store.begin();
        items.put(&txn, &key("x"), &1).unwrap();
        items.put(&txn, &key("y"), &2).unwrap();
        txn.commit().unwrap();

        let txn = store.begin();
        items.clear(&txn).unwrap();
        txn.abort();

        let txn = store.begin();
        assert_eq!(items.size(&txn).unwrap(), 2);
    }

    #[test]
    fn operations_require_an_active_transaction() {
        let store = BindingStore::new();
        let items = map::<u32>("items");
        let txn = store.begin();
        txn.commit().unwrap();
        assert!(matches!(
            items.get(&txn, &key("x")),
            Err(KernelError::NoActiveTransaction)
        ));
        assert!(matches!(
            items.size(&txn),
            Err(KernelError::NoActiveTransaction)
        ));
        let mut iter = items.iter(&txn);
        assert!(matches!(
            iter.next(),
            Some(Err(KernelError::NoActiveTransaction))
        ));
        assert!(iter.next().is_none());
    }

    #[test]
    fn operations_are_counted() {
        let counters = OpCounters::new();
        let collections = BindingKeyedCollections::with_recorder(
            bindery_store::Namespace::Service,
            counters.shared(),
        );
        let items: BindingKeyedMap<String, u32> = collections.new_map("counted").unwrap();
        let store = BindingStore::new();
        let txn = store.begin();
        items.put(&txn, &key("a"), &1).unwrap();
        items.get(&txn, &key("a")).unwrap();
        items.size(&txn).unwrap();
        items.clear(&txn).unwrap();
        assert_eq!(counters.count("put"), 1);
        assert_eq!(counters.count("get"), 1);
        assert_eq!(counters.count("size"), 1);
        assert_eq!(counters.count("clear"), 1);
    }
}
