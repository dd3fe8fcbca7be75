use serde::{Serialize, de::DeserializeOwned};

use crate::codec::{from_cbor, to_canonical_cbor};
use crate::{Namespace, StoreResult, Transaction};

/// The four binding primitives, scoped to one namespace of one transaction.
///
/// Names are ordered by plain byte-wise string comparison. All methods fail
/// with `NoActiveTransaction` once the transaction has finished.
pub trait Bindings {
    fn lookup_bytes(&self, name: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Existence check that does not copy the bound value.
    fn is_bound(&self, name: &str) -> StoreResult<bool>;

    /// Bind `name`, overwriting any existing binding.
    fn bind_bytes(&self, name: &str, value: Vec<u8>) -> StoreResult<()>;

    /// Remove `name`; returns `false` if nothing was bound.
    fn unbind(&self, name: &str) -> StoreResult<bool>;

    /// Smallest bound name strictly greater than `name`, or the first bound
    /// name when `name` is `None`.
    fn next_bound_name(&self, name: Option<&str>) -> StoreResult<Option<String>>;

    /// Like [`Bindings::next_bound_name`], but only names strictly below
    /// `upper` are considered. Commits outside `(name, upper)` do not
    /// conflict with this lookup.
    fn next_bound_name_before(
        &self,
        name: Option<&str>,
        upper: &str,
    ) -> StoreResult<Option<String>>;

    fn lookup<T: DeserializeOwned>(&self, name: &str) -> StoreResult<Option<T>>
    where
        Self: Sized,
    {
        match self.lookup_bytes(name)? {
            Some(bytes) => Ok(Some(from_cbor(&bytes)?)),
            None => Ok(None),
        }
    }

    fn bind<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> StoreResult<()>
    where
        Self: Sized,
    {
        self.bind_bytes(name, to_canonical_cbor(value)?)
    }
}

#[derive(Clone, Copy)]
pub struct NamespaceView<'t> {
    txn: &'t Transaction,
    namespace: Namespace,
}

struct OpNames {
    get: &'static str,
    set: &'static str,
    remove: &'static str,
    next: &'static str,
}

const APP_OPS: OpNames = OpNames {
    get: "getBinding",
    set: "setBinding",
    remove: "removeBinding",
    next: "nextBoundName",
};

const SERVICE_OPS: OpNames = OpNames {
    get: "getServiceBinding",
    set: "setServiceBinding",
    remove: "removeServiceBinding",
    next: "nextServiceBoundName",
};

impl<'t> NamespaceView<'t> {
    pub(crate) fn new(txn: &'t Transaction, namespace: Namespace) -> Self {
        Self { txn, namespace }
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    pub fn transaction(&self) -> &'t Transaction {
        self.txn
    }

    fn ops(&self) -> &'static OpNames {
        match self.namespace {
            Namespace::App => &APP_OPS,
            Namespace::Service => &SERVICE_OPS,
        }
    }
}

impl Bindings for NamespaceView<'_> {
    fn lookup_bytes(&self, name: &str) -> StoreResult<Option<Vec<u8>>> {
        self.txn.recorder().record(self.ops().get);
        self.txn.get(&self.namespace.qualify(name))
    }

    fn is_bound(&self, name: &str) -> StoreResult<bool> {
        self.txn.recorder().record(self.ops().get);
        self.txn.contains(&self.namespace.qualify(name))
    }

    fn bind_bytes(&self, name: &str, value: Vec<u8>) -> StoreResult<()> {
        self.txn.recorder().record(self.ops().set);
        self.txn.put(self.namespace.qualify(name), value)
    }

    fn unbind(&self, name: &str) -> StoreResult<bool> {
        self.txn.recorder().record(self.ops().remove);
        self.txn.remove(&self.namespace.qualify(name))
    }

    fn next_bound_name(&self, name: Option<&str>) -> StoreResult<Option<String>> {
        self.next_in(name, self.namespace.ceiling().to_string())
    }

    fn next_bound_name_before(
        &self,
        name: Option<&str>,
        upper: &str,
    ) -> StoreResult<Option<String>> {
        self.next_in(name, self.namespace.qualify(upper))
    }
}

impl NamespaceView<'_> {
    fn next_in(&self, name: Option<&str>, limit: String) -> StoreResult<Option<String>> {
        self.txn.recorder().record(self.ops().next);
        let after = match name {
            Some(name) => self.namespace.qualify(name),
            None => self.namespace.floor().to_string(),
        };
        let next = self.txn.next_between(&after, &limit)?;
        Ok(next.and_then(|key| self.namespace.strip(&key).map(str::to_string)))
    }
}
