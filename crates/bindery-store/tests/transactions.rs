use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bindery_store::{
    Bindings, BindingStore, FsCommitLog, Namespace, OpCounters, StoreConfig, StoreError,
};
use tempfile::TempDir;

fn seed(store: &BindingStore, names: &[&str]) {
    let txn = store.begin();
    for name in names {
        txn.service().bind(name, *name).unwrap();
    }
    txn.commit().unwrap();
}

fn names(store: &BindingStore, namespace: Namespace) -> Vec<String> {
    let txn = store.begin();
    let view = txn.bindings(namespace);
    let mut out = Vec::new();
    let mut cursor = view.next_bound_name(None).unwrap();
    while let Some(name) = cursor {
        cursor = view.next_bound_name(Some(&name)).unwrap();
        out.push(name);
    }
    out
}

#[test]
fn read_modify_write_on_same_name_conflicts() {
    let store = BindingStore::new();
    seed(&store, &["counter"]);

    let first = store.begin();
    let second = store.begin();
    assert!(first.service().lookup::<String>("counter").unwrap().is_some());
    assert!(second.service().lookup::<String>("counter").unwrap().is_some());
    first.service().bind("counter", "first").unwrap();
    second.service().bind("counter", "second").unwrap();

    first.commit().unwrap();
    let err = second.commit().unwrap_err();
    assert!(matches!(err, StoreError::Conflict { ref name, .. } if name == "s.counter"));
    assert!(err.is_retryable());

    let txn = store.begin();
    assert_eq!(
        txn.service().lookup::<String>("counter").unwrap().as_deref(),
        Some("first")
    );
}

#[test]
fn disjoint_names_commit_concurrently() {
    let store = BindingStore::new();
    let first = store.begin();
    let second = store.begin();
    assert!(first.service().lookup_bytes("left").unwrap().is_none());
    assert!(second.service().lookup_bytes("right").unwrap().is_none());
    first.service().bind("left", &1u8).unwrap();
    second.service().bind("right", &2u8).unwrap();
    first.commit().unwrap();
    second.commit().unwrap();
    assert_eq!(names(&store, Namespace::Service), vec!["left", "right"]);
}

#[test]
fn next_bound_name_detects_phantom_insert() {
    let store = BindingStore::new();
    seed(&store, &["a", "c"]);

    let scanner = store.begin();
    assert_eq!(
        scanner.service().next_bound_name(Some("a")).unwrap().as_deref(),
        Some("c")
    );
    scanner.service().bind("scan.done", &true).unwrap();

    let writer = store.begin();
    writer.service().bind("b", "b").unwrap();
    writer.commit().unwrap();

    assert!(matches!(
        scanner.commit(),
        Err(StoreError::Conflict { .. })
    ));
}

#[test]
fn bounded_lookup_ignores_changes_past_the_bound() {
    let store = BindingStore::new();
    seed(&store, &["p.a", "r"]);

    let scanner = store.begin();
    let view = scanner.service();
    assert_eq!(
        view.next_bound_name_before(None, "p/").unwrap().as_deref(),
        Some("p.a")
    );
    view.bind("pz", &true).unwrap();
    assert_eq!(view.next_bound_name_before(Some("p.a"), "p/").unwrap(), None);
    assert_eq!(view.next_bound_name_before(Some("r"), "p/").unwrap(), None);
    assert_eq!(view.next_bound_name(Some("p.a")).unwrap().as_deref(), Some("pz"));

    let writer = store.begin();
    writer.service().bind("q", "q").unwrap();
    assert!(writer.service().unbind("r").unwrap());
    writer.commit().unwrap();

    // The unbounded lookup saw "r" next; "q" now sorts first.
    assert!(scanner.commit().is_err());

    let scanner = store.begin();
    assert_eq!(
        scanner
            .service()
            .next_bound_name_before(Some("p.a"), "p/")
            .unwrap(),
        None
    );
    scanner.service().bind("scan.done", &true).unwrap();
    seed(&store, &["p0", "q2"]);
    scanner.commit().unwrap();

    let scanner = store.begin();
    assert_eq!(
        scanner
            .service()
            .next_bound_name_before(Some("p.a"), "p/")
            .unwrap(),
        None
    );
    scanner.service().bind("scan.done", &false).unwrap();
    seed(&store, &["p.b"]);
    assert!(matches!(
        scanner.commit(),
        Err(StoreError::Conflict { .. })
    ));
}

#[test]
fn committed_seq_is_set_only_by_commit() {
    let store = BindingStore::new();
    seed(&store, &["a"]);

    let writer = store.begin();
    assert_eq!(writer.committed_seq(), None);
    writer.service().bind("b", "b").unwrap();
    assert_eq!(writer.commit().unwrap(), 2);
    assert_eq!(writer.committed_seq(), Some(2));

    let reader = store.begin();
    assert!(reader.service().lookup_bytes("a").unwrap().is_some());
    assert_eq!(reader.commit().unwrap(), 2);
    assert_eq!(reader.committed_seq(), Some(2));

    let aborted = store.begin();
    aborted.service().bind("c", "c").unwrap();
    aborted.abort();
    assert_eq!(aborted.committed_seq(), None);

    let writer = store.begin();
    writer.service().bind("a", "again").unwrap();
    let reader = store.begin();
    assert!(reader.service().lookup_bytes("a").unwrap().is_some());
    reader.service().bind("d", "d").unwrap();
    writer.commit().unwrap();
    assert!(reader.commit().is_err());
    assert_eq!(reader.committed_seq(), None);
}

#[test]
fn own_writes_are_visible_to_traversal() {
    let store = BindingStore::new();
    seed(&store, &["a", "b", "c"]);
    let txn = store.begin();
    let view = txn.service();
    assert!(view.unbind("b").unwrap());
    assert!(!view.unbind("b").unwrap());
    view.bind("bb", "bb").unwrap();
    assert_eq!(view.next_bound_name(Some("a")).unwrap().as_deref(), Some("bb"));
    assert_eq!(view.next_bound_name(Some("bb")).unwrap().as_deref(), Some("c"));
    assert_eq!(view.next_bound_name(Some("c")).unwrap(), None);
    txn.commit().unwrap();
    assert_eq!(names(&store, Namespace::Service), vec!["a", "bb", "c"]);
}

#[test]
fn namespaces_do_not_see_each_other() {
    let store = BindingStore::new();
    let txn = store.begin();
    txn.app().bind("shared", "app").unwrap();
    txn.service().bind("shared", "service").unwrap();
    txn.commit().unwrap();

    let txn = store.begin();
    assert_eq!(
        txn.app().lookup::<String>("shared").unwrap().as_deref(),
        Some("app")
    );
    assert_eq!(txn.app().next_bound_name(Some("shared")).unwrap(), None);
    assert_eq!(names(&store, Namespace::Service), vec!["shared"]);
    assert_eq!(store.status().app_bindings, 1);
    assert_eq!(store.status().service_bindings, 1);
}

#[test]
fn finished_transactions_reject_operations() {
    let store = BindingStore::new();
    let txn = store.begin();
    let stashed = txn.clone();
    txn.commit().unwrap();
    assert!(!stashed.is_active());
    assert!(matches!(
        stashed.app().lookup_bytes("x"),
        Err(StoreError::NoActiveTransaction)
    ));
    assert!(matches!(
        stashed.commit(),
        Err(StoreError::NoActiveTransaction)
    ));

    let aborted = store.begin();
    aborted.app().bind("x", &1u8).unwrap();
    aborted.abort();
    assert!(matches!(
        aborted.app().unbind("x"),
        Err(StoreError::NoActiveTransaction)
    ));
    assert_eq!(store.status().app_bindings, 0);
}

#[test]
fn commit_actions_run_only_after_commit() {
    let store = BindingStore::new();
    let ran = Arc::new(AtomicUsize::new(0));

    let txn = store.begin();
    let hits = ran.clone();
    txn.on_commit(move || {
        hits.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();
    txn.abort();
    assert_eq!(ran.load(Ordering::SeqCst), 0);

    let txn = store.begin();
    let hits = ran.clone();
    txn.on_commit(move || {
        hits.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();
    txn.commit().unwrap();
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[test]
fn expired_transaction_aborts() {
    let store = BindingStore::builder()
        .config(StoreConfig::default().with_txn_timeout(Duration::from_millis(1)))
        .build()
        .unwrap();
    let txn = store.begin();
    std::thread::sleep(Duration::from_millis(10));
    let err = txn.app().bind("late", &1u8).unwrap_err();
    assert!(matches!(err, StoreError::Timeout { .. }));
    assert!(err.is_retryable());
    assert!(matches!(
        txn.commit(),
        Err(StoreError::NoActiveTransaction)
    ));
}

#[test]
fn file_backed_store_survives_restart() {
    let tmp = TempDir::new().unwrap();
    {
        let store = BindingStore::open_fs(tmp.path(), StoreConfig::default()).unwrap();
        seed(&store, &["kept", "dropped"]);
        let txn = store.begin();
        txn.service().unbind("dropped").unwrap();
        txn.commit().unwrap();
    }
    assert!(FsCommitLog::exists(tmp.path()));

    let store = BindingStore::open_fs(tmp.path(), StoreConfig::default()).unwrap();
    assert_eq!(store.status().last_seq, 2);
    assert_eq!(names(&store, Namespace::Service), vec!["kept"]);
}

#[test]
fn binding_operations_are_counted() {
    let counters = OpCounters::new();
    let store = BindingStore::builder()
        .recorder(counters.shared())
        .build()
        .unwrap();
    let txn = store.begin();
    txn.app().bind("a", &1u8).unwrap();
    txn.app().lookup_bytes("a").unwrap();
    txn.service().next_bound_name(None).unwrap();
    txn.service().unbind("missing").unwrap();
    txn.commit().unwrap();

    assert_eq!(counters.count("setBinding"), 1);
    assert_eq!(counters.count("getBinding"), 1);
    assert_eq!(counters.count("nextServiceBoundName"), 1);
    assert_eq!(counters.count("removeServiceBinding"), 1);
}
