use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use bindery_kernel::{BindingKeyedCollections, BindingKeyedMap};
use bindery_store::{Bindings, BindingStore, StoreConfig};
use predicates::prelude::*;
use tempfile::TempDir;

fn bindery(store: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("bindery"));
    cmd.env_remove("BINDERY_STORE")
        .args(["--store", store.to_str().unwrap()]);
    cmd
}

fn json_output(cmd: &mut Command) -> serde_json::Value {
    let assert = cmd.arg("--json").assert().success();
    serde_json::from_slice(&assert.get_output().stdout).expect("json")
}

fn seeded() -> TempDir {
    let tmp = TempDir::new().expect("tmpdir");
    let store = BindingStore::open_fs(tmp.path(), StoreConfig::default()).expect("store");
    let scores: BindingKeyedMap<String, u32> =
        BindingKeyedCollections::default().new_map("scores").unwrap();
    let txn = store.begin();
    scores.put(&txn, &"ada".into(), &3).unwrap();
    scores.put(&txn, &"bob".into(), &5).unwrap();
    txn.service().bind("settings", &vec!["fast", "quiet"]).unwrap();
    txn.app().bind("motd", "hello").unwrap();
    txn.commit().unwrap();
    tmp
}

#[test]
fn help_lists_commands() {
    Command::new(assert_cmd::cargo::cargo_bin!("bindery"))
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("bindings")
                .and(predicate::str::contains("map"))
                .and(predicate::str::contains("--store")),
        );
}

#[test]
fn status_reports_binding_counts() {
    let tmp = seeded();
    let json = json_output(bindery(tmp.path()).arg("status"));
    assert_eq!(json["data"]["last_seq"].as_u64(), Some(1));
    assert_eq!(json["data"]["bindings"]["service"].as_u64(), Some(3));
    assert_eq!(json["data"]["bindings"]["app"].as_u64(), Some(1));
}

#[test]
fn bindings_list_filters_by_prefix() {
    let tmp = seeded();
    let json = json_output(bindery(tmp.path()).args(["bindings", "list", "--prefix", "scores."]));
    assert_eq!(json["data"], serde_json::json!(["scores.ada", "scores.bob"]));

    let json = json_output(bindery(tmp.path()).args(["bindings", "list", "--limit", "1"]));
    assert_eq!(json["data"], serde_json::json!(["scores.ada"]));
    assert!(json["warnings"][0].as_str().unwrap().contains("truncated"));

    bindery(tmp.path())
        .args(["bindings", "list", "--namespace", "app"])
        .assert()
        .success()
        .stdout("motd\n");
}

#[test]
fn bindings_get_decodes_values() {
    let tmp = seeded();
    let json = json_output(bindery(tmp.path()).args(["bindings", "get", "settings"]));
    assert_eq!(json["data"]["value"], serde_json::json!(["fast", "quiet"]));

    bindery(tmp.path())
        .args(["bindings", "get", "missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not bound"));
}

#[test]
fn map_commands_read_collections() {
    let tmp = seeded();
    let json = json_output(bindery(tmp.path()).args(["map", "list", "--prefix", "scores"]));
    assert_eq!(json["data"], serde_json::json!({"ada": 3, "bob": 5}));

    let json = json_output(bindery(tmp.path()).args(["map", "size", "--prefix", "scores"]));
    assert_eq!(json["data"]["size"].as_u64(), Some(2));
}

#[test]
fn missing_store_is_an_error_until_init() {
    let tmp = TempDir::new().expect("tmpdir");
    bindery(tmp.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("bindery init"));

    bindery(tmp.path()).arg("init").assert().success();
    let json = json_output(bindery(tmp.path()).arg("status"));
    assert_eq!(json["data"]["last_seq"].as_u64(), Some(0));
}
