//! `bindery map` commands: read a keyed collection by its prefix.

use anyhow::Result;
use bindery_kernel::{BindingKeyedCollections, BindingKeyedMap, KernelResult};
use clap::Args;
use serde_json::{Map, Value, json};

use crate::opts::{NamespaceArg, StoreOpts, open_store};
use crate::output::{cbor_to_json, print_success};

#[derive(Args, Debug)]
pub struct MapArgs {
    /// Collection key prefix
    #[arg(long)]
    pub prefix: String,

    /// Binding namespace
    #[arg(long, value_enum, default_value_t = NamespaceArg::Service)]
    pub namespace: NamespaceArg,
}

fn collection(args: &MapArgs) -> Result<BindingKeyedMap<String, serde_cbor::Value>> {
    Ok(BindingKeyedCollections::new(args.namespace.into()).new_map(&args.prefix)?)
}

/// Entries keyed by their encoded key, in iteration order.
pub fn cmd_list(opts: &StoreOpts, args: &MapArgs) -> Result<()> {
    let store = open_store(opts)?;
    let map = collection(args)?;
    let txn = store.begin();
    let entries: Vec<(String, serde_cbor::Value)> =
        map.iter(&txn).collect::<KernelResult<_>>()?;
    txn.abort();

    let mut out = Map::new();
    for (key, value) in entries {
        out.insert(key, cbor_to_json(value));
    }
    print_success(opts, Value::Object(out), vec![])
}

pub fn cmd_size(opts: &StoreOpts, args: &MapArgs) -> Result<()> {
    let store = open_store(opts)?;
    let map = collection(args)?;
    let txn = store.begin();
    let size = map.size(&txn)?;
    txn.abort();
    print_success(
        opts,
        json!({ "prefix": args.prefix, "size": size }),
        vec![],
    )
}
