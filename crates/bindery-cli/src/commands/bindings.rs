//! `bindery bindings` commands: raw access to named bindings.

use anyhow::{Result, bail};
use bindery_store::{Bindings, Namespace};
use clap::Args;
use serde_json::{Value, json};

use crate::opts::{NamespaceArg, StoreOpts, open_store};
use crate::output::{cbor_to_json, print_success};

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Binding namespace
    #[arg(long, value_enum, default_value_t = NamespaceArg::Service)]
    pub namespace: NamespaceArg,

    /// Only list names starting with this prefix
    #[arg(long)]
    pub prefix: Option<String>,

    /// Stop after this many names
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args, Debug)]
pub struct GetArgs {
    /// Binding name
    pub name: String,

    /// Binding namespace
    #[arg(long, value_enum, default_value_t = NamespaceArg::Service)]
    pub namespace: NamespaceArg,
}

pub fn cmd_list(opts: &StoreOpts, args: &ListArgs) -> Result<()> {
    let store = open_store(opts)?;
    let txn = store.begin();
    let view = txn.bindings(Namespace::from(args.namespace));
    let prefix = args.prefix.as_deref().unwrap_or_default();
    let limit = args.limit.unwrap_or(usize::MAX);

    // Every name with this prefix except the prefix itself sorts after it.
    let mut names = Vec::new();
    let mut cursor = match prefix {
        "" => view.next_bound_name(None)?,
        p if view.is_bound(p)? => Some(p.to_string()),
        p => view.next_bound_name(Some(p))?,
    };
    let mut truncated = false;
    while let Some(name) = cursor {
        if !name.starts_with(prefix) {
            break;
        }
        if names.len() == limit {
            truncated = true;
            break;
        }
        cursor = view.next_bound_name(Some(&name))?;
        names.push(Value::String(name));
    }
    txn.abort();

    let mut warnings = Vec::new();
    if truncated {
        warnings.push(format!("output truncated to {limit} name(s)"));
    }
    print_success(opts, Value::Array(names), warnings)
}

pub fn cmd_get(opts: &StoreOpts, args: &GetArgs) -> Result<()> {
    let store = open_store(opts)?;
    let txn = store.begin();
    let value = txn
        .bindings(Namespace::from(args.namespace))
        .lookup::<serde_cbor::Value>(&args.name)?;
    txn.abort();
    let Some(value) = value else {
        bail!(
            "name '{}' is not bound in the {} namespace",
            args.name,
            Namespace::from(args.namespace).as_str()
        );
    };
    print_success(
        opts,
        json!({ "name": args.name, "value": cbor_to_json(value) }),
        vec![],
    )
}
