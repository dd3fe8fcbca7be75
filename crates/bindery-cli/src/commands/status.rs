//! `bindery status` command.

use anyhow::Result;
use serde_json::json;

use crate::opts::{StoreOpts, open_store, store_dir};
use crate::output::print_success;

pub fn cmd_status(opts: &StoreOpts) -> Result<()> {
    let store = open_store(opts)?;
    let status = store.status();
    print_success(
        opts,
        json!({
            "store": store_dir(opts)?.display().to_string(),
            "last_seq": status.last_seq,
            "bindings": {
                "app": status.app_bindings,
                "service": status.service_bindings,
            },
        }),
        vec![],
    )
}
