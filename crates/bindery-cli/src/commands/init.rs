//! `bindery init` command.

use anyhow::{Context, Result};
use bindery_kernel::KernelConfig;
use bindery_store::{BindingStore, FsCommitLog};
use serde_json::json;

use crate::opts::{StoreOpts, store_dir};
use crate::output::print_success;

pub fn cmd_init(opts: &StoreOpts) -> Result<()> {
    let dir = store_dir(opts)?;
    let existed = FsCommitLog::exists(&dir);
    let store = BindingStore::open_fs(&dir, KernelConfig::from_env().store_config())
        .with_context(|| format!("create binding store at {}", dir.display()))?;
    let mut warnings = Vec::new();
    if existed {
        warnings.push(format!("store already initialized at {}", dir.display()));
    }
    print_success(
        opts,
        json!({
            "store": dir.display().to_string(),
            "last_seq": store.status().last_seq,
        }),
        warnings,
    )
}
