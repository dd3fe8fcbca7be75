//! Global CLI options and store resolution.

use std::path::PathBuf;

use anyhow::{Result, bail};
use bindery_kernel::KernelConfig;
use bindery_store::{BindingStore, FsCommitLog, Namespace};
use clap::{Args, ValueEnum};

/// Global options for CLI commands.
#[derive(Args, Debug, Clone)]
pub struct StoreOpts {
    /// Store directory (env: BINDERY_STORE, default: current directory)
    #[arg(short = 's', long, global = true, env = "BINDERY_STORE")]
    pub store: Option<PathBuf>,

    /// JSON output envelope
    #[arg(long, global = true)]
    pub json: bool,

    /// Pretty-print JSON output (implies --json)
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Suppress notices
    #[arg(long, global = true)]
    pub quiet: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamespaceArg {
    App,
    #[default]
    Service,
}

impl From<NamespaceArg> for Namespace {
    fn from(arg: NamespaceArg) -> Self {
        match arg {
            NamespaceArg::App => Namespace::App,
            NamespaceArg::Service => Namespace::Service,
        }
    }
}

pub fn store_dir(opts: &StoreOpts) -> Result<PathBuf> {
    match &opts.store {
        Some(dir) => Ok(dir.clone()),
        None => Ok(std::env::current_dir()?),
    }
}

/// Open an existing store. Refuses to create one implicitly.
pub fn open_store(opts: &StoreOpts) -> Result<BindingStore> {
    let dir = store_dir(opts)?;
    if !FsCommitLog::exists(&dir) {
        bail!(
            "no binding store at {} (run `bindery init` first)",
            dir.display()
        );
    }
    let store = BindingStore::open_fs(&dir, KernelConfig::from_env().store_config())?;
    tracing::debug!(store = %dir.display(), "opened binding store");
    Ok(store)
}
