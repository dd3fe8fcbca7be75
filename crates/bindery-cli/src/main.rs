mod commands;
mod opts;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::bindings::{GetArgs, ListArgs};
use commands::map::MapArgs;
use opts::StoreOpts;

#[derive(Parser, Debug)]
#[command(name = "bindery", version, about = "Inspect a bindery binding store")]
struct Cli {
    #[command(flatten)]
    opts: StoreOpts,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an empty store
    Init,

    /// Show store status
    Status,

    /// Named bindings
    #[command(subcommand)]
    Bindings(BindingsCommand),

    /// Keyed collections
    #[command(subcommand)]
    Map(MapCommand),
}

#[derive(Subcommand, Debug)]
enum BindingsCommand {
    /// List bound names in order
    List(ListArgs),

    /// Show the value bound to a name
    Get(GetArgs),
}

#[derive(Subcommand, Debug)]
enum MapCommand {
    /// List entries under a prefix
    List(MapArgs),

    /// Count entries under a prefix (walks the whole collection)
    Size(MapArgs),
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let opts = &cli.opts;

    match cli.command {
        Command::Init => commands::init::cmd_init(opts),
        Command::Status => commands::status::cmd_status(opts),
        Command::Bindings(cmd) => match cmd {
            BindingsCommand::List(args) => commands::bindings::cmd_list(opts, &args),
            BindingsCommand::Get(args) => commands::bindings::cmd_get(opts, &args),
        },
        Command::Map(cmd) => match cmd {
            MapCommand::List(args) => commands::map::cmd_list(opts, &args),
            MapCommand::Size(args) => commands::map::cmd_size(opts, &args),
        },
    }
}

/// Log to stderr, filtered by `RUST_LOG` (default: warnings only).
fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
