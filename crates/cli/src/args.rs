pub use clap::Parser;

use std::path::PathBuf;

use store::OwnerId;

#[derive(Parser, Debug)]
#[command(name = "doctree")]
#[command(about = "Versioned multi-tenant file tree over SQLite and object storage")]
pub struct Args {
    /// Path to the doctree state directory (defaults to ~/.doctree)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    /// Act as this owner instead of the configured one
    #[arg(long, global = true)]
    pub owner: Option<OwnerId>,

    #[command(subcommand)]
    pub command: crate::Command,
}
