use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "proptree",
    about = "proptree: path-keyed metadata with upward change propagation",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the HTTP server
    Serve(ServeArgs),
    /// Issue a bearer token signed with the shared secret
    Token(TokenArgs),
    /// Show the record at a path
    Get(GetArgs),
    /// Write a record and propagate the change
    Put(PutArgs),
    /// Remove a path and its subtree
    Rm(RmArgs),
    /// Move a path and its subtree
    Mv(MvArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// TOML config file; PROPTREE_* environment variables are used otherwise
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Args)]
pub struct TokenArgs {
    /// User name to put in the token subject
    pub user: String,
    /// Token lifetime in seconds
    #[arg(long)]
    pub ttl: Option<u64>,
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Where the direct store commands operate.
#[derive(Args)]
pub struct StoreArgs {
    /// Store DSN (`memory`, `sqlite:...`); defaults to PROPTREE_DSN
    #[arg(long)]
    pub dsn: Option<String>,
}

#[derive(Args)]
pub struct GetArgs {
    pub path: String,
    /// Create an empty record if none exists
    #[arg(long)]
    pub force: bool,
    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Args)]
pub struct PutArgs {
    pub path: String,
    #[arg(long, default_value = "")]
    pub checksum: String,
    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Args)]
pub struct RmArgs {
    pub path: String,
    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Args)]
pub struct MvArgs {
    pub src: String,
    pub dst: String,
    #[command(flatten)]
    pub store: StoreArgs,
}
