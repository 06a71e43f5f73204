use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(version)]
pub struct Args {
    /// Increase logging output (can be used multiple times)
    #[arg(short, long, global = true, action(ArgAction::Count))]
    pub verbose: u8,
    /// Path to the repositories.yaml configuration file
    #[arg(short, long, global = true, env = "RRST_CONFIG")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub subcommand: SubCommand,
}

#[derive(Debug, Subcommand)]
pub enum SubCommand {
    Status(Status),
    List(List),
    Update(Update),
    Tag(Tag),
    Diff(Diff),
    Delete(Delete),
    Server(Server),
    Create(Create),
}

/// Show revisions and tags for one or all configured repositories
#[derive(Debug, Parser)]
pub struct Status {
    pub repo: Option<String>,
}

/// List package versions for a tag or a set of revisions
#[derive(Debug, Parser)]
pub struct List {
    pub repo: String,
    pub selectors: Vec<String>,
}

/// Sync a repository against its upstream (remote mode) or local file tree
#[derive(Debug, Parser)]
pub struct Update {
    pub repo: Option<String>,
    /// Materialize a specific already-fetched revision id instead of syncing upstream
    pub revision: Option<u64>,
}

/// Point a tag at a revision
#[derive(Debug, Parser)]
pub struct Tag {
    pub repo: String,
    pub name: String,
    pub revision: u64,
    #[arg(long)]
    pub force: bool,
}

/// Show the package version differences between two or more selectors
#[derive(Debug, Parser)]
pub struct Diff {
    pub repo: String,
    pub selectors: Vec<String>,
}

/// Remove a revision (or all revisions) from a repository
#[derive(Debug, Parser)]
pub struct Delete {
    pub repo: String,
    pub revision: Option<u64>,
    #[arg(long)]
    pub force: bool,
}

/// Run the HTTP mirroring server
#[derive(Debug, Parser)]
pub struct Server {
    #[arg(short, long, env = "RRST_PORT", default_value_t = 8080)]
    pub port: u16,
}

/// Reserved for future use
#[derive(Debug, Parser)]
pub struct Create {}
