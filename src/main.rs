pub mod args;
pub mod commands;
pub mod config;
pub mod entitlement;
pub mod errors;
pub mod fetch;
pub mod metadata;
pub mod model;
pub mod repo;
pub mod serve;

use crate::args::{Args, SubCommand};
use crate::errors::*;
use clap::Parser;
use env_logger::Env;
use std::path::PathBuf;

const DEFAULT_CONFIG_PATH: &str = "repositories.yaml";

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let log_level = match args.verbose {
        0 => "revmirror=info",
        1 => "info,revmirror=debug",
        2 => "debug",
        3 => "debug,revmirror=trace",
        _ => "trace",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    match args.subcommand {
        SubCommand::Status(sub) => commands::status::run(&config_path, &sub).await,
        SubCommand::List(sub) => commands::list::run(&config_path, &sub).await,
        SubCommand::Update(sub) => commands::update::run(&config_path, &sub).await,
        SubCommand::Tag(sub) => commands::tag::run(&config_path, &sub).await,
        SubCommand::Diff(sub) => commands::diff::run(&config_path, &sub).await,
        SubCommand::Delete(sub) => commands::delete::run(&config_path, &sub).await,
        SubCommand::Server(sub) => commands::server::run(&config_path, &sub).await,
        SubCommand::Create(sub) => commands::create::run(&sub).await,
    }
}
