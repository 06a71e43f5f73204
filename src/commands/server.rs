use crate::args;
use crate::commands;
use crate::errors::*;
use crate::serve;
use std::net::SocketAddr;
use std::path::Path;

pub async fn run(config_path: &Path, args: &args::Server) -> Result<()> {
    let repos = commands::load_repos(config_path)?;
    if repos.is_empty() {
        println!("No repositories configured");
        return Ok(());
    }

    let bind_addr: SocketAddr = ([0, 0, 0, 0], args.port).into();
    serve::run(repos, bind_addr).await
}
