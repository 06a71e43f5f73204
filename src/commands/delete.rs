use crate::args;
use crate::commands;
use crate::errors::*;
use crate::model::Revision;
use crate::repo::Engine;
use std::path::Path;

pub async fn run(config_path: &Path, args: &args::Delete) -> Result<()> {
    let repos = commands::load_repos(config_path)?;
    let config = commands::find_repo(&repos, &args.repo)?.clone();
    let mut engine = Engine::init(config).await?;

    let target = args.revision.map(Revision);
    engine.delete(target, args.force).await?;
    match target {
        Some(revision) => info!("{}: deleted revision {revision}", args.repo),
        None => info!("{}: deleted all revisions", args.repo),
    }
    Ok(())
}
