use crate::args;
use crate::commands;
use crate::errors::*;
use crate::model::Revision;
use crate::repo::{Engine, TagOutcome};
use std::path::Path;

pub async fn run(config_path: &Path, args: &args::Tag) -> Result<()> {
    let repos = commands::load_repos(config_path)?;
    let config = commands::find_repo(&repos, &args.repo)?.clone();
    let mut engine = Engine::init(config).await?;

    match engine.tag(&args.name, Revision(args.revision), args.force).await? {
        TagOutcome::Updated => info!("{}: {} -> {}", args.repo, args.name, args.revision),
        TagOutcome::Unchanged => info!("{}: {} already -> {}", args.repo, args.name, args.revision),
    }
    Ok(())
}
