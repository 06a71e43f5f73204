use crate::args;
use crate::commands;
use crate::errors::*;
use crate::model::Revision;
use crate::repo::{Engine, RevisionState};
use std::path::Path;

pub async fn run(config_path: &Path, args: &args::Update) -> Result<()> {
    let repos = commands::load_repos(config_path)?;
    if repos.is_empty() {
        println!("No repositories configured");
        return Ok(());
    }

    let explicit = args.revision.map(Revision);
    match &args.repo {
        Some(name) => {
            let config = commands::find_repo(&repos, name)?.clone();
            update_one(config, explicit).await?;
        }
        None => {
            for config in repos {
                update_one(config, None).await?;
            }
        }
    }
    Ok(())
}

async fn update_one(config: crate::config::RepositoryConfig, explicit: Option<Revision>) -> Result<()> {
    let name = config.name.clone();
    let mut engine = Engine::init(config).await?;
    match engine.update(explicit).await? {
        RevisionState::Created(revision) => info!("{name}: created revision {revision}"),
        RevisionState::Unchanged(revision) => info!("{name}: unchanged at revision {revision}"),
        RevisionState::Disabled => info!("{name}: disabled, skipped"),
    }
    Ok(())
}
