pub mod create;
pub mod delete;
pub mod diff;
pub mod list;
pub mod server;
pub mod status;
pub mod tag;
pub mod update;

use crate::config::{self, RepositoryConfig};
use crate::errors::*;
use std::path::Path;

/// Load the configured repositories, discarding the resolved content root
/// (each `RepositoryConfig` already carries its own derived paths).
pub fn load_repos(config_path: &Path) -> Result<Vec<RepositoryConfig>> {
    let (_content_root, repos) = config::load(config_path)?;
    Ok(repos)
}

/// Find a repository by its configured name or id.
pub fn find_repo<'a>(repos: &'a [RepositoryConfig], needle: &str) -> Result<&'a RepositoryConfig> {
    repos
        .iter()
        .find(|r| r.name == needle || r.id == needle)
        .ok_or_else(|| Error::Config(format!("no such repository: {needle:?}")))
}
