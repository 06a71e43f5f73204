use crate::config::{self, RepositoryConfig};
use crate::entitlement::{suse::SuseResolver, NullResolver, Resolver};
use crate::errors::*;
use crate::fetch;
use crate::metadata::{primary::Primary, repomd::Index};
use crate::model::tag::{TagTable, LATEST};
use crate::model::Revision;
use std::collections::BTreeSet;
use std::path::Path;

/// Outcome of `Update`: whether a new revision was materialized or an
/// existing one was reused because upstream hadn't changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisionState {
    Unchanged(Revision),
    Created(Revision),
    /// The repository is disabled; `Update` is a no-op.
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagOutcome {
    Unchanged,
    Updated,
}

#[derive(Debug, Default)]
pub struct VersionTable {
    pub columns: Vec<String>,
    pub rows: Vec<(String, Vec<String>)>,
}

/// The Repository Engine: sync pipeline, revision/tag mutation, and
/// read-side queries over a single repository's content tree.
pub struct Engine {
    config: RepositoryConfig,
    resolver: Box<dyn Resolver>,
    revisions: Vec<Revision>,
    tags: TagTable,
}

impl Engine {
    pub async fn init(config: RepositoryConfig) -> Result<Self> {
        for dir in [
            &config.files_dir,
            &config.metadata_dir,
            &config.tags_dir,
            &config.tmp_dir,
        ] {
            fetch::create_dir_private(dir).await?;
        }

        let resolver: Box<dyn Resolver> = match &config.provider {
            Some(provider) if provider.name.eq_ignore_ascii_case("suse") => {
                let literal = provider
                    .variables
                    .get("regcode")
                    .cloned()
                    .ok_or_else(|| Error::Config(format!("provider {:?} has no regcode variable", provider.id)))?;
                let reg_code = config::expand_credential(&literal)?;
                Box::new(SuseResolver::new(reg_code, &config.tmp_dir)?)
            }
            Some(provider) => {
                return Err(Error::Config(format!(
                    "unknown provider kind {:?} for provider {:?}",
                    provider.name, provider.id
                )))
            }
            None => Box::new(NullResolver),
        };

        let mut engine = Engine {
            config,
            resolver,
            revisions: Vec::new(),
            tags: TagTable::new(),
        };
        engine.refresh_state().await?;
        Ok(engine)
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn has_revisions(&self) -> bool {
        !self.revisions.is_empty()
    }

    pub fn last_updated(&self) -> Option<Revision> {
        self.revisions.iter().max().copied()
    }

    pub fn revisions(&self) -> &[Revision] {
        &self.revisions
    }

    pub fn tags(&self) -> &TagTable {
        &self.tags
    }

    /// Rebuild the in-memory revision and tag sets from what's actually on
    /// disk: every `metadata/<suffix>/<id>/` whose name parses as an
    /// integer is a revision; every symlink under `tags/<suffix>/` names a
    /// tag pointing at the revision its target's basename parses to.
    pub async fn refresh_state(&mut self) -> Result<()> {
        let mut revisions = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.config.metadata_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Ok(id) = entry.file_name().to_string_lossy().parse::<u64>() {
                revisions.push(Revision(id));
            }
        }
        revisions.sort();

        let mut tags = TagTable::new();
        let mut entries = tokio::fs::read_dir(&self.config.tags_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let meta = tokio::fs::symlink_metadata(&path).await?;
            if !meta.file_type().is_symlink() {
                continue;
            }
            let target = tokio::fs::read_link(&path).await?;
            let Some(basename) = target.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Ok(id) = basename.parse::<u64>() else {
                continue;
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            tags.link(&name, Revision(id));
        }

        self.revisions = revisions;
        self.tags = tags;
        Ok(())
    }

    fn revision_dir(&self, revision: Revision) -> std::path::PathBuf {
        self.config.metadata_dir.join(revision.to_string())
    }

    async fn load_index(&self, revision: Revision) -> Result<Index> {
        let path = self.revision_dir(revision).join("repodata/repomd.xml");
        let bytes = tokio::fs::read(&path).await?;
        Index::from_bytes(&bytes)
    }

    async fn load_primary(&self, revision: Revision) -> Result<Primary> {
        let index = self.load_index(revision).await?;
        let href = index.find_primary_location()?;
        let path = self.revision_dir(revision).join(href);
        let file = tokio::fs::File::open(&path).await?;
        let reader = tokio::io::BufReader::new(file);
        Primary::from_gzip_reader(reader).await
    }

    /// Resolve a CLI-facing selector that may name a tag or a bare
    /// revision id.
    pub fn resolve_selector(&self, selector: &str) -> Result<Revision> {
        if let Some(revision) = self.tags.get(selector) {
            return Ok(revision);
        }
        let revision: Revision = selector
            .parse()
            .map_err(|_| Error::RevisionNotFound(selector.to_string()))?;
        if self.revisions.contains(&revision) {
            Ok(revision)
        } else {
            Err(Error::RevisionNotFound(selector.to_string()))
        }
    }

    fn next_fresh_revision(&self) -> Revision {
        let mut candidate = Revision::new();
        while self.revisions.contains(&candidate) {
            candidate = Revision(candidate.id() + 1);
        }
        candidate
    }

    async fn retarget_latest_if_newest(&mut self, revision: Revision) -> Result<()> {
        if self.last_updated() == Some(revision) {
            self.tag(LATEST, revision, true).await?;
        }
        Ok(())
    }

    fn signed_url(&self, base: &str, secret: &Option<String>) -> String {
        match secret {
            Some(secret) => format!("{base}?{secret}"),
            None => base.to_string(),
        }
    }

    pub async fn update(&mut self, explicit: Option<Revision>) -> Result<RevisionState> {
        if !self.config.enabled {
            return Ok(RevisionState::Disabled);
        }
        if self.config.is_local() {
            self.update_local().await
        } else {
            self.update_remote(explicit).await
        }
    }

    async fn update_remote(&mut self, explicit: Option<Revision>) -> Result<RevisionState> {
        let base_url = self
            .config
            .remote_uri
            .as_deref()
            .unwrap()
            .trim_end_matches('/')
            .to_string();

        if let Some(revision) = explicit {
            if !self.revisions.contains(&revision) {
                return Err(Error::RevisionNotFound(revision.to_string()));
            }
            self.materialize_payloads_from_disk(&base_url, revision)
                .await?;
            return Ok(RevisionState::Unchanged(revision));
        }

        let client = fetch::http_client()?;
        let secret = self.resolver.resolve(&base_url).await?;

        let repomd_url = self.signed_url(&format!("{base_url}/repodata/repomd.xml"), &secret);
        let resp = fetch::proxy_get(&client, &repomd_url).await?;
        let bytes = resp.bytes().await?;
        let fetched = Index::from_bytes(&bytes)?;

        if let Some(latest) = self.last_updated() {
            // A crash mid-Update can leave `latest` as a `Materializing`
            // revision with a missing or truncated `repomd.xml`. Treat
            // that as "not equivalent" rather than aborting the Update --
            // the revision below will either be a fresh allocation or, if
            // nothing actually changed upstream, will collide with retries
            // on the next run.
            if let Ok(local) = self.load_index(latest).await {
                if local.equivalent(&fetched) {
                    self.materialize_payloads_from_disk(&base_url, latest)
                        .await?;
                    return Ok(RevisionState::Unchanged(latest));
                }
            }
        }

        let revision = self.next_fresh_revision();
        let revision_dir = self.revision_dir(revision);
        let repodata_dir = revision_dir.join("repodata");
        fetch::create_dir_private(&repodata_dir).await?;
        fetched.save(&repodata_dir.join("repomd.xml")).await?;

        for data in &fetched.data {
            let url = self.signed_url(&format!("{base_url}/{}", data.location.href), &secret);
            let dest = revision_dir.join(&data.location.href);
            fetch::get_file(&client, &url, &dest).await?;
        }

        self.revisions.push(revision);

        let primary = self.load_primary(revision).await?;
        for pkg in &primary.packages {
            let dest = self.config.files_dir.join(&pkg.location.href);
            if matches!(tokio::fs::metadata(&dest).await, Ok(meta) if meta.is_file()) {
                continue;
            }
            let url = self.signed_url(&format!("{base_url}/{}", pkg.location.href), &secret);
            fetch::get_file(&client, &url, &dest).await?;
        }

        self.retarget_latest_if_newest(revision).await?;
        Ok(RevisionState::Created(revision))
    }

    /// Re-download (or confirm presence of) every payload referenced by an
    /// already-materialized revision, used when the caller passes an
    /// explicit revision id to `Update`.
    async fn materialize_payloads_from_disk(&self, base_url: &str, revision: Revision) -> Result<()> {
        let client = fetch::http_client()?;
        let secret = self.resolver.resolve(base_url).await?;
        let primary = self.load_primary(revision).await?;
        for pkg in &primary.packages {
            let dest = self.config.files_dir.join(&pkg.location.href);
            if matches!(tokio::fs::metadata(&dest).await, Ok(meta) if meta.is_file()) {
                continue;
            }
            let url = self.signed_url(&format!("{base_url}/{}", pkg.location.href), &secret);
            fetch::get_file(&client, &url, &dest).await?;
        }
        Ok(())
    }

    async fn update_local(&mut self) -> Result<RevisionState> {
        let mut on_disk = BTreeSet::new();
        for entry in walkdir::WalkDir::new(&self.config.files_dir)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.path().extension().and_then(|e| e.to_str()) != Some("rpm") {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(&self.config.files_dir) {
                on_disk.insert(rel.to_string_lossy().into_owned());
            }
        }

        if on_disk.is_empty() {
            return Err(Error::NoLocalContent);
        }

        let newest = self.last_updated();
        let refresh_required = match newest {
            None => true,
            Some(revision) => {
                let primary = self.load_primary(revision).await?;
                let recorded: BTreeSet<String> = primary
                    .packages
                    .iter()
                    .map(|pkg| pkg.location.href.clone())
                    .collect();
                recorded != on_disk
            }
        };

        if !refresh_required {
            return Ok(RevisionState::Unchanged(newest.unwrap()));
        }

        let revision = self.next_fresh_revision();
        let revision_dir = self.revision_dir(revision);
        fetch::create_dir_private(&revision_dir).await?;

        let status = tokio::process::Command::new("createrepo_c")
            .arg("-v")
            .arg(&revision_dir)
            .arg(&self.config.files_dir)
            .status()
            .await?;
        if !status.success() {
            return Err(Error::ExternalTool {
                tool: "createrepo_c".to_string(),
                status,
            });
        }

        self.revisions.push(revision);
        self.retarget_latest_if_newest(revision).await?;
        Ok(RevisionState::Created(revision))
    }

    pub async fn tag(&mut self, name: &str, revision: Revision, _force: bool) -> Result<TagOutcome> {
        if !config::is_valid_tag_name(name) {
            return Err(Error::InvalidTagName(name.to_string()));
        }
        if !self.revisions.contains(&revision) {
            return Err(Error::RevisionNotFound(revision.to_string()));
        }
        if self.tags.get(name) == Some(revision) {
            return Ok(TagOutcome::Unchanged);
        }

        let link_path = self.config.tags_dir.join(name);
        if tokio::fs::symlink_metadata(&link_path).await.is_ok() {
            tokio::fs::remove_file(&link_path).await?;
        }
        symlink(&self.revision_dir(revision), &link_path)?;

        self.tags.link(name, revision);
        Ok(TagOutcome::Updated)
    }

    pub async fn delete(&mut self, target: Option<Revision>, _force: bool) -> Result<()> {
        let targets: Vec<Revision> = match target {
            Some(revision) => vec![revision],
            None => self.revisions.clone(),
        };

        for revision in &targets {
            for name in self.tags.tags_of(*revision).into_iter().map(str::to_string).collect::<Vec<_>>() {
                let link_path = self.config.tags_dir.join(&name);
                let _ = tokio::fs::remove_file(&link_path).await;
            }
            self.tags.unlink_all_pointing_at(*revision);

            let revision_dir = self.revision_dir(*revision);
            if revision_dir.exists() {
                tokio::fs::remove_dir_all(&revision_dir).await?;
            }
            self.revisions.retain(|r| r != revision);
        }

        if let Some(newest) = self.last_updated() {
            if self.tags.get(LATEST) != Some(newest) {
                self.tag(LATEST, newest, true).await?;
            }
        }

        Ok(())
    }

    async fn build_version_table(&self, selectors: &[String]) -> Result<VersionTable> {
        let mut maps = Vec::with_capacity(selectors.len());
        for selector in selectors {
            let revision = self.resolve_selector(selector)?;
            maps.push(self.load_primary(revision).await?.version_map());
        }

        let mut keys: BTreeSet<String> = BTreeSet::new();
        for map in &maps {
            keys.extend(map.keys().cloned());
        }

        let rows = keys
            .into_iter()
            .map(|key| {
                let values = maps
                    .iter()
                    .map(|m| m.get(&key).cloned().unwrap_or_else(|| "-".to_string()))
                    .collect();
                (key, values)
            })
            .collect();

        Ok(VersionTable {
            columns: selectors.to_vec(),
            rows,
        })
    }

    pub async fn package_versions(&self, selectors: &[String]) -> Result<VersionTable> {
        self.build_version_table(selectors).await
    }

    /// Like `package_versions` but rows where every slot is identical are
    /// dropped -- nothing changed, nothing to show.
    pub async fn diff(&self, selectors: &[String]) -> Result<VersionTable> {
        let mut table = self.build_version_table(selectors).await?;
        table
            .rows
            .retain(|(_, values)| !values.windows(2).all(|w| w[0] == w[1]));
        Ok(table)
    }
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepositoryConfig;
    use tempfile::TempDir;

    async fn fresh_engine(tmp: &TempDir) -> Engine {
        let root = tmp.path();
        let suffix = "x".to_string();
        let config = RepositoryConfig {
            id: "1".to_string(),
            name: "test".to_string(),
            enabled: true,
            remote_uri: None,
            provider: None,
            suffix: suffix.clone(),
            include_patterns: vec![],
            max_tags_to_keep: None,
            files_dir: root.join("files").join(&suffix),
            metadata_dir: root.join("metadata").join(&suffix),
            tags_dir: root.join("tags").join(&suffix),
            tmp_dir: root.join("tmp").join(&suffix),
        };
        Engine::init(config).await.unwrap()
    }

    #[tokio::test]
    async fn test_init_creates_directories() {
        let tmp = TempDir::new().unwrap();
        let engine = fresh_engine(&tmp).await;
        assert!(engine.config().files_dir.is_dir());
        assert!(engine.config().metadata_dir.is_dir());
        assert!(engine.config().tags_dir.is_dir());
        assert!(engine.config().tmp_dir.is_dir());
        assert!(!engine.has_revisions());
    }

    #[tokio::test]
    async fn test_local_mode_empty_is_no_local_content() {
        let tmp = TempDir::new().unwrap();
        let mut engine = fresh_engine(&tmp).await;
        let err = engine.update(None).await.unwrap_err();
        assert!(matches!(err, Error::NoLocalContent));
    }

    #[tokio::test]
    async fn test_tag_rejects_invalid_name() {
        let tmp = TempDir::new().unwrap();
        let mut engine = fresh_engine(&tmp).await;
        tokio::fs::create_dir_all(engine.config().metadata_dir.join("1700000000"))
            .await
            .unwrap();
        engine.refresh_state().await.unwrap();
        let err = engine
            .tag("has space", Revision(1700000000), false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTagName(_)));
    }

    #[tokio::test]
    async fn test_tag_rejects_unknown_revision() {
        let tmp = TempDir::new().unwrap();
        let mut engine = fresh_engine(&tmp).await;
        let err = engine.tag("stable", Revision(1), false).await.unwrap_err();
        assert!(matches!(err, Error::RevisionNotFound(_)));
    }

    #[tokio::test]
    async fn test_tag_creates_symlink() {
        let tmp = TempDir::new().unwrap();
        let mut engine = fresh_engine(&tmp).await;
        tokio::fs::create_dir_all(engine.config().metadata_dir.join("1700000000"))
            .await
            .unwrap();
        engine.refresh_state().await.unwrap();
        let outcome = engine.tag("stable", Revision(1700000000), false).await.unwrap();
        assert_eq!(outcome, TagOutcome::Updated);
        let link = engine.config().tags_dir.join("stable");
        assert!(tokio::fs::symlink_metadata(&link).await.is_ok());

        let repeat = engine.tag("stable", Revision(1700000000), false).await.unwrap();
        assert_eq!(repeat, TagOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_delete_unlinks_tags_and_retargets_latest() {
        let tmp = TempDir::new().unwrap();
        let mut engine = fresh_engine(&tmp).await;
        tokio::fs::create_dir_all(engine.config().metadata_dir.join("1700000000"))
            .await
            .unwrap();
        tokio::fs::create_dir_all(engine.config().metadata_dir.join("1700000100"))
            .await
            .unwrap();
        engine.refresh_state().await.unwrap();
        engine.tag(LATEST, Revision(1700000000), false).await.unwrap();
        engine.tag(LATEST, Revision(1700000100), false).await.unwrap();

        engine.delete(Some(Revision(1700000100)), false).await.unwrap();
        assert_eq!(engine.tags().get(LATEST), Some(Revision(1700000000)));
        assert!(!engine.revisions().contains(&Revision(1700000100)));
    }
}
