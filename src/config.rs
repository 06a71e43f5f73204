use crate::errors::*;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

fn tag_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+$").unwrap())
}

pub fn is_valid_tag_name(name: &str) -> bool {
    tag_name_re().is_match(name)
}

/// Top level structure of the YAML configuration file (`spec.md` §6).
#[derive(Debug, Deserialize)]
pub struct Document {
    pub global: Global,
    #[serde(default)]
    pub repositories: Vec<RepositoryEntry>,
}

#[derive(Debug, Deserialize)]
pub struct Global {
    pub content_path: PathBuf,
    #[serde(default)]
    pub max_tags_to_keep: Option<u32>,
    #[serde(default)]
    pub providers: Vec<Provider>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Provider {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct RepositoryEntry {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub provider_id: Option<String>,
    #[serde(default)]
    pub remote_uri: Option<String>,
    pub content_suffix_path: String,
    #[serde(default)]
    pub include_patterns: Vec<String>,
    #[serde(default)]
    pub max_tags_to_keep: Option<u32>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// A fully resolved repository, with its four content-root-derived paths
/// and its credential resolved from `${VAR}` indirection if present.
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub remote_uri: Option<String>,
    pub provider: Option<Provider>,
    pub suffix: String,
    pub include_patterns: Vec<Regex>,
    pub max_tags_to_keep: Option<u32>,
    pub files_dir: PathBuf,
    pub metadata_dir: PathBuf,
    pub tags_dir: PathBuf,
    pub tmp_dir: PathBuf,
}

impl RepositoryConfig {
    pub fn is_local(&self) -> bool {
        self.remote_uri.is_none()
    }
}

/// Expand a `${VAR}`-style credential literal by reading it from the
/// environment. A literal with no `${...}` wrapping is returned unchanged.
pub fn expand_credential(value: &str) -> Result<String> {
    if let Some(rest) = value.strip_prefix("${") {
        if let Some(key) = rest.strip_suffix('}') {
            return std::env::var(key).map_err(|_| Error::CredentialMissing(key.to_string()));
        }
    }
    Ok(value.to_string())
}

pub fn load(path: &Path) -> Result<(PathBuf, Vec<RepositoryConfig>)> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
    if text.trim().is_empty() {
        return Err(Error::Config(format!("{} is empty", path.display())));
    }
    let doc: Document = serde_yaml::from_str(&text)?;

    let providers: HashMap<&str, &Provider> =
        doc.global.providers.iter().map(|p| (p.id.as_str(), p)).collect();

    let content_root = if let Ok(over) = std::env::var("RRST_CONTENT_PATH") {
        PathBuf::from(over)
    } else {
        doc.global.content_path.clone()
    };

    let mut repos = Vec::with_capacity(doc.repositories.len());
    for entry in doc.repositories {
        let provider = match &entry.provider_id {
            Some(id) => Some(
                providers
                    .get(id.as_str())
                    .copied()
                    .cloned()
                    .ok_or_else(|| Error::Config(format!("unknown provider_id {id:?}")))?,
            ),
            None => None,
        };

        let mut include_patterns = Vec::with_capacity(entry.include_patterns.len());
        for pattern in &entry.include_patterns {
            let re = Regex::new(pattern)
                .map_err(|e| Error::Config(format!("invalid include pattern {pattern:?}: {e}")))?;
            include_patterns.push(re);
        }

        let max_tags_to_keep = entry.max_tags_to_keep.or(doc.global.max_tags_to_keep);

        let suffix = entry.content_suffix_path.trim_matches('/').to_string();
        repos.push(RepositoryConfig {
            id: entry.id,
            name: entry.name,
            enabled: entry.enabled,
            remote_uri: entry.remote_uri.filter(|s| !s.is_empty()),
            provider,
            files_dir: content_root.join("files").join(&suffix),
            metadata_dir: content_root.join("metadata").join(&suffix),
            tags_dir: content_root.join("tags").join(&suffix),
            tmp_dir: content_root.join("tmp").join(&suffix),
            suffix,
            include_patterns,
            max_tags_to_keep,
        });
    }

    Ok((content_root, repos))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_tag_names() {
        assert!(is_valid_tag_name("latest"));
        assert!(is_valid_tag_name("stable_v1"));
        assert!(!is_valid_tag_name("has space"));
        assert!(!is_valid_tag_name("has-dash"));
    }

    #[test]
    fn test_expand_credential_literal() {
        assert_eq!(expand_credential("plain").unwrap(), "plain");
    }

    #[test]
    fn test_expand_credential_env() {
        unsafe {
            std::env::set_var("REVMIRROR_TEST_REGCODE", "secret123");
        }
        assert_eq!(
            expand_credential("${REVMIRROR_TEST_REGCODE}").unwrap(),
            "secret123"
        );
        unsafe {
            std::env::remove_var("REVMIRROR_TEST_REGCODE");
        }
    }

    #[test]
    fn test_expand_credential_missing() {
        let err = expand_credential("${REVMIRROR_TEST_DOES_NOT_EXIST}").unwrap_err();
        assert!(matches!(err, Error::CredentialMissing(_)));
    }

    #[test]
    fn test_load_minimal_document() {
        let yaml = r#"
global:
  content_path: /srv/mirror
repositories:
  - id: "1"
    name: centos9
    content_suffix_path: centos/9
    remote_uri: "http://example/repo"
"#;
        let doc: Document = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(doc.repositories.len(), 1);
        assert_eq!(doc.repositories[0].content_suffix_path, "centos/9");
        assert!(doc.repositories[0].enabled);
    }
}
