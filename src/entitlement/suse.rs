use crate::entitlement::Resolver;
use crate::errors::*;
use crate::fetch;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

const API_URI: &str = "https://scc.suse.com/connect/subscriptions/products.json";
const CACHE_REFRESH: Duration = Duration::from_secs(86_400);

/// Entitlement resolver for the SUSE Customer Center product catalog: a
/// per-URL signed query-string secret looked up in a locally cached
/// products.json, refreshed once a day.
pub struct SuseResolver {
    client: reqwest::Client,
    reg_code: String,
    cache_file: PathBuf,
}

#[derive(Debug, Deserialize)]
struct Product {
    #[serde(rename = "repositories", default)]
    repos: Vec<RepoEntry>,
    #[serde(default)]
    extensions: Vec<Product>,
}

#[derive(Debug, Deserialize)]
struct RepoEntry {
    url: String,
    enabled: bool,
}

impl SuseResolver {
    /// `reg_code` is the already-`${VAR}`-expanded registration code;
    /// `cache_dir` is the repository's `tmp/<suffix>/` scratch directory.
    pub fn new(reg_code: String, cache_dir: &std::path::Path) -> Result<Self> {
        let mut hasher = Sha256::new();
        hasher.update(reg_code.as_bytes());
        let digest = hex::encode(hasher.finalize());
        Ok(SuseResolver {
            client: fetch::http_client()?,
            reg_code,
            cache_file: cache_dir.join(digest),
        })
    }

    async fn is_cache_expired(&self) -> bool {
        match tokio::fs::metadata(&self.cache_file).await {
            Ok(meta) => match meta.modified() {
                Ok(mtime) => match SystemTime::now().duration_since(mtime) {
                    Ok(age) => age > CACHE_REFRESH,
                    Err(_) => false,
                },
                Err(_) => true,
            },
            Err(_) => true,
        }
    }

    async fn refresh_cache(&self) -> Result<()> {
        if let Some(parent) = self.cache_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let resp = self
            .client
            .get(API_URI)
            .header("Authorization", format!("Token token={}", self.reg_code))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::HttpStatus(status));
        }
        let body = resp.bytes().await?;

        let tmp = {
            let mut p = self.cache_file.as_os_str().to_os_string();
            p.push(".part");
            std::path::PathBuf::from(p)
        };
        tokio::fs::write(&tmp, &body).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
        }
        tokio::fs::rename(&tmp, &self.cache_file).await?;
        Ok(())
    }

    async fn products(&self) -> Result<Vec<Product>> {
        let data = tokio::fs::read(&self.cache_file).await?;
        let products = serde_json::from_slice(&data)?;
        Ok(products)
    }

    fn find_secret<'a>(products: &'a [Product], url: &str) -> Option<&'a str> {
        for product in products {
            for repo in &product.repos {
                if !repo.enabled {
                    continue;
                }
                if let Some((base, secret)) = repo.url.split_once("/?") {
                    if base == url {
                        return Some(secret);
                    }
                }
            }
            if let Some(secret) = Self::find_secret(&product.extensions, url) {
                return Some(secret);
            }
        }
        None
    }
}

#[async_trait::async_trait]
impl Resolver for SuseResolver {
    async fn resolve(&self, upstream_url: &str) -> Result<Option<String>> {
        if self.is_cache_expired().await {
            self.refresh_cache().await?;
        }
        let products = self.products().await?;
        Ok(Self::find_secret(&products, upstream_url).map(|s| s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_secret_top_level() {
        let products = vec![Product {
            repos: vec![RepoEntry {
                url: "http://example/repo/?abc123".to_string(),
                enabled: true,
            }],
            extensions: vec![],
        }];
        assert_eq!(
            SuseResolver::find_secret(&products, "http://example/repo"),
            Some("abc123")
        );
    }

    #[test]
    fn test_find_secret_recurses_into_extensions() {
        let products = vec![Product {
            repos: vec![],
            extensions: vec![Product {
                repos: vec![RepoEntry {
                    url: "http://example/repo/?abc123".to_string(),
                    enabled: true,
                }],
                extensions: vec![],
            }],
        }];
        assert_eq!(
            SuseResolver::find_secret(&products, "http://example/repo"),
            Some("abc123")
        );
    }

    #[test]
    fn test_find_secret_ignores_disabled() {
        let products = vec![Product {
            repos: vec![RepoEntry {
                url: "http://example/repo/?abc123".to_string(),
                enabled: false,
            }],
            extensions: vec![],
        }];
        assert_eq!(SuseResolver::find_secret(&products, "http://example/repo"), None);
    }
}
