use crate::errors::*;
use async_compression::tokio::bufread::GzipDecoder;
use serde::Deserialize;
use std::collections::HashMap;
use tokio::io::{self, AsyncReadExt};

/// The gzipped primary package index referenced from `repomd.xml` with
/// `type="primary"`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Primary {
    #[serde(rename = "package", default)]
    pub packages: Vec<Package>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Package {
    pub name: String,
    #[serde(default)]
    pub arch: String,
    pub version: Version,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Version {
    #[serde(default)]
    pub epoch: String,
    pub ver: String,
    pub rel: String,
}

impl Version {
    pub fn ver_rel(&self) -> String {
        format!("{}-{}", self.ver, self.rel)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Location {
    pub href: String,
}

impl Primary {
    pub fn from_xml(xml: &str) -> Result<Self> {
        let parsed = serde_xml_rs::from_str(xml)?;
        Ok(parsed)
    }

    /// Decode a gzip-compressed primary index stream in full.
    pub async fn from_gzip_reader<R>(reader: R) -> Result<Self>
    where
        R: io::AsyncBufRead + Unpin,
    {
        let mut decoder = GzipDecoder::new(reader);
        let mut buf = String::new();
        decoder.read_to_string(&mut buf).await?;
        Self::from_xml(&buf)
    }

    /// `"<name>.<arch>" -> "ver-rel"`, last-wins on duplicate keys within
    /// this index (matches primary-index iteration order, per `spec.md`
    /// §4.E's tie-break rule for `PackageVersions`/`Diff`).
    pub fn version_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::with_capacity(self.packages.len());
        for pkg in &self.packages {
            map.insert(format!("{}.{}", pkg.name, pkg.arch), pkg.version.ver_rel());
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata xmlns="http://linux.duke.edu/metadata/common" xmlns:rpm="http://linux.duke.edu/metadata/rpm" packages="1">
<package type="rpm">
  <name>a</name>
  <arch>x86_64</arch>
  <version epoch="0" ver="1.0" rel="1"/>
  <checksum type="sha256" pkgid="YES">deadbeef</checksum>
  <location href="a-1.0-1.x86_64.rpm"/>
</package>
</metadata>
"#;

    #[test]
    fn test_parse_primary() {
        let md = Primary::from_xml(SAMPLE).unwrap();
        assert_eq!(md.packages.len(), 1);
        let pkg = &md.packages[0];
        assert_eq!(pkg.name, "a");
        assert_eq!(pkg.version.ver_rel(), "1.0-1");
        assert_eq!(pkg.location.href, "a-1.0-1.x86_64.rpm");
    }

    #[test]
    fn test_version_map() {
        let md = Primary::from_xml(SAMPLE).unwrap();
        let map = md.version_map();
        assert_eq!(map.get("a.x86_64"), Some(&"1.0-1".to_string()));
    }

    #[test]
    fn test_version_map_last_wins_on_duplicate() {
        let doubled = SAMPLE.replace(
            "</metadata>",
            r#"<package type="rpm">
  <name>a</name>
  <arch>x86_64</arch>
  <version epoch="0" ver="2.0" rel="1"/>
  <location href="a-2.0-1.x86_64.rpm"/>
</package>
</metadata>"#,
        );
        let md = Primary::from_xml(&doubled).unwrap();
        let map = md.version_map();
        assert_eq!(map.get("a.x86_64"), Some(&"2.0-1".to_string()));
    }
}
