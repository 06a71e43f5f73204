use crate::errors::*;
use serde::Deserialize;
use std::path::Path;

/// Parsed `repomd.xml`, with the bytes it was parsed from retained
/// alongside so the index can be persisted byte-identically (downstream
/// clients rely on an exact checksum match against the original).
#[derive(Debug, Clone)]
pub struct Index {
    pub revision: String,
    pub data: Vec<Data>,
    pub raw: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Data {
    #[serde(rename = "type")]
    pub data_type: String,
    pub location: Location,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(rename = "open-size", default)]
    pub open_size: Option<u64>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub checksum: Option<Checksum>,
    #[serde(rename = "open-checksum", default)]
    pub open_checksum: Option<Checksum>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Checksum {
    #[serde(rename = "type")]
    pub checksum_type: String,
    #[serde(rename = "$value")]
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Location {
    pub href: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct RawIndex {
    revision: String,
    #[serde(rename = "data", default)]
    data: Vec<Data>,
}

impl Index {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| Error::Config(format!("repomd.xml is not valid utf-8: {e}")))?;
        let raw: RawIndex = serde_xml_rs::from_str(text)?;
        Ok(Index {
            revision: raw.revision,
            data: raw.data,
            raw: bytes.to_vec(),
        })
    }

    pub fn find_location(&self, data_type: &str) -> Result<&str> {
        self.data
            .iter()
            .find(|e| e.data_type == data_type)
            .map(|e| e.location.href.as_str())
            .ok_or_else(|| Error::Config(format!("repomd.xml has no `{data_type}` data entry")))
    }

    pub fn find_primary_location(&self) -> Result<&str> {
        self.find_location("primary")
    }

    /// Two indexes are equivalent iff their `revision` strings match.
    pub fn equivalent(&self, other: &Index) -> bool {
        self.revision == other.revision
    }

    /// Write the retained raw bytes to `path` verbatim.
    pub async fn save(&self, path: &Path) -> Result<()> {
        tokio::fs::write(path, &self.raw).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<repomd xmlns="http://linux.duke.edu/metadata/repo" xmlns:rpm="http://linux.duke.edu/metadata/rpm">
  <revision>1712990641</revision>
  <data type="primary">
    <checksum type="sha256">fa72c03d43e9ffe131633347045c0c56fbeacbd3281b2b03a6351f487218a158</checksum>
    <open-checksum type="sha256">259d84fce5ecb46226a21765561539eb992fff76356df088f9ed3d1d3d44cd28</open-checksum>
    <location href="repodata/fa72c03d43e9ffe131633347045c0c56fbeacbd3281b2b03a6351f487218a158-primary.xml.gz"/>
    <timestamp>1712990625</timestamp>
    <size>7587566</size>
    <open-size>49907129</open-size>
  </data>
  <data type="filelists">
    <checksum type="sha256">caf9e9202dbd97fcf4da6ca3f228fd459505f0b17d37fb387240b03c8dc0e84a</checksum>
    <open-checksum type="sha256">a35a9e10b149715434f405d3b5f3a895699d9a2939adb3435358337194bad323</open-checksum>
    <location href="repodata/caf9e9202dbd97fcf4da6ca3f228fd459505f0b17d37fb387240b03c8dc0e84a-filelists.xml.gz"/>
    <timestamp>1712990625</timestamp>
    <size>2013585</size>
    <open-size>7783810</open-size>
  </data>
</repomd>
"#;

    #[test]
    fn test_parse_repomd() {
        let index = Index::from_bytes(SAMPLE.as_bytes()).unwrap();
        assert_eq!(index.revision, "1712990641");
        assert_eq!(index.data.len(), 2);
        assert_eq!(
            index.find_primary_location().unwrap(),
            "repodata/fa72c03d43e9ffe131633347045c0c56fbeacbd3281b2b03a6351f487218a158-primary.xml.gz"
        );
    }

    #[test]
    fn test_raw_bytes_round_trip() {
        let index = Index::from_bytes(SAMPLE.as_bytes()).unwrap();
        assert_eq!(index.raw, SAMPLE.as_bytes());
    }

    #[test]
    fn test_equivalence_by_revision_only() {
        let a = Index::from_bytes(SAMPLE.as_bytes()).unwrap();
        let mut modified = SAMPLE.replace(
            "caf9e9202dbd97fcf4da6ca3f228fd459505f0b17d37fb387240b03c8dc0e84a-filelists.xml.gz",
            "deadbeef-filelists.xml.gz",
        );
        modified = modified.replace(
            "caf9e9202dbd97fcf4da6ca3f228fd459505f0b17d37fb387240b03c8dc0e84a",
            "deadbeef",
        );
        let b = Index::from_bytes(modified.as_bytes()).unwrap();
        assert!(a.equivalent(&b));

        let bumped = SAMPLE.replace("1712990641", "1712990999");
        let c = Index::from_bytes(bumped.as_bytes()).unwrap();
        assert!(!a.equivalent(&c));
    }

    #[test]
    fn test_missing_primary_is_an_error() {
        let no_primary = SAMPLE.replace(r#"type="primary""#, r#"type="other""#);
        let index = Index::from_bytes(no_primary.as_bytes()).unwrap();
        assert!(index.find_primary_location().is_err());
    }
}
