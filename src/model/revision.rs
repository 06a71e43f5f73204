use chrono::{DateTime, Utc};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// A revision id: the Unix epoch second at which it was allocated.
/// Immutable once created; ids are strictly monotonic within a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revision(pub u64);

impl Revision {
    /// Capture the current epoch second as a fresh revision id.
    pub fn new() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before the epoch")
            .as_secs();
        Revision(secs)
    }

    pub fn id(&self) -> u64 {
        self.0
    }

    /// `YYYY-M-D h:m:s` formatting of the id interpreted as epoch seconds.
    pub fn timestamp(&self) -> String {
        let dt: DateTime<Utc> = DateTime::from_timestamp(self.0 as i64, 0).unwrap_or_default();
        format!(
            "{}-{}-{} {}:{}:{}",
            dt.format("%Y"),
            dt.format("%-m"),
            dt.format("%-d"),
            dt.format("%-H"),
            dt.format("%-M"),
            dt.format("%-S"),
        )
    }
}

impl Default for Revision {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Revision {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Revision(s.parse()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_formatting() {
        let rev = Revision(1700000000);
        assert_eq!(rev.timestamp(), "2023-11-14 22:13:20");
    }

    #[test]
    fn test_from_str() {
        let rev: Revision = "1700000000".parse().unwrap();
        assert_eq!(rev, Revision(1700000000));
    }

    #[test]
    fn test_ordering_is_by_id() {
        assert!(Revision(1700000000) < Revision(1700000100));
    }
}
