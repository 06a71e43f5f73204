use crate::model::revision::Revision;
use std::collections::HashMap;

/// The reserved tag name auto-maintained to point at the newest revision.
pub const LATEST: &str = "latest";

/// Tags as a flat table keyed by name, each holding the id of the revision
/// it currently points at. "Tags of revision R" is a filter over this
/// table rather than a back-pointer living on the revision (see
/// DESIGN.md's note on the cyclic-ownership redesign) -- a tag name can
/// therefore never appear against two revisions simultaneously, by
/// construction of the map.
#[derive(Debug, Default, Clone)]
pub struct TagTable {
    entries: HashMap<String, Revision>,
}

impl TagTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Revision> {
        self.entries.get(name).copied()
    }

    /// Point `name` at `revision`, replacing whatever it pointed at before.
    /// Returns true if this actually changed anything.
    pub fn link(&mut self, name: &str, revision: Revision) -> bool {
        match self.entries.get(name) {
            Some(existing) if *existing == revision => false,
            _ => {
                self.entries.insert(name.to_string(), revision);
                true
            }
        }
    }

    pub fn unlink(&mut self, name: &str) -> Option<Revision> {
        self.entries.remove(name)
    }

    /// Every tag name currently pointing at `revision`.
    pub fn tags_of(&self, revision: Revision) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, r)| **r == revision)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Remove every tag pointing at `revision` (used by `Delete`).
    pub fn unlink_all_pointing_at(&mut self, revision: Revision) {
        self.entries.retain(|_, r| *r != revision);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Revision)> {
        self.entries.iter().map(|(name, r)| (name.as_str(), *r))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_and_get() {
        let mut tags = TagTable::new();
        assert!(tags.link("stable", Revision(1)));
        assert_eq!(tags.get("stable"), Some(Revision(1)));
    }

    #[test]
    fn test_relink_is_atomic_from_observer_view() {
        let mut tags = TagTable::new();
        tags.link("stable", Revision(1));
        assert!(tags.link("stable", Revision(2)));
        assert_eq!(tags.get("stable"), Some(Revision(2)));
        // tag never appears against the old revision any more
        assert!(tags.tags_of(Revision(1)).is_empty());
    }

    #[test]
    fn test_relink_to_same_revision_is_noop() {
        let mut tags = TagTable::new();
        tags.link("stable", Revision(1));
        assert!(!tags.link("stable", Revision(1)));
    }

    #[test]
    fn test_unlink_all_pointing_at() {
        let mut tags = TagTable::new();
        tags.link("stable", Revision(1));
        tags.link("latest", Revision(1));
        tags.link("preview", Revision(2));
        tags.unlink_all_pointing_at(Revision(1));
        assert!(tags.get("stable").is_none());
        assert!(tags.get("latest").is_none());
        assert_eq!(tags.get("preview"), Some(Revision(2)));
    }

    #[test]
    fn test_tag_uniqueness_invariant() {
        let mut tags = TagTable::new();
        tags.link("stable", Revision(1));
        tags.link("stable", Revision(2));
        // "stable" can only ever be found under one revision at a time
        assert_eq!(tags.tags_of(Revision(1)), Vec::<&str>::new());
        assert_eq!(tags.tags_of(Revision(2)), vec!["stable"]);
    }
}
