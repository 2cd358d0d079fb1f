//! Version tags and the commit-to-version mapping.
//!
//! Versions are `vMAJOR.MINOR.PATCH` strings (an optional suffix such as
//! `-rc1` is kept as part of the tag). Release dates come from an externally
//! supplied tag table, not from the commits themselves.

use crate::commit::CommitRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static VERSION_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"tag:\s*(v\d+\.\d+\.\d+[^,)]*)").expect("valid version tag pattern"));

/// Extracts the first version tag from a ref-decoration string.
///
/// Decorations look like `HEAD -> main, tag: v0.6.2, origin/main`; only
/// `tag:` entries matching the version pattern count.
#[must_use]
pub fn version_tag_in_refs(refs: &str) -> Option<String> {
    VERSION_TAG_RE
        .captures(refs)
        .map(|caps| caps[1].trim().to_string())
}

/// Tag -> release date table, parsed from `vX.Y.Z: YYYY-MM-DD` lines.
#[derive(Debug, Clone, Default)]
pub struct TagDates {
    entries: Vec<(String, String)>,
}

impl TagDates {
    /// Parses the raw table text. Lines without a colon are ignored; a
    /// repeated tag keeps its last date.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let mut entries: Vec<(String, String)> = Vec::new();

        for line in raw.lines() {
            let Some((tag, date)) = line.split_once(':') else {
                continue;
            };
            let tag = tag.trim();
            let date = date.trim();
            if tag.is_empty() {
                continue;
            }

            match entries.iter_mut().find(|(t, _)| t == tag) {
                Some((_, existing)) => *existing = date.to_string(),
                None => entries.push((tag.to_string(), date.to_string())),
            }
        }

        Self { entries }
    }

    /// Returns the release date recorded for a tag.
    #[must_use]
    pub fn date_of(&self, tag: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(t, _)| t == tag)
            .map(|(_, d)| d.as_str())
    }

    /// Returns all tags ordered by release date, newest first.
    ///
    /// Ties keep their table order, so the display order is deterministic.
    #[must_use]
    pub fn tags_newest_first(&self) -> Vec<&str> {
        let mut pairs: Vec<&(String, String)> = self.entries.iter().collect();
        pairs.sort_by(|a, b| b.1.cmp(&a.1));
        pairs.iter().map(|(t, _)| t.as_str()).collect()
    }

    /// Returns true if the table has no tags.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Mapping from commit id to the released version it belongs to.
///
/// `None` means the commit sits above the newest tag and is unreleased.
#[derive(Debug, Clone, Default)]
pub struct CommitVersionMap {
    map: HashMap<String, Option<String>>,
}

impl CommitVersionMap {
    /// Builds the map from records in log order (newest first).
    ///
    /// A tagged commit is assigned its own tag, and that tag then propagates
    /// to every following untagged commit until the next tagged commit is
    /// seen. Commits before the first tag in scan order stay unreleased.
    #[must_use]
    pub fn build(records: &[CommitRecord]) -> Self {
        let mut map = HashMap::new();
        let mut pending: Option<String> = None;

        for record in records {
            let Some(id) = record.id.as_deref() else {
                continue;
            };

            if let Some(tag) = version_tag_in_refs(&record.refs) {
                map.insert(id.to_string(), Some(tag.clone()));
                pending = Some(tag);
            } else {
                map.insert(id.to_string(), pending.clone());
            }
        }

        Self { map }
    }

    /// Returns the version a commit belongs to, or `None` when the commit is
    /// unreleased or unknown.
    #[must_use]
    pub fn version_of(&self, id: &str) -> Option<&str> {
        self.map.get(id).and_then(|v| v.as_deref())
    }

    /// Returns true if the commit id was seen while building the map.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.map.contains_key(id)
    }

    /// Number of distinct released versions present in the history.
    #[must_use]
    pub fn version_count(&self) -> usize {
        let mut versions: Vec<&str> = self.map.values().filter_map(|v| v.as_deref()).collect();
        versions.sort_unstable();
        versions.dedup();
        versions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::parse_commit_log;

    fn record_log(entries: &[(&str, &str)]) -> Vec<CommitRecord> {
        let text = entries
            .iter()
            .map(|(hash, refs)| format!("=== COMMIT: {hash}|subject|2025-01-01|{refs}===\ndiff"))
            .collect::<Vec<_>>()
            .join("\n");
        parse_commit_log(&text)
    }

    #[test]
    fn test_version_tag_extraction() {
        assert_eq!(
            version_tag_in_refs("HEAD -> main, tag: v0.6.2, origin/main"),
            Some("v0.6.2".to_string())
        );
        assert_eq!(
            version_tag_in_refs("tag: v1.2.3-rc1"),
            Some("v1.2.3-rc1".to_string())
        );
        assert_eq!(version_tag_in_refs("HEAD -> main"), None);
        assert_eq!(version_tag_in_refs("tag: nightly"), None);
    }

    #[test]
    fn test_first_tag_wins_on_multi_tagged_commit() {
        assert_eq!(
            version_tag_in_refs("tag: v2.0.0, tag: v1.9.9"),
            Some("v2.0.0".to_string())
        );
    }

    #[test]
    fn test_tag_assignment_propagates_forward() {
        // Newest first: c1 carries v2, c3 carries v1.
        let records = record_log(&[
            ("c1c1c1c1", "tag: v2.0.0"),
            ("c2c2c2c2", ""),
            ("c3c3c3c3", "tag: v1.0.0"),
            ("c4c4c4c4", ""),
        ]);
        let map = CommitVersionMap::build(&records);

        assert_eq!(map.version_of("c1c1c1c1"), Some("v2.0.0"));
        assert_eq!(map.version_of("c2c2c2c2"), Some("v2.0.0"));
        assert_eq!(map.version_of("c3c3c3c3"), Some("v1.0.0"));
        assert_eq!(map.version_of("c4c4c4c4"), Some("v1.0.0"));
        assert_eq!(map.version_count(), 2);
    }

    #[test]
    fn test_commits_above_newest_tag_are_unreleased() {
        let records = record_log(&[
            ("aaaa1111", ""),
            ("bbbb2222", "tag: v0.6.2"),
            ("cccc3333", ""),
        ]);
        let map = CommitVersionMap::build(&records);

        assert_eq!(map.version_of("aaaa1111"), None);
        assert!(map.contains("aaaa1111"));
        assert_eq!(map.version_of("bbbb2222"), Some("v0.6.2"));
        assert_eq!(map.version_of("cccc3333"), Some("v0.6.2"));
    }

    #[test]
    fn test_records_without_id_are_skipped() {
        let log = "=== COMMIT: |bad|2025-01-01|tag: v1.0.0===\ndiff";
        let map = CommitVersionMap::build(&parse_commit_log(log));
        assert_eq!(map.version_count(), 0);
    }

    #[test]
    fn test_tag_dates_parsing_and_order() {
        let table = "v0.6.2: 2025-12-02\nv0.5.0: 2025-10-01\nv0.6.1: 2025-11-15\n\nnot a line";
        let dates = TagDates::parse(table);

        assert_eq!(dates.date_of("v0.6.2"), Some("2025-12-02"));
        assert_eq!(dates.date_of("v0.4.0"), None);
        assert_eq!(
            dates.tags_newest_first(),
            vec!["v0.6.2", "v0.6.1", "v0.5.0"]
        );
    }

    #[test]
    fn test_tag_dates_same_day_keeps_table_order() {
        let table = "v0.6.2: 2025-12-02\nv0.6.1: 2025-12-02";
        let dates = TagDates::parse(table);
        assert_eq!(dates.tags_newest_first(), vec!["v0.6.2", "v0.6.1"]);
    }

    #[test]
    fn test_tag_dates_empty() {
        assert!(TagDates::parse("").is_empty());
    }
}
