//! The changelog document: parsing, idempotence markers, and assembly.
//!
//! Documents follow the Keep-a-Changelog layout: a fixed header, an optional
//! `## [Unreleased]` section, then one `## [vX.Y.Z] - date` section per
//! release, newest first. Sections that received generated content carry a
//! `<!-- Processed commits: ... -->` marker listing the commit ids that
//! produced them, which is what makes re-runs converge instead of duplicating
//! content.

use crate::version::TagDates;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

const HEADER: [&str; 7] = [
    "# Changelog",
    "",
    "All notable changes to this project will be documented in this file.",
    "",
    "The format is based on [Keep a Changelog](https://keepachangelog.com/en/1.0.0/),",
    "and this project adheres to [Semantic Versioning](https://semver.org/spec/v2.0.0.html).",
    "",
];

static PROCESSED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<!-- Processed commits: ([^>]+) -->").expect("valid pattern"));

// Marker written by earlier tooling, recognized for backwards compatibility.
static LEGACY_BATCH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<!-- Batch \d+: Commits ([a-f0-9]+)\.\.([a-f0-9]+)").expect("valid pattern")
});

/// Deduplicated entry text and contributing commit ids for one section.
#[derive(Debug, Clone, Default)]
pub struct SectionContent {
    /// Rendered category blocks, empty when extraction yielded nothing
    pub entries: String,

    /// Full ids of the commits this content was generated from
    pub commit_ids: BTreeSet<String>,
}

/// One `## [...]` section of a parsed document, body kept verbatim.
#[derive(Debug, Clone)]
pub struct Section {
    /// The full heading line, e.g. `## [v0.6.2] - 2025-12-02`
    pub heading: String,

    /// Body lines up to the next section heading
    pub lines: Vec<String>,
}

impl Section {
    /// Returns true for the `## [Unreleased]` pseudo-version section.
    #[must_use]
    pub fn is_unreleased(&self) -> bool {
        self.heading.starts_with("## [Unreleased]")
    }
}

/// A parsed changelog document.
#[derive(Debug, Clone, Default)]
pub struct Changelog {
    /// Lines before the first section heading, preserved verbatim on merge
    pub header: Vec<String>,

    /// Sections in document order
    pub sections: Vec<Section>,
}

impl Changelog {
    /// Parses a document into header and sections.
    #[must_use]
    pub fn parse(content: &str) -> Self {
        let mut header = Vec::new();
        let mut sections: Vec<Section> = Vec::new();

        for line in content.lines() {
            if line.starts_with("## [") {
                sections.push(Section {
                    heading: line.to_string(),
                    lines: Vec::new(),
                });
            } else if let Some(section) = sections.last_mut() {
                section.lines.push(line.to_string());
            } else {
                header.push(line.to_string());
            }
        }

        Self { header, sections }
    }

    /// Renders the document back to text.
    #[must_use]
    pub fn render(&self) -> String {
        let mut lines: Vec<&str> = self.header.iter().map(String::as_str).collect();
        for section in &self.sections {
            lines.push(&section.heading);
            lines.extend(section.lines.iter().map(String::as_str));
        }
        lines.join("\n")
    }
}

/// Collects every commit id mentioned by a processed-commits marker, current
/// or legacy format, anywhere in the document.
#[must_use]
pub fn candidate_processed_ids(content: &str) -> BTreeSet<String> {
    let mut ids = BTreeSet::new();

    for caps in PROCESSED_RE.captures_iter(content) {
        for id in caps[1].split(',') {
            let id = id.trim();
            if !id.is_empty() {
                ids.insert(id.to_string());
            }
        }
    }

    for caps in LEGACY_BATCH_RE.captures_iter(content) {
        ids.insert(caps[1].to_string());
        ids.insert(caps[2].to_string());
    }

    ids
}

/// Resolves candidate marker ids against the ids present in current history.
///
/// A candidate resolves when some history id equals it or extends it (markers
/// may carry 7-character short ids); the resolved full id is returned. Stale
/// candidates from rewritten history resolve to nothing and are dropped, so
/// those commits get reprocessed.
#[must_use]
pub fn resolve_processed_ids(
    candidates: &BTreeSet<String>,
    history_ids: &BTreeSet<String>,
) -> BTreeSet<String> {
    candidates
        .iter()
        .filter_map(|candidate| {
            history_ids
                .iter()
                .find(|full| full.starts_with(candidate.as_str()))
                .cloned()
        })
        .collect()
}

fn processed_marker(ids: &BTreeSet<String>) -> String {
    let list = ids.iter().cloned().collect::<Vec<_>>().join(",");
    format!("<!-- Processed commits: {list} -->")
}

/// Builds complete documents and merges generated content into existing ones.
#[derive(Debug, Clone)]
pub struct Assembler<'a> {
    tag_dates: &'a TagDates,
    date: &'a str,
}

impl<'a> Assembler<'a> {
    /// Creates an assembler over the known tag table and run date.
    #[must_use]
    pub const fn new(tag_dates: &'a TagDates, date: &'a str) -> Self {
        Self { tag_dates, date }
    }

    /// Builds a complete document from scratch: fixed header, Unreleased
    /// first, then one section per known version tag, newest release first.
    ///
    /// A version with tracked commits but no extracted text still gets its
    /// marker plus a placeholder entry, so it is not reprocessed forever; a
    /// version with no commits at all gets a bare placeholder.
    #[must_use]
    pub fn build_full(
        &self,
        unreleased: Option<&SectionContent>,
        versions: &BTreeMap<String, SectionContent>,
    ) -> String {
        let mut lines: Vec<String> = HEADER.iter().map(ToString::to_string).collect();

        if let Some(content) = unreleased.filter(|c| !c.entries.is_empty()) {
            lines.push("## [Unreleased]".to_string());
            lines.push(String::new());
            push_content(&mut lines, content);
        }

        for tag in self.tag_dates.tags_newest_first() {
            let date = self.tag_dates.date_of(tag).unwrap_or(self.date);
            lines.push(format!("## [{tag}] - {date}"));
            lines.push(String::new());

            match versions.get(tag) {
                Some(content) if !content.entries.is_empty() => {
                    push_content(&mut lines, content);
                }
                Some(content) if !content.commit_ids.is_empty() => {
                    lines.push(processed_marker(&content.commit_ids));
                    lines.push(String::new());
                    lines.push("### Changed".to_string());
                    lines.push("- Version release (no detailed changes extracted)".to_string());
                    lines.push(String::new());
                }
                _ => {
                    lines.push("### Changed".to_string());
                    lines.push("- Version release".to_string());
                    lines.push(String::new());
                }
            }
        }

        lines.join("\n")
    }

    /// Merges generated content into an existing document.
    ///
    /// The existing header is preserved verbatim. The old Unreleased section
    /// is replaced by the freshly built one (the new run is authoritative for
    /// unreleased content). On a release run the new version section is
    /// inserted immediately after Unreleased. Every other existing section is
    /// carried through unchanged, in its original position.
    #[must_use]
    pub fn merge_into(
        &self,
        existing: &str,
        unreleased: Option<&SectionContent>,
        release: Option<(&str, Option<&SectionContent>)>,
    ) -> String {
        let document = Changelog::parse(existing);
        let mut lines: Vec<String> = document.header.clone();

        if let Some(content) = unreleased.filter(|c| !c.entries.is_empty()) {
            lines.push("## [Unreleased]".to_string());
            lines.push(String::new());
            push_content(&mut lines, content);
        }

        if let Some((version, content)) = release {
            lines.push(format!("## [{version}] - {}", self.date));
            lines.push(String::new());
            if let Some(content) = content.filter(|c| !c.entries.is_empty()) {
                push_content(&mut lines, content);
            }
        }

        for section in document.sections.iter().filter(|s| !s.is_unreleased()) {
            lines.push(section.heading.clone());
            lines.extend(section.lines.iter().cloned());
        }

        lines.join("\n")
    }

}

fn push_content(lines: &mut Vec<String>, content: &SectionContent) {
    if !content.commit_ids.is_empty() {
        lines.push(processed_marker(&content.commit_ids));
        lines.push(String::new());
    }
    lines.push(content.entries.clone());
    lines.push(String::new());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(ToString::to_string).collect()
    }

    fn content(entries: &str, commit_ids: &[&str]) -> SectionContent {
        SectionContent {
            entries: entries.to_string(),
            commit_ids: ids(commit_ids),
        }
    }

    #[test]
    fn test_build_full_orders_versions_newest_first() {
        let dates = TagDates::parse("v0.5.0: 2025-10-01\nv0.6.2: 2025-12-02");
        let assembler = Assembler::new(&dates, "2025-12-10");

        let mut versions = BTreeMap::new();
        versions.insert(
            "v0.6.2".to_string(),
            content("### Added\n\n- Added parser in x.js", &["aaa111"]),
        );

        let doc = assembler.build_full(
            Some(&content("### Fixed\n\n- Fixed crash in y.js", &["bbb222"])),
            &versions,
        );

        assert!(doc.starts_with("# Changelog"));
        let unreleased = doc.find("## [Unreleased]").unwrap();
        let newer = doc.find("## [v0.6.2] - 2025-12-02").unwrap();
        let older = doc.find("## [v0.5.0] - 2025-10-01").unwrap();
        assert!(unreleased < newer && newer < older);

        assert!(doc.contains("<!-- Processed commits: aaa111 -->"));
        assert!(doc.contains("<!-- Processed commits: bbb222 -->"));
    }

    #[test]
    fn test_build_full_placeholders() {
        let dates = TagDates::parse("v0.2.0: 2025-02-01\nv0.1.0: 2025-01-01");
        let assembler = Assembler::new(&dates, "2025-03-01");

        // v0.2.0 had commits but extraction produced nothing; v0.1.0 had no
        // commits between tags at all.
        let mut versions = BTreeMap::new();
        versions.insert("v0.2.0".to_string(), content("", &["ccc333"]));

        let doc = assembler.build_full(None, &versions);

        assert!(doc.contains("- Version release (no detailed changes extracted)"));
        assert!(doc.contains("<!-- Processed commits: ccc333 -->"));
        assert!(doc.contains("- Version release\n"));
        assert!(!doc.contains("## [Unreleased]"));
    }

    #[test]
    fn test_candidate_ids_both_marker_formats() {
        let doc = "\
## [Unreleased]
<!-- Processed commits: aaa111,bbb222 -->
- entry
## [v0.1.0] - 2025-01-01
<!-- Batch 3: Commits ccc333..ddd444 | VERSIONS: v0.1.0: ccc333 -->";

        let found = candidate_processed_ids(doc);
        assert_eq!(found, ids(&["aaa111", "bbb222", "ccc333", "ddd444"]));
    }

    #[test]
    fn test_resolve_drops_stale_and_expands_short_ids() {
        let history = ids(&[
            "aaa1117777777777777777777777777777777777",
            "bbb2227777777777777777777777777777777777",
        ]);
        let candidates = ids(&["aaa111", "bbb2227777777777777777777777777777777777", "gone999"]);

        let resolved = resolve_processed_ids(&candidates, &history);
        assert_eq!(
            resolved,
            ids(&[
                "aaa1117777777777777777777777777777777777",
                "bbb2227777777777777777777777777777777777",
            ])
        );
    }

    #[test]
    fn test_merge_replaces_unreleased_and_keeps_released_sections() {
        let existing = "\
# Changelog

Custom intro kept verbatim.

## [Unreleased]

<!-- Processed commits: old111 -->

### Added

- Stale unreleased entry

## [v0.1.0] - 2025-01-01

### Fixed

- Old fix entry";

        let dates = TagDates::default();
        let assembler = Assembler::new(&dates, "2025-03-01");
        let merged = assembler.merge_into(
            existing,
            Some(&content("### Added\n\n- Fresh entry in z.js", &["new222"])),
            None,
        );

        assert!(merged.contains("Custom intro kept verbatim."));
        assert!(merged.contains("- Fresh entry in z.js"));
        assert!(!merged.contains("Stale unreleased entry"));
        assert!(merged.contains("- Old fix entry"));
        assert!(merged.contains("<!-- Processed commits: new222 -->"));
        assert!(!merged.contains("old111"));
    }

    #[test]
    fn test_merge_inserts_release_section_after_unreleased() {
        let existing = "# Changelog\n\n## [v0.1.0] - 2025-01-01\n\n### Fixed\n\n- Old fix";
        let dates = TagDates::default();
        let assembler = Assembler::new(&dates, "2025-03-01");

        let merged = assembler.merge_into(
            existing,
            Some(&content("### Changed\n\n- Leftover work", &["eee555"])),
            Some(("v0.2.0", Some(&content("### Added\n\n- Release entry", &["fff666"])))),
        );

        let unreleased = merged.find("## [Unreleased]").unwrap();
        let release = merged.find("## [v0.2.0] - 2025-03-01").unwrap();
        let old = merged.find("## [v0.1.0] - 2025-01-01").unwrap();
        assert!(unreleased < release && release < old);
    }

    #[test]
    fn test_merge_without_unreleased_drops_old_unreleased() {
        // Release run: everything previously unreleased ships with the tag.
        let existing =
            "# Changelog\n\n## [Unreleased]\n\n- Pending entry\n\n## [v0.1.0] - 2025-01-01\n\n- Old";
        let dates = TagDates::default();
        let assembler = Assembler::new(&dates, "2025-03-01");

        let merged = assembler.merge_into(
            existing,
            None,
            Some(("v0.2.0", Some(&content("### Added\n\n- Shipped", &["abc777"])))),
        );

        assert!(!merged.contains("Pending entry"));
        assert!(merged.contains("## [v0.2.0] - 2025-03-01"));
        assert!(merged.contains("## [v0.1.0] - 2025-01-01"));
    }

    #[test]
    fn test_parse_render_round_trip() {
        let doc = "# Changelog\n\nIntro.\n\n## [Unreleased]\n\n- a\n\n## [v0.1.0] - 2025-01-01\n\n- b";
        assert_eq!(Changelog::parse(doc).render(), doc);
    }

    #[test]
    fn test_parse_sections() {
        let doc = Changelog::parse("# Changelog\n\n## [Unreleased]\n- x\n## [v1.0.0] - 2025-01-01\n- y");
        assert_eq!(doc.header, vec!["# Changelog", ""]);
        assert_eq!(doc.sections.len(), 2);
        assert!(doc.sections[0].is_unreleased());
        assert!(!doc.sections[1].is_unreleased());
    }
}
