//! Parsing, de-duplication, and rendering of extracted changelog entries.
//!
//! Completion responses arrive as loosely formatted Markdown: `### ` category
//! headers with `- ` bullets under them. Entries from all batches are pooled
//! per category, near-duplicates are collapsed keeping the most detailed
//! text, and the result is rendered with a fixed category ordering.

use once_cell::sync::Lazy;
use regex::Regex;

/// Fixed Keep-a-Changelog category ordering; any other category follows in
/// first-seen order.
pub const CATEGORY_ORDER: [&str; 6] = [
    "Added",
    "Changed",
    "Deprecated",
    "Removed",
    "Fixed",
    "Security",
];

const ADD_VERBS: [&str; 4] = ["added", "introduced", "created", "implemented"];
const CHANGE_VERBS: [&str; 8] = [
    "updated",
    "modified",
    "changed",
    "enhanced",
    "improved",
    "refactored",
    "revised",
    "adjusted",
];
const FIX_VERBS: [&str; 3] = ["fixed", "resolved", "corrected"];
const REMOVE_VERBS: [&str; 3] = ["removed", "deleted", "eliminated"];

// File paths referenced as "in helpers/logger.js", "to src/app.js" and so on.
static FILE_COMPONENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:in|to|from|for)\s+([a-zA-Z0-9_/-]+\.[a-zA-Z0-9]+)").expect("valid pattern")
});

// Component names in backticks, e.g. "`TeamMatcher`" or "`get_team_data()`".
static BACKTICK_COMPONENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"`([^`]+)`").expect("valid pattern"));

// Object of a leading verb, e.g. "Added getTeamMatchScore function".
static LEADING_VERB_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:Added|Introduced|Created|Updated|Modified|Changed|Enhanced|Improved|Fixed|Resolved|Corrected|Removed|Deleted|Deprecated)\s+([a-zA-Z0-9_]+)",
    )
    .expect("valid pattern")
});

/// Verb class used to judge whether two entries describe the same action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionClass {
    /// Something new was introduced
    Add,
    /// Existing behavior was altered
    Change,
    /// A defect was corrected
    Fix,
    /// Something was taken away
    Remove,
}

const ACTION_GROUPS: [(ActionClass, &[&str]); 4] = [
    (ActionClass::Add, &ADD_VERBS),
    (ActionClass::Change, &CHANGE_VERBS),
    (ActionClass::Fix, &FIX_VERBS),
    (ActionClass::Remove, &REMOVE_VERBS),
];

fn action_mask(text: &str) -> u8 {
    let lower = text.to_lowercase();
    let mut mask = 0;
    for (bit, (_, verbs)) in ACTION_GROUPS.iter().enumerate() {
        if verbs.iter().any(|verb| lower.contains(verb)) {
            mask |= 1 << bit;
        }
    }
    mask
}

/// Returns the first action class whose verbs appear in the entry text.
#[must_use]
pub fn primary_action(text: &str) -> Option<ActionClass> {
    let lower = text.to_lowercase();
    ACTION_GROUPS
        .iter()
        .find(|(_, verbs)| verbs.iter().any(|verb| lower.contains(verb)))
        .map(|(class, _)| *class)
}

/// Extracts the file or component an entry is about, if any.
///
/// Rules are tried in order: a file path following in/to/from/for, then a
/// backticked span, then the object of a leading verb.
#[must_use]
pub fn extract_component(entry: &str) -> Option<String> {
    let text = entry.trim().strip_prefix("- ").unwrap_or(entry.trim()).trim();

    if let Some(caps) = FILE_COMPONENT_RE.captures(text) {
        return Some(caps[1].to_string());
    }
    if let Some(caps) = BACKTICK_COMPONENT_RE.captures(text) {
        return Some(caps[1].to_string());
    }
    LEADING_VERB_RE
        .captures(text)
        .map(|caps| caps[1].to_string())
}

/// Judges whether two entries are near-duplicates: identical text, or the
/// same component with verbs from the same action class.
#[must_use]
pub fn is_similar(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }

    match (extract_component(a), extract_component(b)) {
        (Some(ca), Some(cb)) if ca == cb => action_mask(a) & action_mask(b) != 0,
        _ => false,
    }
}

/// One extracted changelog category label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Category {
    /// `### Added`
    Added,
    /// `### Changed`
    Changed,
    /// `### Deprecated`
    Deprecated,
    /// `### Removed`
    Removed,
    /// `### Fixed`
    Fixed,
    /// `### Security`
    Security,
    /// Any other label the extractor produced
    Other(String),
}

impl Category {
    /// Parses a category from a `### ` header label.
    #[must_use]
    pub fn parse(label: &str) -> Self {
        match label {
            "Added" => Self::Added,
            "Changed" => Self::Changed,
            "Deprecated" => Self::Deprecated,
            "Removed" => Self::Removed,
            "Fixed" => Self::Fixed,
            "Security" => Self::Security,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns the display name of the category.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Added => "Added",
            Self::Changed => "Changed",
            Self::Deprecated => "Deprecated",
            Self::Removed => "Removed",
            Self::Fixed => "Fixed",
            Self::Security => "Security",
            Self::Other(name) => name,
        }
    }

    /// Returns true for the six standard Keep-a-Changelog categories.
    #[must_use]
    pub const fn is_standard(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

/// Accumulates bullet entries per category across batch outputs, suppressing
/// near-duplicates as they are inserted.
#[derive(Debug, Default)]
pub struct EntryAccumulator {
    categories: Vec<(Category, Vec<String>)>,
}

impl EntryAccumulator {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scans one raw text block and records its categorized bullets.
    ///
    /// `### ` opens a category; `- ` lines under an open category are taken
    /// verbatim. Comment lines and bullets outside any category are ignored.
    /// A bullet similar to an already recorded entry of the same category
    /// replaces it when longer, otherwise it is dropped.
    pub fn absorb(&mut self, block: &str) {
        let mut current: Option<usize> = None;

        for raw_line in block.lines() {
            let line = raw_line.trim();

            if line.starts_with("<!--") {
                continue;
            }

            if let Some(label) = line.strip_prefix("### ") {
                current = Some(self.category_index(Category::parse(label.trim())));
            } else if line.starts_with("- ") {
                if let Some(idx) = current {
                    self.insert(idx, line);
                }
            }
        }
    }

    /// Returns true if no entries were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.categories.iter().all(|(_, entries)| entries.is_empty())
    }

    /// Consolidates grouped near-duplicates and renders the category blocks.
    ///
    /// The six standard categories come first in their fixed order, then any
    /// other categories in first-seen order. Empty categories are omitted.
    #[must_use]
    pub fn render(mut self) -> String {
        for (_, entries) in &mut self.categories {
            *entries = consolidate(std::mem::take(entries));
        }

        let mut out: Vec<String> = Vec::new();
        for name in CATEGORY_ORDER {
            if let Some((category, entries)) = self
                .categories
                .iter()
                .find(|(c, _)| c.is_standard() && c.name() == name)
            {
                push_block(&mut out, category.name(), entries);
            }
        }
        for (category, entries) in &self.categories {
            if !category.is_standard() {
                push_block(&mut out, category.name(), entries);
            }
        }

        out.join("\n").trim().to_string()
    }

    fn category_index(&mut self, category: Category) -> usize {
        if let Some(idx) = self.categories.iter().position(|(c, _)| *c == category) {
            return idx;
        }
        self.categories.push((category, Vec::new()));
        self.categories.len() - 1
    }

    fn insert(&mut self, idx: usize, candidate: &str) {
        let entries = &mut self.categories[idx].1;

        for existing in entries.iter_mut() {
            if is_similar(existing, candidate) {
                if char_len(candidate) > char_len(existing) {
                    *existing = candidate.to_string();
                }
                return;
            }
        }

        entries.push(candidate.to_string());
    }
}

/// Pools several raw text blocks and renders the merged, de-duplicated
/// category blocks.
#[must_use]
pub fn merge_blocks<'a, I>(blocks: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut accumulator = EntryAccumulator::new();
    for block in blocks {
        accumulator.absorb(block);
    }
    accumulator.render()
}

fn push_block(out: &mut Vec<String>, name: &str, entries: &[String]) {
    if entries.is_empty() {
        return;
    }
    out.push(format!("### {name}"));
    out.push(String::new());
    out.extend(entries.iter().cloned());
    out.push(String::new());
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupAction {
    Class(ActionClass),
    Other,
}

/// Collapses surviving entries that share a component and action class,
/// keeping the longest text; first occurrence wins ties. Entries without an
/// extractable component are never merged. Original order is preserved.
fn consolidate(entries: Vec<String>) -> Vec<String> {
    if entries.len() <= 1 {
        return entries;
    }

    let mut groups: Vec<(String, Vec<(usize, GroupAction)>)> = Vec::new();
    let mut ungrouped: Vec<usize> = Vec::new();

    for (idx, entry) in entries.iter().enumerate() {
        let Some(component) = extract_component(entry) else {
            ungrouped.push(idx);
            continue;
        };

        let action = primary_action(entry).map_or(GroupAction::Other, GroupAction::Class);
        match groups.iter_mut().find(|(c, _)| *c == component) {
            Some((_, members)) => members.push((idx, action)),
            None => groups.push((component, vec![(idx, action)])),
        }
    }

    let mut kept: Vec<usize> = Vec::new();
    for (_, members) in &groups {
        let mut buckets: Vec<(GroupAction, Vec<usize>)> = Vec::new();
        for (idx, action) in members {
            match buckets.iter_mut().find(|(a, _)| a == action) {
                Some((_, idxs)) => idxs.push(*idx),
                None => buckets.push((*action, vec![*idx])),
            }
        }

        for (_, idxs) in &buckets {
            let mut best = idxs[0];
            for &idx in &idxs[1..] {
                if char_len(&entries[idx]) > char_len(&entries[best]) {
                    best = idx;
                }
            }
            kept.push(best);
        }
    }

    kept.extend(ungrouped);
    kept.sort_unstable();
    kept.into_iter().map(|idx| entries[idx].clone()).collect()
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_from_file_path() {
        assert_eq!(
            extract_component("- Added JWT validation in auth/middleware.js"),
            Some("auth/middleware.js".to_string())
        );
        assert_eq!(
            extract_component("- Moved retry logic to src/api.rs"),
            Some("src/api.rs".to_string())
        );
    }

    #[test]
    fn test_component_from_backticks() {
        assert_eq!(
            extract_component("- Tweaked `TeamMatcher` scoring weights"),
            Some("TeamMatcher".to_string())
        );
    }

    #[test]
    fn test_component_from_leading_verb() {
        assert_eq!(
            extract_component("- Added getTeamMatchScore function"),
            Some("getTeamMatchScore".to_string())
        );
        assert_eq!(
            extract_component("- fixed race condition handling"),
            Some("race".to_string())
        );
    }

    #[test]
    fn test_component_absent() {
        assert_eq!(extract_component("- Minor cleanups"), None);
    }

    #[test]
    fn test_similarity_same_component_same_action() {
        assert!(is_similar(
            "- Added JWT validation in auth/middleware.js",
            "- Introduced JWT token check in auth/middleware.js"
        ));
    }

    #[test]
    fn test_similarity_rejects_different_action() {
        assert!(!is_similar(
            "- Added logging in helpers/logger.js",
            "- Fixed crash in helpers/logger.js"
        ));
    }

    #[test]
    fn test_similarity_rejects_different_component() {
        assert!(!is_similar(
            "- Updated caching in helpers/cache.js",
            "- Updated caching in helpers/logger.js"
        ));
    }

    #[test]
    fn test_duplicate_collapses_to_longer_entry() {
        let mut acc = EntryAccumulator::new();
        acc.absorb(
            "### Added\n\n- Added JWT validation in auth/middleware.js\n- Introduced JWT token check in auth/middleware.js",
        );
        let rendered = acc.render();

        assert_eq!(
            rendered,
            "### Added\n\n- Introduced JWT token check in auth/middleware.js"
        );
    }

    #[test]
    fn test_category_order_is_fixed() {
        let mut acc = EntryAccumulator::new();
        acc.absorb("### Fixed\n- Fixed crash in a.js\n### Performance\n- Reduced allocations during parsing\n### Added\n- Added feature in b.js\n### Security\n- Hardened token storage in c.js");
        let rendered = acc.render();

        let order: Vec<usize> = ["### Added", "### Fixed", "### Security", "### Performance"]
            .iter()
            .map(|h| rendered.find(*h).unwrap())
            .collect();
        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(order, sorted, "rendered order wrong: {rendered}");
    }

    #[test]
    fn test_bullets_outside_category_are_ignored() {
        let mut acc = EntryAccumulator::new();
        acc.absorb("- stray bullet\nSome prose\n### Added\n- Added parser in x.js");
        let rendered = acc.render();
        assert!(!rendered.contains("stray"));
        assert!(rendered.contains("- Added parser in x.js"));
    }

    #[test]
    fn test_comment_lines_are_skipped() {
        let mut acc = EntryAccumulator::new();
        acc.absorb("<!-- Batch 1: Commits abc1234..def5678 -->\n### Added\n- Added parser in x.js");
        assert!(!acc.render().contains("Batch"));
    }

    #[test]
    fn test_merge_across_blocks_dedups_exact() {
        let merged = merge_blocks([
            "### Fixed\n- Fixed cache eviction in helpers/cache.js",
            "### Fixed\n- Fixed cache eviction in helpers/cache.js",
        ]);
        assert_eq!(merged.matches("cache eviction").count(), 1);
    }

    #[test]
    fn test_consolidation_merges_unclassified_same_component() {
        // No action verbs, so insertion keeps both; consolidation collapses.
        let merged = merge_blocks([
            "### Changed\n- Docs for helpers/logger.js\n- Documentation touchups for helpers/logger.js",
        ]);
        assert_eq!(
            merged,
            "### Changed\n\n- Documentation touchups for helpers/logger.js"
        );
    }

    #[test]
    fn test_entries_without_component_never_merge() {
        let merged = merge_blocks(["### Changed\n- Some cleanup work\n- More cleanup work"]);
        assert!(merged.contains("- Some cleanup work"));
        assert!(merged.contains("- More cleanup work"));
    }

    #[test]
    fn test_insertion_order_preserved_within_category() {
        let merged = merge_blocks([
            "### Added\n- Added parser in parse.js\n- Added writer in write.js\n- Added reader in read.js",
        ]);
        let parser = merged.find("parser").unwrap();
        let writer = merged.find("writer").unwrap();
        let reader = merged.find("reader").unwrap();
        assert!(parser < writer && writer < reader);
    }

    #[test]
    fn test_empty_input_renders_empty() {
        assert_eq!(merge_blocks(Vec::<&str>::new()), "");
        assert!(EntryAccumulator::new().is_empty());
    }
}
