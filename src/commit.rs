//! Parsing of the exported commit log into discrete commit records.
//!
//! The log is produced externally by `git log` with a custom marker format:
//! each commit opens with a `=== COMMIT: <hash>|<subject>|<date>|<refs>===`
//! line followed by free-form diff text up to the next marker. Records appear
//! newest-first; downstream version mapping relies on that order.

/// Marker prefix that introduces each commit block in the exported log.
pub const COMMIT_MARKER: &str = "=== COMMIT:";

/// A single commit block parsed from the exported log.
///
/// Immutable once parsed. The raw block text (marker line included) is kept
/// verbatim so batches can forward the exact diff to the completion service.
#[derive(Debug, Clone)]
pub struct CommitRecord {
    /// Full commit hash, absent when the marker line carried no usable hash
    pub id: Option<String>,

    /// Commit subject line
    pub subject: String,

    /// Commit date field, as exported
    pub date: String,

    /// Ref decorations (branches and `tag: ...` entries)
    pub refs: String,

    /// Everything after the marker line, typically the diff
    pub body: String,

    raw: String,
}

impl CommitRecord {
    /// Returns the 7-character short identifier, if the record has an id.
    #[must_use]
    pub fn short_id(&self) -> Option<&str> {
        self.id.as_deref().map(|id| &id[..id.len().min(7)])
    }

    /// Returns the exact block text as it appeared in the log.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Returns the block size in characters, the unit of the batch ceiling.
    #[must_use]
    pub fn char_len(&self) -> usize {
        self.raw.chars().count()
    }

    fn from_block(block: String) -> Self {
        let (first_line, body) = match block.split_once('\n') {
            Some((line, rest)) => (line, rest.to_string()),
            None => (block.as_str(), String::new()),
        };

        let mut record = Self {
            id: None,
            subject: String::new(),
            date: String::new(),
            refs: String::new(),
            body,
            raw: String::new(),
        };

        if let Some(fields) = first_line.strip_prefix(COMMIT_MARKER) {
            let fields = fields.trim_end().trim_end_matches("===");
            let mut parts = fields.split('|');

            record.id = parts.next().map(str::trim).filter(|h| is_hash(h)).map(String::from);
            record.subject = parts.next().unwrap_or("").trim().to_string();
            record.date = parts.next().unwrap_or("").trim().to_string();
            record.refs = parts.next().unwrap_or("").trim().to_string();
        }

        record.raw = block;
        record
    }
}

fn is_hash(candidate: &str) -> bool {
    !candidate.is_empty() && candidate.chars().all(|c| c.is_ascii_hexdigit())
}

/// Splits a raw commit log into records, one per marker line.
///
/// Text before the first marker (or a marker with no parseable hash) still
/// yields a record so nothing is dropped from the history; such records carry
/// no identifier and are skipped by stages that need one.
#[must_use]
pub fn parse_commit_log(text: &str) -> Vec<CommitRecord> {
    let mut records = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.starts_with(COMMIT_MARKER) {
            if !current.is_empty() {
                records.push(CommitRecord::from_block(current.join("\n")));
            }
            current = vec![line];
        } else if !current.is_empty() || !line.trim().is_empty() {
            current.push(line);
        }
    }

    if !current.is_empty() {
        records.push(CommitRecord::from_block(current.join("\n")));
    }

    records
}
