//! Grouping of commit records into size-bounded batches for extraction.
//!
//! Batching is greedy and deterministic: records are taken in log order and
//! accumulated while the cumulative character size stays under the ceiling.
//! The ceiling approximates the completion service's token budget at roughly
//! four characters per token.

use crate::commit::CommitRecord;
use crate::version::CommitVersionMap;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// An ordered group of commit blocks under one size ceiling, with the
/// provenance needed to attribute extracted entries back to versions.
#[derive(Debug, Clone)]
pub struct EntryBatch {
    /// Sequential batch index (0-based)
    pub index: usize,

    /// Combined raw commit blocks submitted to the completion service
    pub text: String,

    /// Short id of the first identifiable commit in the batch
    pub first_short: Option<String>,

    /// Short id of the last identifiable commit in the batch
    pub last_short: Option<String>,

    /// Released version -> short ids of the batch commits under it
    pub versions: BTreeMap<String, Vec<String>>,

    /// Full ids of every identifiable commit in the batch, in order
    pub commit_ids: Vec<String>,

    /// Cumulative character size of the batch text
    pub char_size: usize,
}

impl EntryBatch {
    fn from_records(index: usize, records: &[&CommitRecord], map: &CommitVersionMap) -> Self {
        let mut first_short = None;
        let mut last_short = None;
        let mut versions: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut commit_ids = Vec::new();

        for record in records {
            let (Some(id), Some(short)) = (record.id.as_deref(), record.short_id()) else {
                continue;
            };

            if first_short.is_none() {
                first_short = Some(short.to_string());
            }
            last_short = Some(short.to_string());
            commit_ids.push(id.to_string());

            if let Some(version) = map.version_of(id) {
                versions
                    .entry(version.to_string())
                    .or_default()
                    .push(short.to_string());
            }
        }

        let text = records
            .iter()
            .map(|r| r.raw())
            .collect::<Vec<_>>()
            .join("\n\n");
        let char_size = records.iter().map(|r| r.char_len()).sum();

        Self {
            index,
            text,
            first_short,
            last_short,
            versions,
            commit_ids,
            char_size,
        }
    }

    /// Returns the human-readable identity line used in prompts and logs,
    /// e.g. `Commits abc1234..def5678 | VERSIONS: v0.6.2: abc1234,def5678`.
    #[must_use]
    pub fn info_line(&self) -> String {
        let first = self.first_short.as_deref().unwrap_or("unknown");
        let last = self.last_short.as_deref().unwrap_or("unknown");
        let mut line = format!("Commits {first}..{last}");

        if !self.versions.is_empty() {
            let versions = self
                .versions
                .iter()
                .map(|(version, shorts)| format!("{version}: {}", shorts.join(",")))
                .collect::<Vec<_>>()
                .join(" | ");
            line.push_str(&format!(" | VERSIONS: {versions}"));
        }

        line
    }

    /// Returns the number of identifiable commits in this batch.
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.commit_ids.len()
    }

    /// Returns true if every commit in this batch is unreleased.
    #[must_use]
    pub fn is_unreleased(&self) -> bool {
        self.versions.is_empty()
    }
}

/// Splits commit records into batches under a character ceiling.
#[derive(Debug, Clone)]
pub struct Batcher {
    max_chars: usize,
}

impl Batcher {
    /// Creates a batcher with the given character ceiling.
    #[must_use]
    pub const fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    /// Groups records greedily under the ceiling.
    ///
    /// A single record that alone reaches the ceiling is emitted as its own
    /// batch with the text truncated to the ceiling, so one oversized diff
    /// cannot block the run. Output is a pure function of the input order and
    /// the version map.
    #[must_use]
    pub fn split(&self, records: &[CommitRecord], map: &CommitVersionMap) -> Vec<EntryBatch> {
        let mut batches = Vec::new();
        let mut i = 0;

        while i < records.len() {
            let mut members: Vec<&CommitRecord> = Vec::new();
            let mut size = 0;

            while i < records.len() && size + records[i].char_len() < self.max_chars {
                size += records[i].char_len();
                members.push(&records[i]);
                i += 1;
            }

            if members.is_empty() {
                // Single record at or over the ceiling: emit alone, truncated.
                let record = &records[i];
                warn!(
                    "Commit {} is larger than the batch ceiling ({} chars), truncating",
                    record.short_id().unwrap_or("unknown"),
                    record.char_len()
                );

                let mut batch = EntryBatch::from_records(batches.len(), &[record], map);
                batch.text = truncate_chars(&batch.text, self.max_chars);
                batch.char_size = batch.text.chars().count();
                batches.push(batch);
                i += 1;
                continue;
            }

            let batch = EntryBatch::from_records(batches.len(), &members, map);
            debug!(
                "Batch {}: {} commits, {} chars",
                batch.index + 1,
                batch.commit_count(),
                batch.char_size
            );
            batches.push(batch);
        }

        batches
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
