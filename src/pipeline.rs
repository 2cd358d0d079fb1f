use crate::{
    batch::Batcher,
    changelog::{self, Assembler, SectionContent},
    commit::{CommitRecord, parse_commit_log},
    config::Config,
    entry,
    error::{Error, Result},
    extract::{ChatClient, ExtractEntries},
    version::{CommitVersionMap, TagDates},
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Statistics collected during a changelog generation run.
#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
    /// Total commits found in the exported history
    pub total_commits: usize,

    /// Commits skipped because a processed marker already covers them
    pub skipped_commits: usize,

    /// Commits submitted for extraction this run
    pub processed_commits: usize,

    /// Number of batches formed
    pub batches: usize,

    /// Batches that failed extraction and contributed no entries
    pub failed_batches: usize,

    /// Bullet entries present in the written document
    pub entries_written: usize,

    /// Distinct released versions detected in history
    pub versions_in_history: usize,

    /// Whether this run was a release event
    pub release: bool,

    /// Whether the changelog file was (re)written
    pub wrote_changelog: bool,

    /// Total execution time
    pub duration: Duration,

    /// Time spent in completion-service calls
    pub extract_duration: Duration,

    /// Path of the changelog document
    pub output_path: String,
}

impl RunStats {
    /// Prints a human-readable summary to stdout.
    pub fn print_summary(&self) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║             Changelog Generation Summary              ║");
        println!("╠═══════════════════════════════════════════════════════╣");
        println!(
            "║ Commits in history:   {:>8}                        ║",
            self.total_commits
        );
        println!(
            "║   - Already done:     {:>8}                        ║",
            self.skipped_commits
        );
        println!(
            "║   - Processed now:    {:>8}                        ║",
            self.processed_commits
        );
        println!("║                                                       ║");
        println!(
            "║ Batches:              {:>8}                        ║",
            self.batches
        );
        println!(
            "║   - Failed:           {:>8}                        ║",
            self.failed_batches
        );
        println!(
            "║ Entries written:      {:>8}                        ║",
            self.entries_written
        );
        println!(
            "║ Versions in history:  {:>8}                        ║",
            self.versions_in_history
        );
        println!("║                                                       ║");
        println!(
            "║ Mode:                 {:>8}                        ║",
            if self.release { "release" } else { "update" }
        );
        println!(
            "║ Changelog written:    {:>8}                        ║",
            if self.wrote_changelog { "yes" } else { "no" }
        );
        println!(
            "║ Total time:           {:>7.2}s                        ║",
            self.duration.as_secs_f64()
        );
        println!("╚═══════════════════════════════════════════════════════╝\n");
    }
}

/// Main pipeline orchestrator: commit log in, changelog document out.
pub struct Pipeline {
    config: Config,
    extractor: Box<dyn ExtractEntries>,
}

impl Pipeline {
    /// Creates a pipeline with the production completion-service client.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration validation fails.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let extractor = Box::new(ChatClient::new(&config));
        Ok(Self { config, extractor })
    }

    /// Creates a pipeline with a custom extractor, used by tests and by
    /// callers embedding their own completion client.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration validation fails.
    pub fn with_extractor(config: Config, extractor: Box<dyn ExtractEntries>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, extractor })
    }

    /// Executes the complete run and returns statistics.
    ///
    /// # Process
    ///
    /// 1. **Parse**: read the commit log and split it into records
    /// 2. **Filter**: drop commits already covered by processed markers
    /// 3. **Map**: attribute every commit to a released version or Unreleased
    /// 4. **Extract**: batch the remaining commits and call the service
    /// 5. **Assemble**: de-duplicate entries and write the document
    ///
    /// # Errors
    ///
    /// Returns an error when the commit log is missing or the document cannot
    /// be written. Extraction failures are batch-local and never abort a run.
    #[instrument(skip(self), fields(commit_log = %self.config.commit_log.display()))]
    pub fn run(self) -> Result<RunStats> {
        let start = Instant::now();
        let release = self.config.is_release();

        if release {
            info!(
                "Release detected: {} (previous: {})",
                self.config.version, self.config.last_tag
            );
        } else if self.config.last_tag.is_empty() {
            info!("Update mode: processing changes since beginning");
        } else {
            info!(
                "Update mode: processing changes since {}",
                self.config.last_tag
            );
        }

        if self.config.dirty {
            warn!("Working tree was dirty at export; entries reflect committed changes only");
        }

        let commits_text = fs::read_to_string(&self.config.commit_log)
            .map_err(|e| Error::io(&self.config.commit_log, e))?;
        let records = parse_commit_log(&commits_text);
        let total_commits = records.len();
        info!("Found {} commits in history", total_commits);

        let existing = self.read_existing_changelog();
        let history_ids: BTreeSet<String> =
            records.iter().filter_map(|r| r.id.clone()).collect();

        let processed = match existing.as_deref() {
            Some(content) => {
                let candidates = changelog::candidate_processed_ids(content);
                let resolved = changelog::resolve_processed_ids(&candidates, &history_ids);
                let stale = candidates
                    .iter()
                    .filter(|c| !history_ids.iter().any(|full| full.starts_with(c.as_str())))
                    .count();

                info!(
                    "Found {} commit hashes in existing changelog",
                    candidates.len()
                );
                if stale > 0 {
                    warn!(
                        "{stale} marker commit(s) no longer exist (likely squashed/rebased), \
                         will reprocess"
                    );
                }
                resolved
            }
            None => BTreeSet::new(),
        };

        let map = CommitVersionMap::build(&records);
        let versions_in_history = map.version_count();

        let pending: Vec<CommitRecord> = records
            .into_iter()
            .filter(|r| r.id.as_ref().is_none_or(|id| !processed.contains(id)))
            .collect();
        let skipped_commits = total_commits - pending.len();
        if skipped_commits > 0 {
            info!("Skipping {skipped_commits} already-processed commits");
        }

        if pending.is_empty() {
            info!("No new commits to process - changelog is up to date");
            return Ok(self.finished(
                total_commits,
                skipped_commits,
                0,
                0,
                0,
                0,
                versions_in_history,
                release,
                false,
                start,
                Duration::ZERO,
            ));
        }

        info!(
            "Processing {} new commits ({} versions in history)",
            pending.len(),
            versions_in_history
        );

        let batches = Batcher::new(self.config.max_batch_chars).split(&pending, &map);
        info!("Split into {} batches", batches.len());

        if self.config.dry_run {
            warn!("Dry run mode enabled - skipping extraction and changelog write");
            return Ok(self.finished(
                total_commits,
                skipped_commits,
                pending.len(),
                batches.len(),
                0,
                0,
                versions_in_history,
                release,
                false,
                start,
                Duration::ZERO,
            ));
        }

        // Commit attribution is driven by the version map, not by anything the
        // completion service echoes back.
        let mut version_ids: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut unreleased_ids: BTreeSet<String> = BTreeSet::new();
        for record in &pending {
            let Some(id) = &record.id else { continue };
            match map.version_of(id) {
                Some(version) => {
                    version_ids
                        .entry(version.to_string())
                        .or_default()
                        .insert(id.clone());
                }
                None => {
                    unreleased_ids.insert(id.clone());
                }
            }
        }

        let release_version = release.then(|| self.config.version.clone());

        let mut version_blocks: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut unreleased_blocks: Vec<String> = Vec::new();
        let mut failed_batches = 0;
        let extract_start = Instant::now();

        for batch in &batches {
            info!(
                "Batch {}/{}: {} commits, {} chars ({})",
                batch.index + 1,
                batches.len(),
                batch.commit_count(),
                batch.char_size,
                batch.info_line()
            );

            match self
                .extractor
                .extract(batch, &self.config.version, &self.config.date)
            {
                Ok(text) => {
                    let bullets = text
                        .lines()
                        .filter(|line| line.trim().starts_with("- "))
                        .count();
                    if bullets == 0 {
                        warn!("Batch {} returned no usable entries", batch.index + 1);
                    } else {
                        debug!("Batch {} extracted ~{} entries", batch.index + 1, bullets);
                    }

                    if !batch.versions.is_empty() {
                        for version in batch.versions.keys() {
                            version_blocks
                                .entry(version.clone())
                                .or_default()
                                .push(text.clone());
                        }
                    } else if let Some(version) = &release_version {
                        version_blocks
                            .entry(version.clone())
                            .or_default()
                            .push(text);
                    } else {
                        unreleased_blocks.push(text);
                    }
                }
                Err(e) if e.is_batch_local() => {
                    warn!("Batch {} failed: {e}", batch.index + 1);
                    failed_batches += 1;
                }
                Err(e) => return Err(e),
            }
        }
        let extract_duration = extract_start.elapsed();

        // Normalize and de-duplicate per bucket.
        let mut version_content: BTreeMap<String, SectionContent> = BTreeMap::new();
        for (version, blocks) in &version_blocks {
            let entries = entry::merge_blocks(blocks.iter().map(String::as_str));
            if entries.is_empty() {
                warn!("No usable entries extracted for {version}");
            }
            version_content.insert(
                version.clone(),
                SectionContent {
                    entries,
                    commit_ids: version_ids.get(version).cloned().unwrap_or_default(),
                },
            );
        }
        // Versions whose batches all failed still carry provenance so the
        // from-scratch build can emit a marker plus a placeholder.
        for (version, ids) in &version_ids {
            version_content
                .entry(version.clone())
                .or_insert_with(|| SectionContent {
                    entries: String::new(),
                    commit_ids: ids.clone(),
                });
        }
        if let Some(version) = &release_version {
            // On a release run the previously unreleased commits ship with the
            // tag; attribute them there so re-runs converge.
            if let Some(content) = version_content.get_mut(version) {
                content.commit_ids.extend(unreleased_ids.iter().cloned());
            }
        }

        let unreleased_content = if unreleased_blocks.is_empty() {
            None
        } else {
            Some(SectionContent {
                entries: entry::merge_blocks(unreleased_blocks.iter().map(String::as_str)),
                commit_ids: unreleased_ids.clone(),
            })
        };

        // Assemble and persist.
        let tag_dates = TagDates::parse(&self.config.tag_dates);
        let assembler = Assembler::new(&tag_dates, &self.config.date);
        let merge_mode = existing.is_some() && skipped_commits > 0;

        for version in version_content.keys() {
            if !merge_mode && tag_dates.date_of(version).is_none() {
                warn!("Version {version} has no entry in the tag date table, section skipped");
            }
        }

        let has_new_content = unreleased_content
            .as_ref()
            .is_some_and(|c| !c.entries.is_empty())
            || release_version.is_some()
            || !merge_mode;
        if !has_new_content {
            warn!("No new entries extracted; leaving changelog unchanged");
            return Ok(self.finished(
                total_commits,
                skipped_commits,
                pending.len(),
                batches.len(),
                failed_batches,
                0,
                versions_in_history,
                release,
                false,
                start,
                extract_duration,
            ));
        }

        let content = if merge_mode {
            info!("Merging with existing changelog");
            let release_section = release_version
                .as_deref()
                .map(|v| (v, version_content.get(v)));
            assembler.merge_into(
                existing.as_deref().unwrap_or_default(),
                unreleased_content.as_ref(),
                release_section,
            )
        } else {
            info!("Building changelog from scratch");
            assembler.build_full(unreleased_content.as_ref(), &version_content)
        };

        let mut output = content;
        if !output.ends_with('\n') {
            output.push('\n');
        }
        fs::write(&self.config.changelog, &output)
            .map_err(|e| Error::io(&self.config.changelog, e))?;

        let entries_written = output
            .lines()
            .filter(|line| line.trim().starts_with("- "))
            .count();
        info!(
            "✓ Wrote {} ({} entries, {} bytes)",
            self.config.changelog.display(),
            entries_written,
            output.len()
        );

        Ok(self.finished(
            total_commits,
            skipped_commits,
            pending.len(),
            batches.len(),
            failed_batches,
            entries_written,
            versions_in_history,
            release,
            true,
            start,
            extract_duration,
        ))
    }

    fn read_existing_changelog(&self) -> Option<String> {
        match fs::read_to_string(&self.config.changelog) {
            Ok(content) => Some(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Could not read existing changelog: {e}");
                None
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn finished(
        &self,
        total_commits: usize,
        skipped_commits: usize,
        processed_commits: usize,
        batches: usize,
        failed_batches: usize,
        entries_written: usize,
        versions_in_history: usize,
        release: bool,
        wrote_changelog: bool,
        start: Instant,
        extract_duration: Duration,
    ) -> RunStats {
        RunStats {
            total_commits,
            skipped_commits,
            processed_commits,
            batches,
            failed_batches,
            entries_written,
            versions_in_history,
            release,
            wrote_changelog,
            duration: start.elapsed(),
            extract_duration,
            output_path: self.config.changelog.display().to_string(),
        }
    }
}
