//! # changelog-gen
//!
//! A library for generating and maintaining `CHANGELOG.md` files from git
//! history, with changelog entries extracted by a chat-completion service.
//!
//! ## Features
//!
//! - Commit-log parsing with version-tag attribution
//! - Token-budget-aware batching of commits and diffs
//! - Bounded retry with server-hinted backoff on rate limits
//! - Fuzzy de-duplication of near-identical entries
//! - Idempotent merging into existing Keep-a-Changelog documents
//!
//! ## Quick Start
//!
//! ```no_run
//! use changelog_gen::{Config, Pipeline};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::builder()
//!     .commit_log("commits_with_diffs.txt")
//!     .changelog("CHANGELOG.md")
//!     .api_token(std::env::var("GITHUB_TOKEN")?)
//!     .build()?;
//!
//! let stats = Pipeline::new(config)?.run()?;
//! stats.print_summary();
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! The library follows a pipeline architecture:
//! 1. **Commit parser**: splits the exported log into commit records
//! 2. **Version mapper**: attributes each commit to a release or Unreleased
//! 3. **Batcher**: groups commits under the service's token budget
//! 4. **Extractor**: submits each batch and collects raw bullet text
//! 5. **Entry accumulator**: normalizes and de-duplicates entries
//! 6. **Assembler**: builds or merges the final document

#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]
#![allow(clippy::module_name_repetitions)]

pub mod batch;
pub mod changelog;
pub mod commit;
mod config;
pub mod entry;
mod error;
pub mod extract;
mod pipeline;
pub mod version;

pub use config::{Config, ConfigBuilder};
pub use error::{Error, Result};
pub use pipeline::{Pipeline, RunStats};

/// Runs the complete changelog generation pipeline with the given
/// configuration.
///
/// This is the main entry point for the library.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration is invalid
/// - The commit log cannot be read
/// - The changelog document cannot be written
///
/// Extraction failures are batch-local and reported through [`RunStats`]
/// rather than as errors.
///
/// # Examples
///
/// ```no_run
/// use changelog_gen::{Config, run};
///
/// # fn main() -> anyhow::Result<()> {
/// let config = Config::builder()
///     .commit_log("commits_with_diffs.txt")
///     .api_token("token")
///     .build()?;
///
/// run(config)?;
/// # Ok(())
/// # }
/// ```
pub fn run(config: Config) -> Result<RunStats> {
    Pipeline::new(config)?.run()
}
