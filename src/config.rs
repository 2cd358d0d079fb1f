use crate::error::{Error, Result};
use std::path::PathBuf;

const DEFAULT_COMMIT_LOG: &str = "commits_with_diffs.txt";
const DEFAULT_CHANGELOG: &str = "CHANGELOG.md";
const DEFAULT_API_URL: &str = "https://models.inference.ai.azure.com/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_MAX_BATCH_CHARS: usize = 20_000;
const DEFAULT_MAX_RETRIES: usize = 5;
const DEFAULT_BACKOFF_SECS: u64 = 60;
const DEFAULT_TEMPERATURE: f32 = 0.3;
const DEFAULT_MAX_RESPONSE_TOKENS: usize = 16_000;

/// Configuration for a changelog generation run.
///
/// Use [`Config::builder()`] to construct a new configuration.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    /// Path to the exported commit log with diffs
    pub commit_log: PathBuf,

    /// Path to the changelog document (read if present, always written)
    pub changelog: PathBuf,

    /// Current version label (a new release tag, or the last released tag)
    pub version: String,

    /// Previous release tag
    pub last_tag: String,

    /// Branch the run is operating on (informational)
    pub branch: String,

    /// Whether the invoking environment reported a dirty working tree
    pub dirty: bool,

    /// Run date in YYYY-MM-DD form
    pub date: String,

    /// Raw tag -> release date table, one `vX.Y.Z: YYYY-MM-DD` line per tag
    pub tag_dates: String,

    /// Chat-completion endpoint URL
    pub api_url: String,

    /// Bearer token for the completion service
    pub api_token: String,

    /// Model identifier sent with each request
    pub model: String,

    /// Sampling temperature for entry extraction
    pub temperature: f32,

    /// Output-length ceiling for each completion
    pub max_response_tokens: usize,

    /// Character-size ceiling per commit batch (~4 chars per token)
    pub max_batch_chars: usize,

    /// Retry ceiling for rate-limited requests
    pub max_retries: usize,

    /// Fallback wait when a rate-limit response carries no hint
    pub default_backoff_secs: u64,

    /// Dry run mode (no changelog write, no API calls)
    pub dry_run: bool,
}

impl Config {
    /// Creates a new configuration builder.
    ///
    /// # Examples
    ///
    /// ```
    /// use changelog_gen::Config;
    ///
    /// let config = Config::builder()
    ///     .commit_log("commits_with_diffs.txt")
    ///     .api_token("token")
    ///     .build()
    ///     .expect("valid configuration");
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The batch ceiling or retry ceiling is zero
    /// - No API token is set for a non-dry run
    pub fn validate(&self) -> Result<()> {
        if self.max_batch_chars == 0 {
            return Err(Error::config("max_batch_chars must be greater than zero"));
        }

        if self.max_retries == 0 {
            return Err(Error::config("max_retries must be greater than zero"));
        }

        if self.api_token.is_empty() && !self.dry_run {
            return Err(Error::config(
                "an API token is required unless running with dry_run",
            ));
        }

        Ok(())
    }

    /// Returns true if this run represents a release event.
    ///
    /// A release is detected when both the current version and the previous tag
    /// are known, they differ, and the current version is itself a tag.
    #[must_use]
    pub fn is_release(&self) -> bool {
        !self.version.is_empty()
            && !self.last_tag.is_empty()
            && self.version != self.last_tag
            && self.version.starts_with('v')
    }
}

/// Builder for [`Config`].
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    commit_log: Option<PathBuf>,
    changelog: Option<PathBuf>,
    version: Option<String>,
    last_tag: Option<String>,
    branch: Option<String>,
    dirty: bool,
    date: Option<String>,
    tag_dates: Option<String>,
    api_url: Option<String>,
    api_token: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    max_response_tokens: Option<usize>,
    max_batch_chars: Option<usize>,
    max_retries: Option<usize>,
    default_backoff_secs: Option<u64>,
    dry_run: bool,
}

impl ConfigBuilder {
    /// Sets the path of the exported commit log.
    #[must_use]
    pub fn commit_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.commit_log = Some(path.into());
        self
    }

    /// Sets the path of the changelog document.
    #[must_use]
    pub fn changelog(mut self, path: impl Into<PathBuf>) -> Self {
        self.changelog = Some(path.into());
        self
    }

    /// Sets the current version label.
    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Sets the previous release tag.
    #[must_use]
    pub fn last_tag(mut self, tag: impl Into<String>) -> Self {
        self.last_tag = Some(tag.into());
        self
    }

    /// Sets the branch name.
    #[must_use]
    pub fn branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Records whether the working tree was dirty when history was exported.
    #[must_use]
    pub const fn dirty(mut self, dirty: bool) -> Self {
        self.dirty = dirty;
        self
    }

    /// Sets the run date (YYYY-MM-DD).
    #[must_use]
    pub fn date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    /// Sets the raw tag -> release date table.
    #[must_use]
    pub fn tag_dates(mut self, table: impl Into<String>) -> Self {
        self.tag_dates = Some(table.into());
        self
    }

    /// Sets the chat-completion endpoint URL.
    #[must_use]
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = Some(url.into());
        self
    }

    /// Sets the bearer token for the completion service.
    #[must_use]
    pub fn api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// Sets the model identifier.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub const fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets the per-completion output-length ceiling.
    #[must_use]
    pub const fn max_response_tokens(mut self, tokens: usize) -> Self {
        self.max_response_tokens = Some(tokens);
        self
    }

    /// Sets the character-size ceiling per batch.
    #[must_use]
    pub const fn max_batch_chars(mut self, chars: usize) -> Self {
        self.max_batch_chars = Some(chars);
        self
    }

    /// Sets the retry ceiling for rate-limited requests.
    #[must_use]
    pub const fn max_retries(mut self, retries: usize) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Sets the fallback backoff wait in seconds.
    #[must_use]
    pub const fn default_backoff_secs(mut self, secs: u64) -> Self {
        self.default_backoff_secs = Some(secs);
        self
    }

    /// Enables or disables dry run mode.
    #[must_use]
    pub const fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Builds and validates the configuration.
    ///
    /// The run date defaults to the current local date when not supplied.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails, see [`Config::validate`].
    pub fn build(self) -> Result<Config> {
        let date = self
            .date
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d").to_string());

        let config = Config {
            commit_log: self.commit_log.unwrap_or_else(|| DEFAULT_COMMIT_LOG.into()),
            changelog: self.changelog.unwrap_or_else(|| DEFAULT_CHANGELOG.into()),
            version: self.version.unwrap_or_default(),
            last_tag: self.last_tag.unwrap_or_default(),
            branch: self.branch.unwrap_or_default(),
            dirty: self.dirty,
            date,
            tag_dates: self.tag_dates.unwrap_or_default(),
            api_url: self.api_url.unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            api_token: self.api_token.unwrap_or_default(),
            model: self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature: self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_response_tokens: self
                .max_response_tokens
                .unwrap_or(DEFAULT_MAX_RESPONSE_TOKENS),
            max_batch_chars: self.max_batch_chars.unwrap_or(DEFAULT_MAX_BATCH_CHARS),
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            default_backoff_secs: self.default_backoff_secs.unwrap_or(DEFAULT_BACKOFF_SECS),
            dry_run: self.dry_run,
        };

        config.validate()?;
        Ok(config)
    }
}
