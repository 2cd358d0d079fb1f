//! Boundary to the chat-completion service.
//!
//! The contract to the rest of the pipeline is small: submit one batch, get
//! back raw bullet-point text or a batch-local failure. Rate limits are
//! retried with a bounded blocking backoff; everything else fails the batch
//! and lets the run continue.

use crate::batch::EntryBatch;
use crate::config::Config;
use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const SYSTEM_PROMPT: &str = "You are a technical changelog entry extractor. \
Output ONLY categorized bullet points in Keep a Changelog format. \
Extract multiple detailed entries per commit.";

// Azure-style rate limit bodies suggest a wait, e.g. "Please wait 52 seconds".
static WAIT_HINT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"wait (\d+) second").expect("valid pattern"));

/// Seam for entry extraction so the pipeline can run against a stub in tests.
pub trait ExtractEntries {
    /// Submits one batch and returns the raw categorized bullet text.
    ///
    /// # Errors
    ///
    /// Returns a batch-local error on rate-limit exhaustion, non-success
    /// statuses, transport failures, or malformed response bodies.
    fn extract(&self, batch: &EntryBatch, version: &str, date: &str) -> Result<String>;
}

/// Retry policy for rate-limited requests: bounded attempts, wait duration
/// taken from the server's hint when present.
#[derive(Debug, Clone)]
pub struct Backoff {
    /// Maximum number of requests before giving up on a batch
    pub max_attempts: usize,

    /// Wait applied when the response body carries no usable hint
    pub default_wait: Duration,
}

impl Backoff {
    /// Creates a policy with the given attempt ceiling and fallback wait.
    #[must_use]
    pub const fn new(max_attempts: usize, default_wait: Duration) -> Self {
        Self {
            max_attempts,
            default_wait,
        }
    }

    /// Determines how long to wait before the next attempt.
    ///
    /// A `wait N second` hint in the body wins, padded by two seconds so the
    /// next request lands safely after the window resets.
    #[must_use]
    pub fn wait_for(&self, body: &str) -> Duration {
        WAIT_HINT_RE
            .captures(body)
            .and_then(|caps| caps[1].parse::<u64>().ok())
            .map_or(self.default_wait, |secs| Duration::from_secs(secs + 2))
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: String,
}

fn first_content(response: ChatResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .ok_or_else(|| Error::malformed("response carried no choices"))
}

/// Builds the per-batch extraction instruction sent as the user prompt.
#[must_use]
pub fn build_prompt(batch: &EntryBatch, version: &str, date: &str) -> String {
    format!(
        "Extract detailed changelog entries from these commits.\n\
         \n\
         Batch: {info}\n\
         LAST RELEASED VERSION: {version}\n\
         Date: {date}\n\
         \n\
         Commits in this batch:\n\
         {text}\n\
         \n\
         Instructions:\n\
         1. Extract MULTIPLE detailed entries from each commit (3-7 per commit typical)\n\
         2. Read the DIFF carefully - each file change often represents a separate entry\n\
         3. Be TECHNICAL and SPECIFIC: Include file/component names\n\
         4. Categories: Added, Changed, Deprecated, Removed, Fixed, Security\n\
         5. Format each entry as a simple bullet point starting with \"- \"\n\
         6. Group by category with headers like \"### Added\", \"### Changed\", etc.\n\
         7. DO NOT add version tags or prefixes to entries - just clean bullet points\n\
         \n\
         Return ONLY the categorized bullet points, no explanations or extra text.",
        info = batch.info_line(),
        text = batch.text,
    )
}

/// Production extractor talking to a chat-completion endpoint over HTTP.
pub struct ChatClient {
    agent: ureq::Agent,
    url: String,
    token: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
    backoff: Backoff,
}

impl ChatClient {
    /// Creates a client from the run configuration.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().build(),
            url: config.api_url.clone(),
            token: config.api_token.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_response_tokens,
            backoff: Backoff::new(
                config.max_retries,
                Duration::from_secs(config.default_backoff_secs),
            ),
        }
    }

    fn send(&self, request: &ChatRequest) -> Result<String> {
        let response = self
            .agent
            .post(&self.url)
            .set("Authorization", &format!("Bearer {}", self.token))
            .set("Content-Type", "application/json")
            .send_json(request);

        match response {
            Ok(resp) => {
                let parsed: ChatResponse = resp
                    .into_json()
                    .map_err(|e| Error::malformed(e.to_string()))?;
                first_content(parsed)
            }
            Err(ureq::Error::Status(status, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                Err(Error::api(status, &body))
            }
            Err(ureq::Error::Transport(transport)) => Err(Error::Transport {
                message: transport.to_string(),
            }),
        }
    }
}

impl ExtractEntries for ChatClient {
    fn extract(&self, batch: &EntryBatch, version: &str, date: &str) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: build_prompt(batch, version, date),
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        debug!(
            "Batch {}: sending ~{} chars to {}",
            batch.index + 1,
            batch.char_size,
            self.url
        );

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.send(&request) {
                Err(Error::Api {
                    status: 429,
                    message,
                }) => {
                    if attempt >= self.backoff.max_attempts {
                        return Err(Error::RateLimited { attempts: attempt });
                    }
                    let wait = self.backoff.wait_for(&message);
                    warn!(
                        "Rate limit hit, waiting {}s (retry {}/{})",
                        wait.as_secs(),
                        attempt,
                        self.backoff.max_attempts
                    );
                    std::thread::sleep(wait);
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::parse_commit_log;
    use crate::version::CommitVersionMap;

    fn sample_batch() -> EntryBatch {
        let log = "=== COMMIT: abcd1234abcd1234|Add retry|2025-01-01|tag: v0.6.2===\ndiff body";
        let records = parse_commit_log(log);
        let map = CommitVersionMap::build(&records);
        crate::batch::Batcher::new(10_000).split(&records, &map).remove(0)
    }

    #[test]
    fn test_wait_hint_parsed_with_buffer() {
        let backoff = Backoff::new(5, Duration::from_secs(60));
        let wait = backoff.wait_for("Rate limit exceeded. Please wait 30 seconds before retrying.");
        assert_eq!(wait, Duration::from_secs(32));
    }

    #[test]
    fn test_wait_hint_missing_uses_default() {
        let backoff = Backoff::new(5, Duration::from_secs(60));
        assert_eq!(backoff.wait_for("try later"), Duration::from_secs(60));
        assert_eq!(backoff.wait_for(""), Duration::from_secs(60));
    }

    #[test]
    fn test_prompt_carries_batch_identity_and_text() {
        let batch = sample_batch();
        let prompt = build_prompt(&batch, "v0.6.2", "2025-12-02");

        assert!(prompt.contains("Batch: Commits abcd123..abcd123 | VERSIONS: v0.6.2: abcd123"));
        assert!(prompt.contains("LAST RELEASED VERSION: v0.6.2"));
        assert!(prompt.contains("Date: 2025-12-02"));
        assert!(prompt.contains("diff body"));
        assert!(prompt.contains("### Added"));
    }

    #[test]
    fn test_response_content_extraction() {
        let body = r####"{"choices":[{"message":{"role":"assistant","content":"### Added\n- entry"}}]}"####;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(first_content(parsed).unwrap(), "### Added\n- entry");
    }

    #[test]
    fn test_response_without_choices_is_malformed() {
        let parsed: ChatResponse = serde_json::from_str("{}").unwrap();
        let err = first_content(parsed).unwrap_err();
        assert!(err.is_batch_local());
        assert!(err.to_string().contains("no choices"));
    }

    #[test]
    fn test_request_serialization_shape() {
        let request = ChatRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![ChatMessage {
                role: "system",
                content: "prompt".to_string(),
            }],
            temperature: 0.3,
            max_tokens: 16_000,
        };
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["model"], "gpt-4o-mini");
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["max_tokens"], 16_000);
    }
}
