//! Boundary to the external structured-extraction service.
//!
//! The pipeline only transports chunk text in and raw structured payloads
//! out; what the service is asked to extract lives in the instruction set
//! supplied by the caller.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identity plus text of the extraction instructions. The identity is the
/// cache-key component: bump it whenever the instruction text changes so
/// stale cached responses stop matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionSet {
    pub id: String,
    pub text: String,
}

impl InstructionSet {
    pub fn new(id: &str, text: &str) -> Self {
        Self {
            id: id.to_string(),
            text: text.to_string(),
        }
    }
}

/// Client-level failure, split into the transient class the orchestrator
/// retries and the permanent class it does not.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("rate limited by extraction service")]
    RateLimited,

    #[error("cannot connect to extraction service at {0}")]
    Connection(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("extraction service returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("malformed response envelope: {0}")]
    Envelope(String),
}

impl ClientError {
    /// Whether a retry with the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::RateLimited | Self::Connection(_) | Self::Transport(_) => {
                true
            }
            Self::Http { status, .. } => *status >= 500,
            Self::Envelope(_) => false,
        }
    }
}

/// The external structured-extraction capability. Implementations block;
/// the orchestrator calls them from worker tasks via `spawn_blocking`.
pub trait ExtractionClient: Send + Sync {
    /// Send one chunk with the extraction instructions; returns the raw
    /// structured payload exactly as the service produced it.
    fn extract(&self, instructions: &str, chunk_text: &str) -> Result<String, ClientError>;
}

// ═══════════════════════════════════════════════════════════
// HTTP implementation
// ═══════════════════════════════════════════════════════════

/// HTTP client for a hosted extraction endpoint.
pub struct HttpExtractionClient {
    base_url: String,
    model: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl HttpExtractionClient {
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Result<Self, ClientError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
            timeout_secs,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Request body for the extraction endpoint.
#[derive(Serialize)]
struct ExtractRequest<'a> {
    model: &'a str,
    instructions: &'a str,
    input: &'a str,
    stream: bool,
}

/// Response body from the extraction endpoint.
#[derive(Deserialize)]
struct ExtractResponse {
    output: String,
}

impl ExtractionClient for HttpExtractionClient {
    fn extract(&self, instructions: &str, chunk_text: &str) -> Result<String, ClientError> {
        let url = format!("{}/v1/extract", self.base_url);
        let body = ExtractRequest {
            model: &self.model,
            instructions,
            input: chunk_text,
            stream: false,
        };

        let response = self.client.post(&url).json(&body).send().map_err(|e| {
            if e.is_timeout() {
                ClientError::Timeout(self.timeout_secs)
            } else if e.is_connect() {
                ClientError::Connection(self.base_url.clone())
            } else {
                ClientError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ClientError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ClientError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ExtractResponse = response
            .json()
            .map_err(|e| ClientError::Envelope(e.to_string()))?;

        Ok(parsed.output)
    }
}

// ═══════════════════════════════════════════════════════════
// Mock implementation for tests
// ═══════════════════════════════════════════════════════════

/// Mock client: configurable canned response, failure schedule, artificial
/// latency, and call/concurrency counters for pool assertions.
pub struct MockExtractionClient {
    response: String,
    fail_first: usize,
    failure: ClientError,
    delay: Option<Duration>,
    calls: AtomicUsize,
    running: AtomicUsize,
    peak_running: AtomicUsize,
}

impl MockExtractionClient {
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            fail_first: 0,
            failure: ClientError::RateLimited,
            delay: None,
            calls: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            peak_running: AtomicUsize::new(0),
        }
    }

    /// Fail the first `n` calls with the given error, then succeed.
    pub fn fail_first(mut self, n: usize, failure: ClientError) -> Self {
        self.fail_first = n;
        self.failure = failure;
        self
    }

    /// Sleep this long inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls observed in flight at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak_running.load(Ordering::SeqCst)
    }
}

impl ExtractionClient for MockExtractionClient {
    fn extract(&self, _instructions: &str, _chunk_text: &str) -> Result<String, ClientError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let now_running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_running.fetch_max(now_running, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        self.running.fetch_sub(1, Ordering::SeqCst);

        if call < self.fail_first {
            Err(self.failure.clone())
        } else {
            Ok(self.response.clone())
        }
    }
}
