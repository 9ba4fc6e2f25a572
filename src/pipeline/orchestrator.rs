//! Concurrent extraction dispatch: cache check, in-flight request
//! de-duplication, bounded worker pool, retry with exponential backoff.
//!
//! Overlapping chunks and re-runs produce identical (instructions, chunk)
//! pairs; the cache and the in-flight table together guarantee the
//! external service sees each fingerprint at most once at a time, and at
//! most once ever on the happy path.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, Mutex, Semaphore};
use tokio::time::{sleep, timeout};

use super::cache::ExtractionCache;
use super::chunker::Chunk;
use super::client::{ClientError, ExtractionClient, InstructionSet};
use super::fingerprint::fingerprint;
use super::usage::UsageTracker;

/// Chunk-scoped extraction failure. Cloneable so one in-flight result can
/// fan out to every waiter.
#[derive(Debug, Clone, Error)]
pub enum ExtractError {
    #[error("extraction failed permanently: {0}")]
    Permanent(String),

    #[error("extraction failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },

    #[error("cache error: {0}")]
    Cache(String),

    #[error("extraction worker pool shut down")]
    PoolClosed,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Concurrency slots for external calls.
    pub max_concurrency: usize,
    /// Attempts per chunk, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Per-attempt deadline; expiry counts as a transient failure.
    pub attempt_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            attempt_timeout: Duration::from_secs(120),
        }
    }
}

type FlightResult = Result<String, ExtractError>;

/// Dispatches chunk extractions through the shared cache, the in-flight
/// table, and the bounded worker pool.
pub struct ExtractionOrchestrator {
    client: Arc<dyn ExtractionClient>,
    cache: Arc<ExtractionCache>,
    usage: Arc<UsageTracker>,
    pool: Arc<Semaphore>,
    in_flight: Mutex<HashMap<String, broadcast::Sender<FlightResult>>>,
    config: OrchestratorConfig,
}

impl ExtractionOrchestrator {
    pub fn new(
        client: Arc<dyn ExtractionClient>,
        cache: Arc<ExtractionCache>,
        usage: Arc<UsageTracker>,
        config: OrchestratorConfig,
    ) -> Self {
        let pool = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        Self {
            client,
            cache,
            usage,
            pool,
            in_flight: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    /// Extract one chunk. Cached fingerprints return without an external
    /// call; concurrent requests for the same fingerprint share a single
    /// call; transient failures retry with backoff; a terminal failure is
    /// scoped to this chunk only.
    pub async fn extract(
        &self,
        instructions: &InstructionSet,
        chunk: &Chunk,
    ) -> FlightResult {
        let key = fingerprint(&instructions.id, &chunk.text);

        if let Some(hit) = self
            .cache
            .get(&key)
            .map_err(|e| ExtractError::Cache(e.to_string()))?
        {
            self.usage.record_cache_hit();
            tracing::debug!(chunk = chunk.index, "extraction cache hit");
            return Ok(hit.payload);
        }

        // Check-and-insert under one lock: either this task becomes the
        // leader for the key or it subscribes to the call already in
        // flight. The lock is what makes the check atomic.
        let mut waiter = {
            let mut in_flight = self.in_flight.lock().await;
            match in_flight.get(&key) {
                Some(tx) => Some(tx.subscribe()),
                None => {
                    let (tx, _) = broadcast::channel(1);
                    in_flight.insert(key.clone(), tx);
                    None
                }
            }
        };

        if let Some(rx) = waiter.as_mut() {
            tracing::debug!(chunk = chunk.index, "joining in-flight extraction");
            return match rx.recv().await {
                Ok(result) => result,
                Err(_) => Err(ExtractError::PoolClosed),
            };
        }

        // A previous leader may have completed between this task's cache
        // miss and its taking leadership. Leaders write the cache before
        // removing their in-flight entry, so one more check here is enough
        // to guarantee at most one external call per fingerprint.
        match self.cache.get(&key) {
            Ok(Some(hit)) => {
                self.usage.record_cache_hit();
                let sender = self.in_flight.lock().await.remove(&key);
                if let Some(tx) = sender {
                    let _ = tx.send(Ok(hit.payload.clone()));
                }
                return Ok(hit.payload);
            }
            Ok(None) => {}
            Err(e) => {
                let err = ExtractError::Cache(e.to_string());
                let sender = self.in_flight.lock().await.remove(&key);
                if let Some(tx) = sender {
                    let _ = tx.send(Err(err.clone()));
                }
                return Err(err);
            }
        }

        let result = self.run_attempts(instructions, chunk).await;

        if let Ok(payload) = &result {
            if let Err(e) = self.cache.put_if_absent(&key, payload) {
                tracing::warn!(error = %e, "failed to write extraction cache");
            }
        }

        let sender = self.in_flight.lock().await.remove(&key);
        if let Some(tx) = sender {
            // Waiters may have all timed out; a send with no receivers is fine.
            let _ = tx.send(result.clone());
        }

        result
    }

    async fn run_attempts(&self, instructions: &InstructionSet, chunk: &Chunk) -> FlightResult {
        let _permit = self
            .pool
            .acquire()
            .await
            .map_err(|_| ExtractError::PoolClosed)?;

        let mut backoff = self.config.initial_backoff;
        let mut last_error = String::new();

        for attempt in 1..=self.config.max_attempts {
            self.usage
                .record_attempt(instructions.text.len() + chunk.text.len());

            match self.call_once(instructions, chunk).await {
                Ok(payload) => {
                    self.usage.record_success(payload.len());
                    tracing::debug!(chunk = chunk.index, attempt, "extraction succeeded");
                    return Ok(payload);
                }
                Err(err) if err.is_transient() && attempt < self.config.max_attempts => {
                    self.usage.record_failure();
                    tracing::warn!(
                        chunk = chunk.index,
                        attempt,
                        error = %err,
                        "transient extraction failure, backing off"
                    );
                    last_error = err.to_string();
                    sleep(backoff).await;
                    backoff = (backoff * 2).min(self.config.max_backoff);
                }
                Err(err) if err.is_transient() => {
                    self.usage.record_failure();
                    return Err(ExtractError::Exhausted {
                        attempts: attempt,
                        last: err.to_string(),
                    });
                }
                Err(err) => {
                    self.usage.record_failure();
                    tracing::warn!(
                        chunk = chunk.index,
                        attempt,
                        error = %err,
                        "permanent extraction failure"
                    );
                    return Err(ExtractError::Permanent(err.to_string()));
                }
            }
        }

        Err(ExtractError::Exhausted {
            attempts: self.config.max_attempts,
            last: last_error,
        })
    }

    /// One attempt: the blocking client call on a worker thread, bounded
    /// by the attempt deadline.
    async fn call_once(
        &self,
        instructions: &InstructionSet,
        chunk: &Chunk,
    ) -> Result<String, ClientError> {
        let client = Arc::clone(&self.client);
        let instruction_text = instructions.text.clone();
        let chunk_text = chunk.text.clone();

        let call =
            tokio::task::spawn_blocking(move || client.extract(&instruction_text, &chunk_text));

        match timeout(self.config.attempt_timeout, call).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(ClientError::Transport(format!("worker task failed: {join}"))),
            Err(_) => Err(ClientError::Timeout(self.config.attempt_timeout.as_secs())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::client::MockExtractionClient;

    fn chunk(index: usize, text: &str) -> Chunk {
        Chunk {
            index,
            start: 0,
            end: text.chars().count(),
            text: text.to_string(),
        }
    }

    fn instructions() -> InstructionSet {
        InstructionSet::new("takeoff-v1", "extract items")
    }

    fn fast_config(max_concurrency: usize, max_attempts: u32) -> OrchestratorConfig {
        OrchestratorConfig {
            max_concurrency,
            max_attempts,
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(20),
            attempt_timeout: Duration::from_secs(5),
        }
    }

    fn orchestrator(
        client: Arc<MockExtractionClient>,
        config: OrchestratorConfig,
    ) -> ExtractionOrchestrator {
        ExtractionOrchestrator::new(
            client,
            Arc::new(ExtractionCache::open_in_memory().unwrap()),
            Arc::new(UsageTracker::new()),
            config,
        )
    }

    #[tokio::test]
    async fn successful_extraction_returns_payload() {
        let client = Arc::new(MockExtractionClient::new(r#"{"wires":[]}"#));
        let orch = orchestrator(Arc::clone(&client), fast_config(4, 3));

        let payload = orch.extract(&instructions(), &chunk(0, "PANEL LP-1")).await.unwrap();
        assert_eq!(payload, r#"{"wires":[]}"#);
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn second_call_is_served_from_cache() {
        let client = Arc::new(MockExtractionClient::new("payload"));
        let orch = orchestrator(Arc::clone(&client), fast_config(4, 3));
        let c = chunk(0, "PANEL LP-1");

        orch.extract(&instructions(), &c).await.unwrap();
        orch.extract(&instructions(), &c).await.unwrap();

        assert_eq!(client.call_count(), 1);
        let snap = orch.usage().snapshot();
        assert_eq!(snap.attempts, 1);
        assert_eq!(snap.cache_hits, 1);
    }

    #[tokio::test]
    async fn concurrent_duplicates_share_one_call() {
        let client = Arc::new(
            MockExtractionClient::new("payload").with_delay(Duration::from_millis(50)),
        );
        let orch = Arc::new(orchestrator(Arc::clone(&client), fast_config(8, 3)));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let orch = Arc::clone(&orch);
            handles.push(tokio::spawn(async move {
                orch.extract(&instructions(), &chunk(0, "SAME CHUNK")).await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "payload");
        }

        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn waiters_receive_the_leaders_failure() {
        let client = Arc::new(
            MockExtractionClient::new("unused")
                .fail_first(
                    99,
                    ClientError::Http { status: 400, body: "bad instructions".into() },
                )
                .with_delay(Duration::from_millis(30)),
        );
        let orch = Arc::new(orchestrator(Arc::clone(&client), fast_config(4, 3)));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let orch = Arc::clone(&orch);
            handles.push(tokio::spawn(async move {
                orch.extract(&instructions(), &chunk(0, "SAME CHUNK")).await
            }));
        }
        for handle in handles {
            assert!(matches!(
                handle.await.unwrap(),
                Err(ExtractError::Permanent(_))
            ));
        }

        // Permanent failure is not retried and not repeated per waiter.
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn distinct_chunks_each_call_once() {
        let client = Arc::new(MockExtractionClient::new("payload"));
        let orch = orchestrator(Arc::clone(&client), fast_config(4, 3));

        orch.extract(&instructions(), &chunk(0, "CHUNK A")).await.unwrap();
        orch.extract(&instructions(), &chunk(1, "CHUNK B")).await.unwrap();

        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn worker_pool_bounds_concurrency() {
        let client = Arc::new(
            MockExtractionClient::new("payload").with_delay(Duration::from_millis(40)),
        );
        let orch = Arc::new(orchestrator(Arc::clone(&client), fast_config(2, 3)));

        let mut handles = Vec::new();
        for i in 0..6 {
            let orch = Arc::clone(&orch);
            handles.push(tokio::spawn(async move {
                orch.extract(&instructions(), &chunk(i, &format!("CHUNK {i}"))).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(client.call_count(), 6);
        assert!(
            client.peak_concurrency() <= 2,
            "expected at most 2 concurrent calls, saw {}",
            client.peak_concurrency()
        );
    }

    #[tokio::test]
    async fn transient_failures_retry_until_success() {
        let client = Arc::new(
            MockExtractionClient::new("recovered").fail_first(2, ClientError::RateLimited),
        );
        let orch = orchestrator(Arc::clone(&client), fast_config(4, 3));

        let payload = orch.extract(&instructions(), &chunk(0, "CHUNK")).await.unwrap();
        assert_eq!(payload, "recovered");
        assert_eq!(client.call_count(), 3);

        let snap = orch.usage().snapshot();
        assert_eq!(snap.attempts, 3);
        assert_eq!(snap.failures, 2);
        assert_eq!(snap.successes, 1);
    }

    #[tokio::test]
    async fn retries_exhaust_into_terminal_failure() {
        let client = Arc::new(
            MockExtractionClient::new("unused").fail_first(99, ClientError::RateLimited),
        );
        let orch = orchestrator(Arc::clone(&client), fast_config(4, 3));

        let result = orch.extract(&instructions(), &chunk(0, "CHUNK")).await;
        assert!(matches!(
            result,
            Err(ExtractError::Exhausted { attempts: 3, .. })
        ));
        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let client = Arc::new(MockExtractionClient::new("unused").fail_first(
            99,
            ClientError::Http { status: 422, body: "bad request".into() },
        ));
        let orch = orchestrator(Arc::clone(&client), fast_config(4, 3));

        let result = orch.extract(&instructions(), &chunk(0, "CHUNK")).await;
        assert!(matches!(result, Err(ExtractError::Permanent(_))));
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn attempt_timeout_counts_as_transient() {
        let client = Arc::new(
            MockExtractionClient::new("slow").with_delay(Duration::from_millis(100)),
        );
        let mut config = fast_config(4, 2);
        config.attempt_timeout = Duration::from_millis(20);
        let orch = orchestrator(Arc::clone(&client), config);

        let result = orch.extract(&instructions(), &chunk(0, "CHUNK")).await;
        assert!(matches!(result, Err(ExtractError::Exhausted { attempts: 2, .. })));
        assert_eq!(orch.usage().snapshot().attempts, 2);
    }

    #[tokio::test]
    async fn failed_chunk_is_not_cached() {
        let client = Arc::new(
            MockExtractionClient::new("later").fail_first(3, ClientError::RateLimited),
        );
        let orch = orchestrator(Arc::clone(&client), fast_config(4, 3));
        let c = chunk(0, "CHUNK");

        // First run exhausts its three attempts.
        assert!(orch.extract(&instructions(), &c).await.is_err());
        // A later run starts fresh and succeeds; nothing stale was cached.
        assert_eq!(orch.extract(&instructions(), &c).await.unwrap(), "later");
        assert_eq!(client.call_count(), 4);
    }

    #[tokio::test]
    async fn different_instruction_identities_do_not_share_cache() {
        let client = Arc::new(MockExtractionClient::new("payload"));
        let orch = orchestrator(Arc::clone(&client), fast_config(4, 3));
        let c = chunk(0, "CHUNK");

        orch.extract(&InstructionSet::new("v1", "text"), &c).await.unwrap();
        orch.extract(&InstructionSet::new("v2", "text"), &c).await.unwrap();

        assert_eq!(client.call_count(), 2);
    }
}
