//! Sequential killmail poller
//!
//! Drives the feed one sequence number at a time: fetch, filter, hand the
//! accepted killmail to the sink, persist the cursor, advance. There is
//! exactly one in-flight fetch and one cursor value, so no locking is
//! needed around progress state.
//!
//! Failure contract:
//! - a 404 on the record endpoint is not an error; the loop waits and
//!   retries the same sequence (the live-edge steady state)
//! - fetch errors surfacing from the client (rate-limit retries exhausted,
//!   transport, parse) stop the loop; a sequence number is never skipped
//!   silently
//! - cursor persistence failures stop the loop; masking them would risk
//!   reprocessing or data loss on restart
//! - sink errors are logged and do not stall ingestion; the record store
//!   deduplicates on replay

use crate::cursor::{CursorStore, PersistenceError};
use crate::fetch::{FetchError, KillmailSource};
use crate::filters::FilterPipeline;
use crate::killmail::Killmail;
use crate::repository::KillmailRepository;
use crate::shutdown::Shutdown;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Wait between iterations once a sequence was processed
const SLEEP_ON_SUCCESS: Duration = Duration::from_millis(100);
/// Wait before retrying a sequence that is not yet published
const SLEEP_ON_404: Duration = Duration::from_secs(6);

/// Fatal poller failure, tagged with the sequence it occurred at
#[derive(Debug)]
pub enum PollerError {
    Fetch(u64, FetchError),
    Persistence(u64, PersistenceError),
}

impl std::fmt::Display for PollerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PollerError::Fetch(seq, e) => write!(f, "Fetch failed at sequence {}: {}", seq, e),
            PollerError::Persistence(seq, e) => {
                write!(f, "Cursor persistence failed at sequence {}: {}", seq, e)
            }
        }
    }
}

impl std::error::Error for PollerError {}

/// Acceptance boundary to the record store
///
/// Invoked with each killmail that passed the filter pipeline, together
/// with its sequence number. Implementations are expected to be idempotent
/// (insert-or-skip); the returned bool reports whether a new row was
/// stored.
#[async_trait]
pub trait KillmailSink: Send + Sync {
    async fn accept(
        &self,
        killmail: &Killmail,
        sequence_id: u64,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;
}

/// Sink that persists killmails through the repository
pub struct RepositorySink {
    repository: Arc<KillmailRepository>,
}

impl RepositorySink {
    pub fn new(repository: Arc<KillmailRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl KillmailSink for RepositorySink {
    async fn accept(
        &self,
        killmail: &Killmail,
        sequence_id: u64,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        let saved = self.repository.save(killmail, sequence_id)?;
        log::info!(
            "[#{}] Kill {} | {:.0} ISK | {}",
            sequence_id,
            killmail.killmail_id,
            killmail.total_value(),
            if saved { "saved" } else { "skipped (duplicate)" }
        );
        Ok(saved)
    }
}

/// Sequential poller with durable cursor state
pub struct Poller<S: KillmailSource> {
    source: S,
    pipeline: FilterPipeline,
    cursor: CursorStore,
    shutdown: Shutdown,
    sleep_on_404: Duration,
    sleep_on_success: Duration,
}

impl<S: KillmailSource> Poller<S> {
    pub fn new(source: S, pipeline: FilterPipeline, cursor: CursorStore, shutdown: Shutdown) -> Self {
        Self {
            source,
            pipeline,
            cursor,
            shutdown,
            sleep_on_404: SLEEP_ON_404,
            sleep_on_success: SLEEP_ON_SUCCESS,
        }
    }

    /// Override the wait intervals (tests)
    pub fn with_intervals(mut self, on_404: Duration, on_success: Duration) -> Self {
        self.sleep_on_404 = on_404;
        self.sleep_on_success = on_success;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Resolve the starting sequence: explicit override, else persisted
    /// cursor + 1, else the feed's current sequence.
    async fn starting_sequence(&self, start_from: Option<u64>) -> Result<u64, PollerError> {
        if let Some(sequence_id) = start_from {
            return Ok(sequence_id);
        }
        let persisted = self
            .cursor
            .load()
            .map_err(|e| PollerError::Persistence(0, e))?;
        if persisted > 0 {
            return Ok(persisted + 1);
        }
        self.source
            .current_sequence()
            .await
            .map_err(|e| PollerError::Fetch(0, e))
    }

    /// Run the poll loop until shutdown or a fatal error.
    ///
    /// Per iteration at sequence N: fetch N; on "not yet available" wait
    /// and retry the same N; otherwise evaluate the pipeline, invoke the
    /// sink on accept, save the cursor synchronously, then advance. Both
    /// waits and the fetcher's backoff are interruptible by shutdown.
    pub async fn poll(&self, sink: &dyn KillmailSink, start_from: Option<u64>) -> Result<(), PollerError> {
        let mut sequence_id = match self.starting_sequence(start_from).await {
            Ok(seq) => seq,
            Err(PollerError::Fetch(_, FetchError::Cancelled)) => return Ok(()),
            Err(e) => {
                log::error!("❌ {}", e);
                return Err(e);
            }
        };

        log::info!("📡 Poller starting at sequence {}", sequence_id);

        while !self.shutdown.is_triggered() {
            let killmail = match self.source.killmail(sequence_id).await {
                Ok(km) => km,
                Err(FetchError::Cancelled) => break,
                Err(e) => {
                    let err = PollerError::Fetch(sequence_id, e);
                    log::error!("❌ {}", err);
                    return Err(err);
                }
            };

            let Some(killmail) = killmail else {
                // Live edge reached: same sequence again after the wait
                if self.shutdown.sleep(self.sleep_on_404).await {
                    break;
                }
                continue;
            };

            if self.pipeline.evaluate(&killmail) {
                if let Err(e) = sink.accept(&killmail, sequence_id).await {
                    log::error!("❌ Sink failed at sequence {}: {}", sequence_id, e);
                }
            } else {
                log::debug!(
                    "Filtered out kill {} at sequence {}",
                    killmail.killmail_id,
                    sequence_id
                );
            }

            // Cursor save is synchronous within the iteration; the next
            // shutdown check never observes a processed-but-unsaved sequence
            if let Err(e) = self.cursor.save(sequence_id) {
                let err = PollerError::Persistence(sequence_id, e);
                log::error!("❌ {}", err);
                return Err(err);
            }

            sequence_id += 1;

            if self.shutdown.sleep(self.sleep_on_success).await {
                break;
            }
        }

        log::info!("✅ Poller stopped before sequence {}", sequence_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poller_error_display_carries_sequence() {
        let err = PollerError::Fetch(17, FetchError::RateLimited);
        assert!(err.to_string().contains("sequence 17"));

        let err = PollerError::Persistence(
            9,
            PersistenceError::Io(std::io::Error::other("disk full")),
        );
        let msg = err.to_string();
        assert!(msg.contains("sequence 9"));
        assert!(msg.contains("disk full"));
    }
}
