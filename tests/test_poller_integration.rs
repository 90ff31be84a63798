//! Integration tests for the poller loop
//!
//! A scripted `KillmailSource` fake drives the loop through the interesting
//! sequences: not-yet-available retries, filter rejects, sink failures,
//! fatal fetch errors, and shutdown during a wait. The cursor file is
//! inspected on disk to verify advancement semantics.

use async_trait::async_trait;
use killfeed::cursor::CursorStore;
use killfeed::fetch::{FetchError, KillmailSource};
use killfeed::filters::level1::NpcFilter;
use killfeed::filters::FilterPipeline;
use killfeed::killmail::Killmail;
use killfeed::poller::{KillmailSink, Poller, PollerError};
use killfeed::shutdown::Shutdown;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tempfile::tempdir;

/// One scripted response of the fake source
enum Step {
    NotYet,
    Kill(Box<Killmail>),
    Fail(FetchError),
}

/// Fake source that replays a script and records what the poller asked for.
///
/// Each `killmail` call also snapshots the on-disk cursor, so tests can
/// assert the cursor did not move while a sequence was pending. Once the
/// script is exhausted the source triggers shutdown and reports "not yet
/// available".
struct ScriptedSource {
    script: Mutex<VecDeque<Step>>,
    current_sequence: u64,
    cursor_path: PathBuf,
    /// (requested sequence, cursor value on disk at call time)
    observed: Mutex<Vec<(u64, u64)>>,
    shutdown: Shutdown,
}

impl ScriptedSource {
    fn new(script: Vec<Step>, cursor_path: PathBuf, shutdown: Shutdown) -> Self {
        Self {
            script: Mutex::new(script.into()),
            current_sequence: 500,
            cursor_path,
            observed: Mutex::new(Vec::new()),
            shutdown,
        }
    }

    fn read_cursor(&self) -> u64 {
        std::fs::read_to_string(&self.cursor_path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0)
    }

    fn observed(&self) -> Vec<(u64, u64)> {
        self.observed.lock().unwrap().clone()
    }
}

#[async_trait]
impl KillmailSource for ScriptedSource {
    async fn current_sequence(&self) -> Result<u64, FetchError> {
        Ok(self.current_sequence)
    }

    async fn killmail(&self, sequence_id: u64) -> Result<Option<Killmail>, FetchError> {
        self.observed
            .lock()
            .unwrap()
            .push((sequence_id, self.read_cursor()));

        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Step::NotYet) => Ok(None),
            Some(Step::Kill(km)) => Ok(Some(*km)),
            Some(Step::Fail(e)) => Err(e),
            None => {
                self.shutdown.trigger();
                Ok(None)
            }
        }
    }
}

/// Sink that records accepted killmails; optionally always fails
struct MemorySink {
    accepted: Mutex<Vec<(u64, u64)>>,
    fail: bool,
}

impl MemorySink {
    fn new() -> Self {
        Self {
            accepted: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            accepted: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    fn accepted(&self) -> Vec<(u64, u64)> {
        self.accepted.lock().unwrap().clone()
    }
}

#[async_trait]
impl KillmailSink for MemorySink {
    async fn accept(
        &self,
        killmail: &Killmail,
        sequence_id: u64,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        self.accepted
            .lock()
            .unwrap()
            .push((killmail.killmail_id, sequence_id));
        if self.fail {
            return Err("record store unavailable".into());
        }
        Ok(true)
    }
}

fn killmail_json(killmail_id: u64, npc: bool) -> Killmail {
    serde_json::from_str(&format!(
        r#"{{
            "killmail_id": {},
            "hash": "h",
            "esi": {{
                "killmail_time": "2026-08-25T10:00:00Z",
                "solar_system_id": 30000142,
                "victim": {{"ship_type_id": 587}}
            }},
            "zkb": {{"npc": {}, "totalValue": 1000.0}}
        }}"#,
        killmail_id, npc
    ))
    .unwrap()
}

fn fast_poller(
    source: ScriptedSource,
    pipeline: FilterPipeline,
    cursor: CursorStore,
    shutdown: Shutdown,
) -> Poller<ScriptedSource> {
    Poller::new(source, pipeline, cursor, shutdown)
        .with_intervals(Duration::from_millis(1), Duration::from_millis(1))
}

#[tokio::test]
async fn test_404_retries_same_sequence_then_advances() {
    let dir = tempdir().unwrap();
    let cursor_path = dir.path().join("cursor.txt");

    // Persisted cursor 9: poller must resume at 10
    CursorStore::new(&cursor_path).save(9).unwrap();

    let shutdown = Shutdown::new();
    let source = ScriptedSource::new(
        vec![
            Step::NotYet,
            Step::NotYet,
            Step::NotYet,
            Step::Kill(Box::new(killmail_json(777, false))),
        ],
        cursor_path.clone(),
        shutdown.clone(),
    );

    let sink = MemorySink::new();
    let poller = fast_poller(
        source,
        FilterPipeline::new(),
        CursorStore::new(&cursor_path),
        shutdown,
    );

    poller.poll(&sink, None).await.unwrap();

    // All fetches targeted sequence 10, and the cursor stayed at 9
    // throughout the three 404s
    let observed = poller_source(&poller).observed();
    assert_eq!(observed[0], (10, 9));
    assert_eq!(observed[1], (10, 9));
    assert_eq!(observed[2], (10, 9));
    assert_eq!(observed[3], (10, 9));

    // After the record was processed the cursor advanced to 10 exactly once
    assert_eq!(CursorStore::new(&cursor_path).load().unwrap(), 10);
    assert_eq!(sink.accepted(), vec![(777, 10)]);
}

#[tokio::test]
async fn test_filtered_record_advances_cursor_without_callback() {
    let dir = tempdir().unwrap();
    let cursor_path = dir.path().join("cursor.txt");
    CursorStore::new(&cursor_path).save(4).unwrap();

    let shutdown = Shutdown::new();
    let source = ScriptedSource::new(
        vec![Step::Kill(Box::new(killmail_json(888, true)))],
        cursor_path.clone(),
        shutdown.clone(),
    );

    let mut pipeline = FilterPipeline::new();
    pipeline.add_level1(NpcFilter::new(true));

    let sink = MemorySink::new();
    let poller = fast_poller(source, pipeline, CursorStore::new(&cursor_path), shutdown);

    poller.poll(&sink, None).await.unwrap();

    // Rejected by the pipeline: no callback, but the sequence still counts
    // as processed
    assert!(sink.accepted().is_empty());
    assert_eq!(CursorStore::new(&cursor_path).load().unwrap(), 5);
}

#[tokio::test]
async fn test_sink_failure_does_not_stall_the_loop() {
    let dir = tempdir().unwrap();
    let cursor_path = dir.path().join("cursor.txt");
    CursorStore::new(&cursor_path).save(20).unwrap();

    let shutdown = Shutdown::new();
    let source = ScriptedSource::new(
        vec![
            Step::Kill(Box::new(killmail_json(1, false))),
            Step::Kill(Box::new(killmail_json(2, false))),
        ],
        cursor_path.clone(),
        shutdown.clone(),
    );

    let sink = MemorySink::failing();
    let poller = fast_poller(
        source,
        FilterPipeline::new(),
        CursorStore::new(&cursor_path),
        shutdown,
    );

    poller.poll(&sink, None).await.unwrap();

    // Both sequences were attempted and the cursor advanced past both
    assert_eq!(sink.accepted().len(), 2);
    assert_eq!(CursorStore::new(&cursor_path).load().unwrap(), 22);
}

#[tokio::test]
async fn test_fetch_error_is_fatal_and_preserves_cursor() {
    let dir = tempdir().unwrap();
    let cursor_path = dir.path().join("cursor.txt");
    CursorStore::new(&cursor_path).save(30).unwrap();

    let shutdown = Shutdown::new();
    let source = ScriptedSource::new(
        vec![Step::Fail(FetchError::RateLimited)],
        cursor_path.clone(),
        shutdown.clone(),
    );

    let sink = MemorySink::new();
    let poller = fast_poller(
        source,
        FilterPipeline::new(),
        CursorStore::new(&cursor_path),
        shutdown,
    );

    let err = poller.poll(&sink, None).await.unwrap_err();
    match err {
        PollerError::Fetch(31, FetchError::RateLimited) => {}
        other => panic!("unexpected error: {}", other),
    }

    // The failed sequence was never marked processed
    assert_eq!(CursorStore::new(&cursor_path).load().unwrap(), 30);
    assert!(sink.accepted().is_empty());
}

#[tokio::test]
async fn test_explicit_start_overrides_cursor() {
    let dir = tempdir().unwrap();
    let cursor_path = dir.path().join("cursor.txt");
    CursorStore::new(&cursor_path).save(100).unwrap();

    let shutdown = Shutdown::new();
    let source = ScriptedSource::new(vec![], cursor_path.clone(), shutdown.clone());
    let sink = MemorySink::new();
    let poller = fast_poller(
        source,
        FilterPipeline::new(),
        CursorStore::new(&cursor_path),
        shutdown,
    );

    poller.poll(&sink, Some(7)).await.unwrap();

    let observed = poller_source(&poller).observed();
    assert_eq!(observed[0].0, 7);
}

#[tokio::test]
async fn test_no_state_falls_back_to_current_sequence() {
    let dir = tempdir().unwrap();
    let cursor_path = dir.path().join("cursor.txt");

    let shutdown = Shutdown::new();
    let source = ScriptedSource::new(vec![], cursor_path.clone(), shutdown.clone());
    let sink = MemorySink::new();
    let poller = fast_poller(
        source,
        FilterPipeline::new(),
        CursorStore::new(&cursor_path),
        shutdown,
    );

    poller.poll(&sink, None).await.unwrap();

    // No cursor file and no override: starts at the feed's current edge
    let observed = poller_source(&poller).observed();
    assert_eq!(observed[0].0, 500);
}

#[tokio::test]
async fn test_shutdown_interrupts_not_yet_available_wait() {
    let dir = tempdir().unwrap();
    let cursor_path = dir.path().join("cursor.txt");
    CursorStore::new(&cursor_path).save(50).unwrap();

    let shutdown = Shutdown::new();
    // Endless 404s with a wait far longer than the test timeout
    let source = ScriptedSource::new(
        vec![Step::NotYet, Step::NotYet, Step::NotYet],
        cursor_path.clone(),
        Shutdown::new(), // script exhaustion must not trigger the real token
    );

    let sink = MemorySink::new();
    let poller = Poller::new(
        source,
        FilterPipeline::new(),
        CursorStore::new(&cursor_path),
        shutdown.clone(),
    )
    .with_intervals(Duration::from_secs(60), Duration::from_secs(60));

    let trigger = shutdown.clone();
    let handle = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.trigger();
    });

    // The loop must stop well within the 60 s wait
    let result = tokio::time::timeout(Duration::from_secs(2), poller.poll(&sink, None)).await;
    result.expect("poller must stop promptly on shutdown").unwrap();
    handle.await.unwrap();

    // Cursor untouched: no sequence was processed
    assert_eq!(CursorStore::new(&cursor_path).load().unwrap(), 50);
}

/// Access the source back out of the poller for assertions
fn poller_source<'a>(poller: &'a Poller<ScriptedSource>) -> &'a ScriptedSource {
    poller.source()
}
