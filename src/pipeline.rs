//! Chunked pipeline execution: single-producer reads, pooled chunk workers.

use crate::core::{BatchError, Employee, RawRecord, RecordSink, RecordSource, Result, Transform};
use crate::job::RunReport;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

/// What to do with a record whose transform fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformErrorPolicy {
    /// Drop the record, count it, keep the chunk going.
    SkipRecord,
    /// Fail the whole chunk the record belongs to.
    FailChunk,
}

/// What a failed chunk means for the rest of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// Already-dispatched chunks run to completion, the run is marked failed.
    FailJob,
    /// Stop pulling new chunks after the first failure, then mark failed.
    FailFast,
    /// Tolerate chunk failures; the run completes with counts attached.
    BestEffort,
}

#[derive(Debug, Clone)]
pub struct ChunkConfig {
    pub chunk_size: usize,
    pub worker_limit: usize,
    pub transform_error_policy: TransformErrorPolicy,
    pub failure_mode: FailureMode,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 10,
            worker_limit: 10,
            transform_error_policy: TransformErrorPolicy::SkipRecord,
            failure_mode: FailureMode::FailJob,
        }
    }
}

/// Drives one job run: pulls fixed-size batches off the source, hands
/// each batch to a pooled worker that transforms and writes it as one
/// atomic chunk, and folds worker results into a [`RunReport`].
///
/// Only the chunk fetch is serialized; chunks complete in any order.
pub struct ChunkExecutor {
    transform: Arc<dyn Transform>,
    sink: Arc<dyn RecordSink>,
    config: ChunkConfig,
}

struct ChunkOutcome {
    index: usize,
    written: usize,
    skipped: usize,
    transform_errors: usize,
    error: Option<String>,
}

impl ChunkExecutor {
    pub fn new(transform: Arc<dyn Transform>, sink: Arc<dyn RecordSink>, config: ChunkConfig) -> Self {
        let config = ChunkConfig {
            chunk_size: config.chunk_size.max(1),
            worker_limit: config.worker_limit.max(1),
            ..config
        };
        Self { transform, sink, config }
    }

    pub async fn run(&self, source: &dyn RecordSource) -> Result<RunReport> {
        let mut stream = source.open().await?;

        let semaphore = Arc::new(Semaphore::new(self.config.worker_limit));
        let mut workers: JoinSet<ChunkOutcome> = JoinSet::new();
        let mut report = RunReport::new();
        let mut chunk_index = 0;
        let mut exhausted = false;
        let mut fatal: Option<BatchError> = None;

        while !exhausted && fatal.is_none() {
            while let Some(joined) = workers.try_join_next() {
                absorb(&mut report, joined);
            }
            if report.chunks_failed > 0 && self.config.failure_mode == FailureMode::FailFast {
                warn!("chunk failure observed, not pulling further chunks");
                break;
            }

            // Pull one chunk's worth of lines. A strict-mode parse error
            // consumes its slot, so the resulting chunk comes up short.
            let mut batch: Vec<RawRecord> = Vec::with_capacity(self.config.chunk_size);
            let mut slots = 0;
            while slots < self.config.chunk_size {
                match stream.next().await {
                    Some(Ok(record)) => {
                        slots += 1;
                        batch.push(record);
                    }
                    Some(Err(e)) if e.is_record_level() => {
                        slots += 1;
                        report.parse_errors += 1;
                        warn!(error = %e, "input line rejected");
                    }
                    Some(Err(e)) => {
                        fatal = Some(e);
                        break;
                    }
                    None => {
                        exhausted = true;
                        break;
                    }
                }
            }
            report.lines_read += slots;

            if batch.is_empty() || fatal.is_some() {
                continue;
            }

            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let transform = self.transform.clone();
            let sink = self.sink.clone();
            let policy = self.config.transform_error_policy;
            let index = chunk_index;
            chunk_index += 1;
            report.chunks_submitted += 1;

            workers.spawn(async move {
                let _permit = permit;
                process_chunk(index, batch, transform.as_ref(), sink.as_ref(), policy).await
            });
        }

        // Dispatched chunks always resolve, even when the run is failing.
        while let Some(joined) = workers.join_next().await {
            absorb(&mut report, joined);
        }

        if let Some(e) = fatal {
            return Err(e);
        }

        report.succeeded =
            report.chunks_failed == 0 || self.config.failure_mode == FailureMode::BestEffort;
        report.complete();
        Ok(report)
    }
}

/// Transform-then-write for a single chunk, sequential within the chunk.
async fn process_chunk(
    index: usize,
    batch: Vec<RawRecord>,
    transform: &dyn Transform,
    sink: &dyn RecordSink,
    policy: TransformErrorPolicy,
) -> ChunkOutcome {
    let mut outcome = ChunkOutcome {
        index,
        written: 0,
        skipped: 0,
        transform_errors: 0,
        error: None,
    };

    let mut records: Vec<Employee> = Vec::with_capacity(batch.len());
    for raw in batch {
        let line = raw.line;
        match transform.transform(raw) {
            Ok(Some(employee)) => records.push(employee),
            Ok(None) => outcome.skipped += 1,
            Err(e) => match policy {
                TransformErrorPolicy::SkipRecord => {
                    outcome.transform_errors += 1;
                    debug!(chunk = index, line, error = %e, "record excluded from chunk");
                }
                TransformErrorPolicy::FailChunk => {
                    outcome.transform_errors += 1;
                    outcome.error = Some(format!("line {line}: {e}"));
                    return outcome;
                }
            },
        }
    }

    if records.is_empty() {
        return outcome;
    }

    match sink.write_chunk(records).await {
        Ok(persisted) => {
            outcome.written = persisted.len();
            debug!(chunk = index, written = outcome.written, "chunk persisted");
        }
        Err(e) => {
            error!(chunk = index, error = %e, "chunk write failed");
            outcome.error = Some(e.to_string());
        }
    }
    outcome
}

fn absorb(report: &mut RunReport, joined: std::result::Result<ChunkOutcome, tokio::task::JoinError>) {
    match joined {
        Ok(outcome) => {
            report.records_skipped += outcome.skipped;
            report.transform_errors += outcome.transform_errors;
            report.records_written += outcome.written;
            if let Some(error) = outcome.error {
                report.chunks_failed += 1;
                report
                    .first_failure
                    .get_or_insert(format!("chunk {}: {}", outcome.index, error));
            }
        }
        Err(join_error) => {
            error!(error = %join_error, "chunk worker panicked");
            report.chunks_failed += 1;
            report
                .first_failure
                .get_or_insert(format!("chunk worker panicked: {join_error}"));
        }
    }
}
