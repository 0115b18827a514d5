//! The per-archive pipeline run by one worker:
//! decompress → split lines → decode → filter → batch-write, with the archive's state
//! machine `Idle → Opening → Streaming → Flushing → Done | Failed`.

use crate::batch::BatchWriter;
use crate::concurrency::{CancelMode, CancelToken};
use crate::config::PipelineParams;
use crate::error::{ArchiveError, StreamPosition};
use crate::filters::{matches, FilterConfig};
use crate::ndjson::LineRecordParser;
use crate::paths::ArchiveFile;
use crate::progress::ProgressObserver;
use crate::summary::{ArchiveFailure, ArchiveOutcome, ArchiveState, ArchiveStatus};
use crate::zstd_jsonl::StreamingDecompressor;
use std::path::Path;
use std::time::Instant;

/// Everything one archive's run reads. Shared read-only between workers.
pub struct ArchiveJob<'a> {
    pub archive: &'a ArchiveFile,
    pub output_dir: &'a Path,
    pub filter: &'a FilterConfig,
    pub params: &'a PipelineParams,
    pub cancel: &'a CancelToken,
    pub observer: &'a dyn ProgressObserver,
    pub worker: usize,
}

struct Tracker<'a> {
    archive: &'a Path,
    state: ArchiveState,
}

impl Tracker<'_> {
    fn enter(&mut self, next: ArchiveState) {
        tracing::debug!(archive = %self.archive.display(), from = ?self.state, to = ?next, "archive state");
        self.state = next;
    }
}

/// Run the full pipeline for one archive and report how it ended. Never panics on I/O
/// problems: every archive-scoped error ends up in the returned outcome.
pub fn process_archive(job: &ArchiveJob<'_>) -> ArchiveOutcome {
    let started = Instant::now();
    let output_path = job.archive.output_path(job.output_dir);
    let mut outcome = ArchiveOutcome::new(job.archive, output_path.clone());
    outcome.worker = Some(job.worker);
    let mut tracker = Tracker { archive: &job.archive.path, state: ArchiveState::Idle };

    tracing::info!(worker = job.worker, archive = %job.archive.path.display(), "processing archive");
    job.observer.archive_started(job.worker, job.archive);

    let result = run_pipeline(job, &output_path, &mut tracker, &mut outcome);
    outcome.elapsed_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(Finished::Done) => {
            tracker.enter(ArchiveState::Done);
            outcome.status = ArchiveStatus::Done;
            tracing::info!(
                worker = job.worker,
                archive = %job.archive.path.display(),
                scanned = outcome.records_scanned,
                matched = outcome.records_matched,
                parse_errors = outcome.parse_errors,
                elapsed_ms = outcome.elapsed_ms,
                "finished archive"
            );
        }
        Ok(Finished::Cancelled) => {
            outcome.status = ArchiveStatus::Cancelled;
            tracing::warn!(archive = %job.archive.path.display(), matched = outcome.records_matched, "archive cancelled");
        }
        Err(e) => {
            let stage = tracker.state;
            tracker.enter(ArchiveState::Failed);
            tracing::warn!(archive = %job.archive.path.display(), stage = ?stage, error = %e, "archive failed");
            outcome.status = ArchiveStatus::Failed(ArchiveFailure {
                kind: e.kind(),
                stage,
                position: e.position(),
                message: e.to_string(),
            });
        }
    }
    outcome
}

enum Finished {
    Done,
    Cancelled,
}

fn run_pipeline(
    job: &ArchiveJob<'_>,
    output_path: &Path,
    tracker: &mut Tracker<'_>,
    outcome: &mut ArchiveOutcome,
) -> Result<Finished, ArchiveError> {
    let params = job.params;

    tracker.enter(ArchiveState::Opening);
    let decoder = StreamingDecompressor::open(&job.archive.path, params.max_window_size, params.read_buffer_bytes)?
        .with_low_memory_threshold(params.low_memory_threshold);
    let write_err = |source, position| ArchiveError::Write { path: output_path.to_path_buf(), position, source };
    let mut writer = BatchWriter::create(output_path, params.batch_size, params.write_buffer_bytes)
        .map_err(|e| write_err(e, StreamPosition::default()))?;

    tracker.enter(ArchiveState::Streaming);
    let mut parser = LineRecordParser::new(decoder);
    let mut reported = 0u64;
    let mut upstream: Option<ArchiveError> = None;
    let mut cancelled = None;

    let position = |p: &LineRecordParser<StreamingDecompressor>| StreamPosition {
        line: p.lines(),
        ..p.inner().stream_position()
    };

    while let Some(item) = parser.next() {
        let compressed = parser.inner().compressed_bytes();
        if compressed > reported {
            job.observer.bytes_read(job.worker, compressed - reported);
            reported = compressed;
        }
        match item {
            Ok(record) => {
                outcome.records_scanned += 1;
                if matches(&record, job.filter) {
                    if let Err(e) = writer.append(record) {
                        sync_counters(outcome, &parser);
                        writer.discard();
                        outcome.records_matched = writer.written();
                        return Err(write_err(e, position(&parser)));
                    }
                    outcome.records_matched += 1;
                }
            }
            Err(e) => {
                upstream = Some(e);
                break;
            }
        }
        if let Some(mode) = job.cancel.requested() {
            cancelled = Some(mode);
            break;
        }
    }
    sync_counters(outcome, &parser);
    if let Some(first) = parser.first_error() {
        tracing::debug!(
            archive = %job.archive.path.display(),
            skipped = parser.parse_errors(),
            "first malformed line: {first}"
        );
    }
    let compressed = parser.inner().compressed_bytes();
    if compressed > reported {
        job.observer.bytes_read(job.worker, compressed - reported);
    }

    // Matched records are flushed even when the stream broke, unless a cancel asked to drop them.
    // A broken stream stays attributed to Streaming.
    if upstream.is_none() {
        tracker.enter(ArchiveState::Flushing);
    }
    if cancelled == Some(CancelMode::Discard) {
        let dropped = writer.discard();
        outcome.records_matched -= dropped as u64;
    }
    let end = position(&parser);
    drop(parser);
    let flushed = writer.finish().map_err(|e| write_err(e, end));

    match (upstream, flushed) {
        (Some(e), Ok(_)) => Err(e),
        (Some(e), Err(w)) => {
            tracing::warn!(archive = %job.archive.path.display(), error = %w, "flush after decode error also failed");
            Err(e)
        }
        (None, Err(w)) => Err(w),
        (None, Ok(_)) if cancelled.is_some() => Ok(Finished::Cancelled),
        (None, Ok(_)) => Ok(Finished::Done),
    }
}

fn sync_counters(outcome: &mut ArchiveOutcome, parser: &LineRecordParser<StreamingDecompressor>) {
    outcome.parse_errors = parser.parse_errors();
    outcome.decoded_bytes = parser.inner().decoded_bytes();
    outcome.compressed_bytes = parser.inner().compressed_bytes();
}
