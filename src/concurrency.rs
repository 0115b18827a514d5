//! Fixed-size worker pool: a rayon thread pool whose workers pull archives from a
//! crossbeam queue and push outcomes back over a result channel. Workers share nothing
//! mutable; a `CancelToken` is the only cross-worker signal.

use crate::error::{FailureKind, RunError};
use crate::paths::ArchiveFile;
use crate::summary::{ArchiveFailure, ArchiveOutcome, ArchiveState, ArchiveStatus};
use crossbeam_channel::unbounded;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// What to do with an in-flight archive's unwritten batch when a run is aborted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelMode {
    /// Write the pending batch, then stop.
    Flush,
    /// Drop the pending batch; already-written batches stay.
    Discard,
}

const NOT_CANCELLED: u8 = 0;
const CANCEL_FLUSH: u8 = 1;
const CANCEL_DISCARD: u8 = 2;

/// Run-level abort request. Cheap to clone; all clones observe the same request.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicU8>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop taking archives; in-flight ones stop at the next record and flush what they matched.
    pub fn cancel(&self) {
        let _ = self.0.compare_exchange(NOT_CANCELLED, CANCEL_FLUSH, Ordering::SeqCst, Ordering::SeqCst);
    }

    /// Like `cancel`, but in-flight archives drop their pending batch.
    pub fn cancel_discarding(&self) {
        self.0.store(CANCEL_DISCARD, Ordering::SeqCst);
    }

    pub fn requested(&self) -> Option<CancelMode> {
        match self.0.load(Ordering::Relaxed) {
            NOT_CANCELLED => None,
            CANCEL_DISCARD => Some(CancelMode::Discard),
            _ => Some(CancelMode::Flush),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.requested().is_some()
    }
}

/// Run `f` once per archive on `workers` threads (pull-based, each archive exactly once).
///
/// Outcomes arrive in completion order. A panic inside `f` is contained and reported as a
/// failed archive; archives still queued after a cancel are reported as cancelled.
pub fn run_pool<F, D>(
    archives: Vec<ArchiveFile>,
    workers: usize,
    cancel: &CancelToken,
    output_dir: &Path,
    f: F,
    on_done: D,
) -> Result<Vec<ArchiveOutcome>, RunError>
where
    F: Fn(usize, &ArchiveFile) -> ArchiveOutcome + Sync,
    D: Fn(usize, &ArchiveOutcome) + Sync,
{
    let total = archives.len();
    let workers = workers.clamp(1, total.max(1));
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("archive-worker-{i}"))
        .build()?;

    let (job_tx, job_rx) = unbounded::<ArchiveFile>();
    for a in archives {
        // The receiver is alive for the whole function.
        let _ = job_tx.send(a);
    }
    drop(job_tx);
    let (res_tx, res_rx) = unbounded::<ArchiveOutcome>();

    pool.scope(|s| {
        for worker in 0..workers {
            let job_rx = job_rx.clone();
            let res_tx = res_tx.clone();
            let f = &f;
            let on_done = &on_done;
            s.spawn(move |_| {
                for archive in job_rx.iter() {
                    let outcome = if cancel.is_cancelled() {
                        ArchiveOutcome::new(&archive, archive.output_path(output_dir))
                    } else {
                        catch_unwind(AssertUnwindSafe(|| f(worker, &archive)))
                            .unwrap_or_else(|panic| panicked(worker, &archive, output_dir, panic))
                    };
                    on_done(worker, &outcome);
                    if res_tx.send(outcome).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(res_tx);

    let outcomes: Vec<ArchiveOutcome> = res_rx.iter().collect();
    debug_assert_eq!(outcomes.len(), total);
    Ok(outcomes)
}

fn panicked(
    worker: usize,
    archive: &ArchiveFile,
    output_dir: &Path,
    panic: Box<dyn std::any::Any + Send>,
) -> ArchiveOutcome {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "worker panicked".to_string());
    tracing::error!(worker, archive = %archive.path.display(), "pipeline panicked: {message}");
    let mut outcome = ArchiveOutcome::new(archive, archive.output_path(output_dir));
    outcome.worker = Some(worker);
    outcome.status = ArchiveStatus::Failed(ArchiveFailure {
        kind: FailureKind::WorkerPanic,
        stage: ArchiveState::Streaming,
        position: None,
        message,
    });
    outcome
}
