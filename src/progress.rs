//! Progress reporting. The pipeline emits events to a `ProgressObserver`; correctness never
//! depends on it. `ConsoleProgress` renders them with indicatif.

use crate::paths::ArchiveFile;
use crate::summary::{ArchiveOutcome, RunSummary};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use parking_lot::Mutex;
use std::time::Duration;

/// Receives progress events from the orchestrator and its workers.
/// All methods default to no-ops; implementations must be cheap and thread-safe.
pub trait ProgressObserver: Send + Sync {
    fn run_started(&self, _archives: usize, _workers: usize, _total_bytes: u64) {}
    fn archive_started(&self, _worker: usize, _archive: &ArchiveFile) {}
    /// `delta` compressed bytes consumed by `worker` since its last report.
    fn bytes_read(&self, _worker: usize, _delta: u64) {}
    fn archive_finished(&self, _worker: usize, _outcome: &ArchiveOutcome) {}
    fn run_finished(&self, _summary: &RunSummary) {}
}

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {}

const TICK: Duration = Duration::from_millis(100);

fn bytes_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.green} {msg:<28} {bytes:>10}/{total_bytes:<10} [{bar:30.cyan/blue}] {percent:>3}%  \
         {bytes_per_sec}  eta: {eta_precise}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█▉▊▋▌▍▎▏  ")
}

fn count_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.green} {msg} {pos}/{len} [{bar:30.cyan/blue}] {percent:>3}%  \
         elapsed: {elapsed_precise}  eta: {eta_precise}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█▉▊▋▌▍▎▏  ")
}

/// One byte-level bar per worker plus an archives-completed bar.
pub struct ConsoleProgress {
    mp: MultiProgress,
    files: ProgressBar,
    workers: Mutex<Vec<ProgressBar>>,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    /// Same bars, drawn nowhere. Useful in tests.
    pub fn hidden() -> Self {
        Self::with_target(ProgressDrawTarget::hidden())
    }

    fn with_target(target: ProgressDrawTarget) -> Self {
        let mp = MultiProgress::with_draw_target(target);
        let files = mp.add(ProgressBar::new(0));
        files.set_style(count_style());
        files.set_message("Archives processed");
        Self { mp, files, workers: Mutex::new(Vec::new()) }
    }

    fn worker_bar(&self, worker: usize) -> Option<ProgressBar> {
        self.workers.lock().get(worker).cloned()
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressObserver for ConsoleProgress {
    fn run_started(&self, archives: usize, workers: usize, _total_bytes: u64) {
        self.files.set_length(archives as u64);
        self.files.enable_steady_tick(TICK);
        let mut bars = self.workers.lock();
        for _ in bars.len()..workers {
            let pb = self.mp.insert_before(&self.files, ProgressBar::new(0));
            pb.set_style(bytes_style());
            bars.push(pb);
        }
    }

    fn archive_started(&self, worker: usize, archive: &ArchiveFile) {
        if let Some(pb) = self.worker_bar(worker) {
            pb.reset();
            pb.set_length(archive.size);
            pb.set_message(format!("Worker {worker}: {}", archive.file_name()));
            pb.enable_steady_tick(TICK);
        }
    }

    fn bytes_read(&self, worker: usize, delta: u64) {
        if let Some(pb) = self.worker_bar(worker) {
            pb.inc(delta);
        }
    }

    fn archive_finished(&self, worker: usize, _outcome: &ArchiveOutcome) {
        if let Some(pb) = self.worker_bar(worker) {
            pb.disable_steady_tick();
            pb.set_message(format!("Worker {worker}: idle"));
        }
        self.files.inc(1);
    }

    fn run_finished(&self, summary: &RunSummary) {
        for pb in self.workers.lock().drain(..) {
            pb.finish_and_clear();
        }
        self.files.finish_with_message(format!(
            "Archives processed ({} ok, {} failed)",
            summary.succeeded(),
            summary.failed().count()
        ));
    }
}
