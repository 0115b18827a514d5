use crate::concurrency::{run_pool, CancelToken};
use crate::config::RunOptions;
use crate::error::{FailureKind, RunError};
use crate::paths::{discover_archives, total_compressed_size, ArchiveFile};
use crate::progress::{ConsoleProgress, NoProgress, ProgressObserver};
use crate::streaming::{process_archive, ArchiveJob};
use crate::summary::{ArchiveFailure, ArchiveOutcome, ArchiveState, ArchiveStatus, RunSummary};
use crate::util::init_tracing_once;
use ahash::AHashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Orchestrates one run: discover archives, fan them out over the worker pool, and collect
/// a `RunSummary`. The options are frozen at construction; nothing mutable is shared
/// between workers.
#[derive(Clone)]
pub struct SubredditExtractor {
    pub(crate) opts: RunOptions,
    observer: Arc<dyn ProgressObserver>,
    cancel: CancelToken,
}

impl SubredditExtractor {
    pub fn new(opts: RunOptions) -> Self {
        Self { opts, observer: Arc::new(NoProgress), cancel: CancelToken::new() }
    }

    // -------- Builder methods --------

    /// Render indicatif progress bars on stderr.
    pub fn progress(mut self, yes: bool) -> Self {
        self.observer = if yes { Arc::new(ConsoleProgress::new()) } else { Arc::new(NoProgress) };
        self
    }

    /// Send progress events to a custom observer.
    pub fn observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Use an externally owned cancel token (e.g. one wired to a signal handler).
    pub fn cancel_with(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn options(&self) -> &RunOptions {
        &self.opts
    }

    /// A handle that aborts this extractor's runs.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    // -------- Operations --------

    /// Process every archive found under the data directory.
    pub fn run(&self) -> Result<RunSummary, RunError> {
        init_tracing_once();
        let archives = discover_archives(&self.opts.data_dir, &self.opts.archive_extension)
            .map_err(|source| RunError::InputDir { path: self.opts.data_dir.clone(), source })?;

        if archives.is_empty() {
            tracing::warn!(
                dir = %self.opts.data_dir.display(),
                extension = %self.opts.archive_extension,
                "No archives found. Nothing to do."
            );
        } else {
            tracing::info!("Found {} archives in {}", archives.len(), self.opts.data_dir.display());
        }
        self.run_archives(archives)
    }

    /// Process exactly the given archives, e.g. the unfinished ones of an earlier summary.
    /// Each archive is rewritten from scratch. Two archives that map to the same output
    /// file never both run: the later one is reported as an `OutputConflict` failure.
    pub fn run_archives(&self, archives: Vec<ArchiveFile>) -> Result<RunSummary, RunError> {
        init_tracing_once();
        let opts = &self.opts;
        fs::create_dir_all(&opts.output_dir)
            .map_err(|source| RunError::OutputDir { path: opts.output_dir.clone(), source })?;

        let (archives, conflicts) = claim_outputs(archives, &opts.output_dir);

        let workers = opts.num_workers.clamp(1, archives.len().max(1));
        if workers < opts.num_workers {
            tracing::info!(
                "{} archives is fewer than the configured {} workers; using {}",
                archives.len(),
                opts.num_workers,
                workers
            );
        }
        tracing::info!(
            workers,
            batch_size = opts.params.batch_size,
            max_window = opts.params.max_window_size,
            targets = ?opts.filter.sorted(),
            "starting worker pool"
        );

        let observer = self.observer.as_ref();
        observer.run_started(archives.len(), workers, total_compressed_size(&archives));

        let mut outcomes = run_pool(
            archives,
            workers,
            &self.cancel,
            &opts.output_dir,
            |worker, archive| {
                process_archive(&ArchiveJob {
                    archive,
                    output_dir: &opts.output_dir,
                    filter: &opts.filter,
                    params: &opts.params,
                    cancel: &self.cancel,
                    observer,
                    worker,
                })
            },
            |worker, outcome| observer.archive_finished(worker, outcome),
        )?;

        outcomes.extend(conflicts);
        let summary = RunSummary::from_outcomes(outcomes);
        observer.run_finished(&summary);
        summary.log();
        Ok(summary)
    }
}

/// Give every output file to exactly one archive. Repeated archives are dropped; a distinct
/// archive whose output file is already claimed fails without running.
fn claim_outputs(archives: Vec<ArchiveFile>, output_dir: &Path) -> (Vec<ArchiveFile>, Vec<ArchiveOutcome>) {
    let mut owners: AHashMap<PathBuf, PathBuf> = AHashMap::with_capacity(archives.len());
    let mut runnable = Vec::with_capacity(archives.len());
    let mut conflicts = Vec::new();

    for archive in archives {
        let output = archive.output_path(output_dir);
        match owners.get(&output) {
            Some(owner) if *owner == archive.path => {
                tracing::warn!(
                    archive = %archive.path.display(),
                    "archive listed more than once; running it once"
                );
            }
            Some(owner) => {
                tracing::warn!(
                    archive = %archive.path.display(),
                    owner = %owner.display(),
                    output = %output.display(),
                    "output file already belongs to another archive"
                );
                let mut outcome = ArchiveOutcome::new(&archive, output.clone());
                outcome.status = ArchiveStatus::Failed(ArchiveFailure {
                    kind: FailureKind::OutputConflict,
                    stage: ArchiveState::Idle,
                    position: None,
                    message: format!("output {} is already written by {}", output.display(), owner.display()),
                });
                conflicts.push(outcome);
            }
            None => {
                owners.insert(output, archive.path.clone());
                runnable.push(archive);
            }
        }
    }
    (runnable, conflicts)
}
