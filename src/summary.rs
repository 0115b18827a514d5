//! Per-archive outcomes and the run-level summary assembled from them.

use crate::error::{FailureKind, StreamPosition};
use crate::paths::ArchiveFile;
use crate::util::create_with_backoff;
use anyhow::{Context, Result};
use serde::Serialize;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Lifecycle of one archive inside its worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ArchiveState {
    Idle,
    Opening,
    Streaming,
    Flushing,
    Done,
    Failed,
}

impl ArchiveState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ArchiveState::Done | ArchiveState::Failed)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ArchiveFailure {
    pub kind: FailureKind,
    /// State the archive was in when it failed.
    pub stage: ArchiveState,
    pub position: Option<StreamPosition>,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ArchiveStatus {
    Done,
    Failed(ArchiveFailure),
    /// A run-level abort stopped this archive or kept it from starting.
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ArchiveOutcome {
    pub archive: PathBuf,
    pub output: PathBuf,
    pub worker: Option<usize>,
    pub records_scanned: u64,
    pub records_matched: u64,
    pub parse_errors: u64,
    pub decoded_bytes: u64,
    pub compressed_bytes: u64,
    pub elapsed_ms: u64,
    pub status: ArchiveStatus,
}

impl ArchiveOutcome {
    pub(crate) fn new(archive: &ArchiveFile, output: PathBuf) -> Self {
        Self {
            archive: archive.path.clone(),
            output,
            worker: None,
            records_scanned: 0,
            records_matched: 0,
            parse_errors: 0,
            decoded_bytes: 0,
            compressed_bytes: 0,
            elapsed_ms: 0,
            status: ArchiveStatus::Cancelled,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self.status, ArchiveStatus::Done)
    }

    pub fn failure(&self) -> Option<&ArchiveFailure> {
        match &self.status {
            ArchiveStatus::Failed(f) => Some(f),
            _ => None,
        }
    }
}

/// Everything a run produced, one entry per archive, sorted by archive path.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RunSummary {
    pub archives: Vec<ArchiveOutcome>,
}

impl RunSummary {
    pub fn from_outcomes(mut archives: Vec<ArchiveOutcome>) -> Self {
        archives.sort_by(|a, b| a.archive.cmp(&b.archive));
        Self { archives }
    }

    pub fn get(&self, archive: &Path) -> Option<&ArchiveOutcome> {
        self.archives.iter().find(|o| o.archive == archive)
    }

    pub fn total_scanned(&self) -> u64 {
        self.archives.iter().map(|o| o.records_scanned).sum()
    }

    pub fn total_matched(&self) -> u64 {
        self.archives.iter().map(|o| o.records_matched).sum()
    }

    pub fn total_parse_errors(&self) -> u64 {
        self.archives.iter().map(|o| o.parse_errors).sum()
    }

    pub fn succeeded(&self) -> usize {
        self.archives.iter().filter(|o| o.is_done()).count()
    }

    pub fn cancelled(&self) -> usize {
        self.archives.iter().filter(|o| matches!(o.status, ArchiveStatus::Cancelled)).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = (&ArchiveOutcome, &ArchiveFailure)> {
        self.archives.iter().filter_map(|o| o.failure().map(|f| (o, f)))
    }

    /// Archives worth re-running: failed or cancelled ones.
    pub fn unfinished_archives(&self) -> Vec<PathBuf> {
        self.archives.iter().filter(|o| !o.is_done()).map(|o| o.archive.clone()).collect()
    }

    /// True when every archive completed.
    pub fn is_clean(&self) -> bool {
        self.succeeded() == self.archives.len()
    }

    /// Write the summary as pretty JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let f = create_with_backoff(path, 16, 50).with_context(|| format!("create {}", path.display()))?;
        let mut w = BufWriter::new(f);
        serde_json::to_writer_pretty(&mut w, self)?;
        w.write_all(b"\n")?;
        w.flush()?;
        Ok(())
    }

    /// Log one line per failure and the totals.
    pub fn log(&self) {
        for (o, f) in self.failed() {
            match &f.position {
                Some(pos) => tracing::error!(
                    archive = %o.archive.display(), kind = %f.kind, stage = ?f.stage, at = %pos,
                    "archive failed: {}", f.message
                ),
                None => tracing::error!(
                    archive = %o.archive.display(), kind = %f.kind, stage = ?f.stage,
                    "archive failed: {}", f.message
                ),
            }
        }
        tracing::info!(
            archives = self.archives.len(),
            succeeded = self.succeeded(),
            failed = self.failed().count(),
            cancelled = self.cancelled(),
            scanned = self.total_scanned(),
            matched = self.total_matched(),
            parse_errors = self.total_parse_errors(),
            "run complete"
        );
    }
}
