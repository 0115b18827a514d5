//! Error taxonomy. Run-scoped errors (`ConfigError`, `RunError`) abort the whole run;
//! archive-scoped errors (`ArchiveError`) are recorded in the summary and never cross
//! worker boundaries; `ParseError` never leaves the line parser.

use serde::Serialize;
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("cannot read configuration file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse configuration file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot read input directory {}: {source}", .path.display())]
    InputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot create output directory {}: {source}", .path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Where in an archive's stream something happened.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StreamPosition {
    /// Last line number handed to the parser (1-based, 0 before the first line).
    pub line: u64,
    pub decoded_bytes: u64,
    pub compressed_bytes: u64,
}

impl fmt::Display for StreamPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line {} (decoded byte {}, compressed byte {})",
            self.line, self.decoded_bytes, self.compressed_bytes
        )
    }
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("cannot open archive {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("decompression failed at {position}: {source}")]
    Decompression {
        position: StreamPosition,
        #[source]
        source: io::Error,
    },

    #[error("cannot write {} at {position}: {source}", .path.display())]
    Write {
        path: PathBuf,
        position: StreamPosition,
        #[source]
        source: io::Error,
    },
}

impl ArchiveError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ArchiveError::Open { .. } => FailureKind::ArchiveOpen,
            ArchiveError::Decompression { .. } => FailureKind::Decompression,
            ArchiveError::Write { .. } => FailureKind::Write,
        }
    }

    pub fn position(&self) -> Option<StreamPosition> {
        match self {
            ArchiveError::Open { .. } => None,
            ArchiveError::Decompression { position, .. } | ArchiveError::Write { position, .. } => Some(*position),
        }
    }

    /// Fill in the line number, which only the parser knows.
    pub(crate) fn at_line(mut self, line: u64) -> Self {
        if let ArchiveError::Decompression { position, .. } | ArchiveError::Write { position, .. } = &mut self {
            position.line = line;
        }
        self
    }
}

/// Kind of archive-level failure as surfaced in the run summary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    ArchiveOpen,
    Decompression,
    Write,
    WorkerPanic,
    /// Another archive in the same run already owns the output file.
    OutputConflict,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::ArchiveOpen => "ArchiveOpenError",
            FailureKind::Decompression => "DecompressionError",
            FailureKind::Write => "WriteError",
            FailureKind::WorkerPanic => "WorkerPanic",
            FailureKind::OutputConflict => "OutputConflictError",
        };
        f.write_str(s)
    }
}

/// One malformed line. Counted and skipped by the parser.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize)]
#[error("line {line}: {message}")]
pub struct ParseError {
    pub line: u64,
    pub message: String,
}
