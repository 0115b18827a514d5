mod batch;
mod concurrency;
mod config;
mod error;
mod filters;
mod mem;
mod ndjson;
mod paths;
mod pipeline;
mod progress;
mod record;
mod streaming;
mod summary;
mod util;
mod zstd_jsonl;

pub use crate::config::{FileConfig, LogFormat, LoggingConfig, PipelineParams, RunOptions, DEFAULT_CONFIG_FILE};
pub use crate::error::{ArchiveError, ConfigError, FailureKind, ParseError, RunError, StreamPosition};
pub use crate::pipeline::SubredditExtractor;
pub use crate::summary::{ArchiveFailure, ArchiveOutcome, ArchiveState, ArchiveStatus, RunSummary};

// Pipeline stages, usable on their own.
pub use crate::batch::BatchWriter;
pub use crate::filters::{matches, FilterConfig};
pub use crate::ndjson::{decode_line, LineRecordParser};
pub use crate::record::{Record, LABEL_FIELD};
pub use crate::streaming::{process_archive, ArchiveJob};
pub use crate::zstd_jsonl::{window_log_for, DecodedChunk, StreamingDecompressor};

// Orchestration helpers.
pub use crate::concurrency::{run_pool, CancelMode, CancelToken};
pub use crate::paths::{discover_archives, ArchiveFile, OUTPUT_EXTENSION};

// Progress observers.
pub use crate::progress::{ConsoleProgress, NoProgress, ProgressObserver};

// Logging setup for binaries.
pub use crate::util::{init_tracing, init_tracing_once};

// Memory helpers for callers that want their own throttling.
pub use crate::mem::{available_memory_fraction, maybe_throttle_low_memory};
