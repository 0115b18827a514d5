use crate::config::{LogFormat, LoggingConfig};
use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;
use std::thread::sleep;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// -------- tracing --------

static INIT_ONCE: std::sync::Once = std::sync::Once::new();

/// Default subscriber for library callers that did not install one.
pub fn init_tracing_once() {
    INIT_ONCE.call_once(|| {
        let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let _ = tracing_subscriber::fmt().with_env_filter(env_filter).try_init();
    });
}

/// Install the subscriber described by the `[logging]` section.
/// `RUST_LOG`, when set, overrides `logging.level`.
pub fn init_tracing(cfg: &LoggingConfig) -> Result<()> {
    let directive = std::env::var("RUST_LOG").unwrap_or_else(|_| cfg.level.clone());
    let filter = EnvFilter::try_new(&directive)
        .with_context(|| format!("invalid log level directive `{directive}`"))?;

    let file = match &cfg.file {
        Some(path) => Some(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open log file {}", path.display()))?,
        ),
        None => None,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    // A subscriber may already be installed (tests, embedding); keep the first one.
    let _ = match (cfg.format, file) {
        (LogFormat::Full, None) => builder.try_init(),
        (LogFormat::Compact, None) => builder.compact().try_init(),
        (LogFormat::Full, Some(f)) => builder.with_ansi(false).with_writer(Mutex::new(f)).try_init(),
        (LogFormat::Compact, Some(f)) => builder.compact().with_ansi(false).with_writer(Mutex::new(f)).try_init(),
    };
    INIT_ONCE.call_once(|| {});
    Ok(())
}

// -------- robust open/create with backoff --------

/// Return true for transient I/O errors seen on Windows when filter drivers
/// (AV/backup), USB/NAS volumes, or sharing violations get in the way.
fn is_retriable_io_error(e: &io::Error) -> bool {
    // 5 access denied, 21 device not ready, 32 sharing violation, 33 lock violation,
    // 225 AV blocked, 433 missing device, 1006 volume altered, 1117 device I/O,
    // 1224 user-mapped section open
    cfg!(windows)
        && matches!(
            e.raw_os_error(),
            Some(5 | 21 | 32 | 33 | 225 | 433 | 1006 | 1117 | 1224)
        )
}

fn with_backoff<T>(tries: usize, delay_ms: u64, mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    let tries = tries.max(1);
    let mut attempt = 0;
    loop {
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if attempt + 1 < tries && is_retriable_io_error(&e) => {
                attempt += 1;
                sleep(Duration::from_millis(delay_ms.saturating_mul(attempt as u64)));
            }
            Err(e) => return Err(e),
        }
    }
}

/// Open a file for reading, retrying transient errors.
pub fn open_with_backoff(path: &Path, tries: usize, delay_ms: u64) -> io::Result<File> {
    with_backoff(tries, delay_ms, || File::open(path))
}

/// Create (truncate) a file, retrying transient errors.
pub fn create_with_backoff(path: &Path, tries: usize, delay_ms: u64) -> io::Result<File> {
    with_backoff(tries, delay_ms, || File::create(path))
}
