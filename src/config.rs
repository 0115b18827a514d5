use crate::error::ConfigError;
use crate::filters::FilterConfig;
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Default configuration file looked up by the binary.
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

const DEFAULT_WINDOW: u64 = 1 << 31;
const DEFAULT_BATCH: usize = 1000;
const DEFAULT_IO_BUF: usize = 256 * 1024;
const MIN_IO_BUF: usize = 8 * 1024;
const MIN_WINDOW: u64 = 1 << 10;

// ----------------------------- File model ------------------------------------

/// On-disk configuration, as written in `config.toml`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub paths: PathsSection,
    #[serde(default)]
    pub filter: FilterSection,
    #[serde(default)]
    pub processing: ProcessingSection,
    #[serde(default)]
    pub zstd_max_window_size: Option<u64>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct PathsSection {
    pub data_directory: Option<PathBuf>,
    pub output_directory: Option<PathBuf>,
    pub archive_extension: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct FilterSection {
    #[serde(default)]
    pub target_subreddits: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProcessingSection {
    pub batch_size: Option<usize>,
    pub num_workers: Option<usize>,
    pub read_buffer_bytes: Option<usize>,
    pub write_buffer_bytes: Option<usize>,
    pub low_memory_threshold: Option<f64>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Full, file: None }
    }
}

impl FileConfig {
    /// Read and parse a TOML configuration file. A missing file is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::Read { path: path.to_path_buf(), source: e }
            }
        })?;
        Self::parse(&text).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Validate and freeze into the options the extractor runs with.
    pub fn to_options(&self) -> Result<RunOptions, ConfigError> {
        let data_dir = self.paths.data_directory.clone().ok_or(ConfigError::Missing("paths.data_directory"))?;
        let output_dir = self.paths.output_directory.clone().ok_or(ConfigError::Missing("paths.output_directory"))?;

        if self.filter.target_subreddits.is_empty() {
            return Err(ConfigError::Missing("filter.target_subreddits"));
        }
        if let Some(bad) = self.filter.target_subreddits.iter().find(|s| s.trim().is_empty()) {
            return Err(invalid("filter.target_subreddits", format!("empty label {bad:?}")));
        }

        let p = &self.processing;
        if p.batch_size == Some(0) {
            return Err(invalid("processing.batch_size", "must be at least 1".into()));
        }
        if p.num_workers == Some(0) {
            return Err(invalid("processing.num_workers", "must be at least 1".into()));
        }
        if let Some(t) = p.low_memory_threshold {
            if !(0.0..1.0).contains(&t) {
                return Err(invalid("processing.low_memory_threshold", format!("{t} is outside [0, 1)")));
            }
        }
        if let Some(w) = self.zstd_max_window_size {
            if w < MIN_WINDOW {
                return Err(invalid("zstd_max_window_size", format!("{w} is below the zstd minimum of {MIN_WINDOW} bytes")));
            }
        }
        if let Some(ext) = &self.paths.archive_extension {
            if ext.trim_start_matches('.').is_empty() {
                return Err(invalid("paths.archive_extension", "must not be empty".into()));
            }
        }

        let mut opts = RunOptions::new(data_dir, output_dir, &self.filter.target_subreddits);
        if let Some(ext) = &self.paths.archive_extension {
            opts = opts.with_archive_extension(ext);
        }
        if let Some(n) = p.batch_size {
            opts = opts.with_batch_size(n);
        }
        if let Some(n) = p.num_workers {
            opts = opts.with_num_workers(n);
        }
        if let Some(n) = p.read_buffer_bytes {
            opts = opts.with_read_buffer(n);
        }
        if let Some(n) = p.write_buffer_bytes {
            opts = opts.with_write_buffer(n);
        }
        if let Some(t) = p.low_memory_threshold {
            opts = opts.with_low_memory_threshold(t);
        }
        if let Some(w) = self.zstd_max_window_size {
            opts = opts.with_max_window_size(w);
        }
        Ok(opts)
    }
}

fn invalid(key: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { key, reason }
}

// ----------------------------- Run options ------------------------------------

/// Tunables every worker reads; immutable for the whole run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PipelineParams {
    pub batch_size: usize,
    pub max_window_size: u64,
    pub read_buffer_bytes: usize,  // decoded chunk size
    pub write_buffer_bytes: usize, // output BufWriter capacity
    pub low_memory_threshold: f64,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH,
            max_window_size: DEFAULT_WINDOW,
            read_buffer_bytes: DEFAULT_IO_BUF,
            write_buffer_bytes: DEFAULT_IO_BUF,
            low_memory_threshold: 0.10,
        }
    }
}

/// Validated options with builder chaining. Constructed once and passed explicitly.
#[derive(Clone, Debug)]
pub struct RunOptions {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub archive_extension: String, // without the leading dot
    pub filter: FilterConfig,
    pub num_workers: usize,
    pub params: PipelineParams,
}

impl RunOptions {
    pub fn new<I, S>(data_dir: impl AsRef<Path>, output_dir: impl AsRef<Path>, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            output_dir: output_dir.as_ref().to_path_buf(),
            archive_extension: "zst".to_string(),
            filter: FilterConfig::new(targets),
            num_workers: default_num_workers(),
            params: PipelineParams::default(),
        }
    }

    pub fn with_archive_extension(mut self, ext: impl AsRef<str>) -> Self {
        self.archive_extension = ext.as_ref().trim_start_matches('.').to_string();
        self
    }
    pub fn with_batch_size(mut self, n: usize) -> Self {
        self.params.batch_size = n.max(1);
        self
    }
    pub fn with_num_workers(mut self, n: usize) -> Self {
        self.num_workers = n.max(1);
        self
    }
    pub fn with_max_window_size(mut self, bytes: u64) -> Self {
        self.params.max_window_size = bytes.max(MIN_WINDOW);
        self
    }
    pub fn with_read_buffer(mut self, bytes: usize) -> Self {
        self.params.read_buffer_bytes = bytes.max(MIN_IO_BUF);
        self
    }
    pub fn with_write_buffer(mut self, bytes: usize) -> Self {
        self.params.write_buffer_bytes = bytes.max(MIN_IO_BUF);
        self
    }
    pub fn with_low_memory_threshold(mut self, frac: f64) -> Self {
        self.params.low_memory_threshold = frac.clamp(0.0, 1.0);
        self
    }
}

/// Half the available cores, at least one.
fn default_num_workers() -> usize {
    let hw = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(2);
    (hw / 2).max(1)
}
