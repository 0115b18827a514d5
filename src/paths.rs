use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extension given to every per-archive output file.
pub const OUTPUT_EXTENSION: &str = "jsonl";

/// One input archive. Immutable for the run.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchiveFile {
    pub path: PathBuf,
    /// Compressed size in bytes, for progress totals.
    pub size: u64,
}

impl ArchiveFile {
    /// Build from a path, reading its size when available (a missing file is size 0).
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        Self { path, size }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// `<output_dir>/<file stem>.jsonl`, e.g. `RC_2019-04.zst` → `RC_2019-04.jsonl`.
    pub fn output_path(&self, output_dir: &Path) -> PathBuf {
        let stem = self.path.file_stem().unwrap_or_else(|| OsStr::new("archive"));
        let mut name = stem.to_os_string();
        name.push(".");
        name.push(OUTPUT_EXTENSION);
        output_dir.join(name)
    }
}

/// List `*.{extension}` files directly under `dir` (non-recursive), sorted by name.
/// An unreadable or missing `dir` is an error; unreadable entries are skipped.
pub fn discover_archives(dir: &Path, extension: &str) -> io::Result<Vec<ArchiveFile>> {
    let meta = fs::metadata(dir)?;
    if !meta.is_dir() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "not a directory"));
    }
    let ext = extension.trim_start_matches('.');

    let mut out = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let ent = match entry {
            Ok(ent) => ent,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        let path = ent.path();
        if path.extension() != Some(OsStr::new(ext)) || !path.is_file() {
            continue;
        }
        out.push(ArchiveFile::from_path(path));
    }
    Ok(out)
}

pub fn total_compressed_size(files: &[ArchiveFile]) -> u64 {
    files.iter().map(|f| f.size).sum()
}
