use crate::record::Record;
use crate::util::create_with_backoff;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Buffers matched records and appends them to one archive's output file as NDJSON.
///
/// The file is created (truncated) on construction and owned exclusively by this writer.
/// A full batch is written as soon as it fills; `finish` writes the remainder. Dropping a
/// writer that still holds records makes a best-effort flush, so matched records are not
/// lost on early exits. Only `discard` drops them on purpose.
pub struct BatchWriter {
    path: PathBuf,
    out: Option<BufWriter<File>>,
    batch: Vec<Record>,
    batch_size: usize,
    written: u64,
}

impl BatchWriter {
    pub fn create(path: &Path, batch_size: usize, write_buf_bytes: usize) -> io::Result<Self> {
        let f = create_with_backoff(path, 16, 50)?;
        let batch_size = batch_size.max(1);
        Ok(Self {
            path: path.to_path_buf(),
            out: Some(BufWriter::with_capacity(write_buf_bytes.max(8 * 1024), f)),
            // Do not trust huge batch sizes for the initial allocation.
            batch: Vec::with_capacity(batch_size.min(4096)),
            batch_size,
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records waiting in the current batch.
    pub fn pending(&self) -> usize {
        self.batch.len()
    }

    /// Records already handed to the output file.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn append(&mut self, record: Record) -> io::Result<()> {
        self.batch.push(record);
        if self.batch.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Write the pending batch, in order, and push it to the OS.
    pub fn flush(&mut self) -> io::Result<()> {
        let Some(w) = self.out.as_mut() else {
            return Err(io::Error::new(io::ErrorKind::Other, "batch writer already closed"));
        };
        if self.batch.is_empty() {
            return Ok(());
        }
        for rec in &self.batch {
            w.write_all(rec.as_line().as_bytes())?;
            w.write_all(b"\n")?;
        }
        w.flush()?;
        self.written += self.batch.len() as u64;
        self.batch.clear();
        Ok(())
    }

    /// Drop the pending batch without writing it. Returns how many records were dropped.
    pub fn discard(&mut self) -> usize {
        let n = self.batch.len();
        self.batch.clear();
        n
    }

    /// Flush the remainder and close the file. Returns total records written.
    pub fn finish(mut self) -> io::Result<u64> {
        self.flush()?;
        if let Some(w) = self.out.take() {
            let f = w.into_inner().map_err(|e| e.into_error())?;
            f.sync_data()?;
        }
        Ok(self.written)
    }
}

impl Drop for BatchWriter {
    fn drop(&mut self) {
        if self.out.is_some() && !self.batch.is_empty() {
            if let Err(e) = self.flush() {
                tracing::warn!(path = %self.path.display(), error = %e, "dropping unwritten batch");
            }
        }
    }
}
