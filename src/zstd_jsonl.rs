use crate::error::{ArchiveError, StreamPosition};
use crate::mem::maybe_throttle_low_memory;
use crate::util::open_with_backoff;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use zstd::stream::read::Decoder;

const MIN_WINDOW_LOG: u32 = 10;
const MAX_WINDOW_LOG: u32 = 31;

/// Largest `window_log_max` whose window fits in `max_window_size` bytes.
pub fn window_log_for(max_window_size: u64) -> u32 {
    let floor_log2 = 63 - max_window_size.max(1).leading_zeros();
    floor_log2.clamp(MIN_WINDOW_LOG, MAX_WINDOW_LOG)
}

/// A `Read` wrapper that counts compressed bytes read.
struct CountingReader<R: Read> {
    inner: R,
    counter: Arc<AtomicU64>,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.counter.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

/// One bounded slice of decompressed output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedChunk {
    /// Decoded offset of the first byte.
    pub offset: u64,
    pub bytes: Vec<u8>,
}

/// Lazily decodes one `.zst` archive into chunks of at most `chunk_size` bytes.
///
/// The zstd decoder refuses frames whose window exceeds `max_window_size`, so decode
/// memory is bounded no matter how large the archive expands. The archive's file handle
/// lives inside the decoder and is released when this value is dropped.
///
/// A corrupt, truncated or oversized-window stream yields one `ArchiveError::Decompression`
/// and then ends.
pub struct StreamingDecompressor {
    path: PathBuf,
    decoder: Decoder<'static, BufReader<CountingReader<File>>>,
    compressed: Arc<AtomicU64>,
    chunk_size: usize,
    decoded: u64,
    low_memory_threshold: f64,
    deferred_err: Option<io::Error>,
    done: bool,
}

impl StreamingDecompressor {
    pub fn open(path: &Path, max_window_size: u64, chunk_size: usize) -> Result<Self, ArchiveError> {
        let file = open_with_backoff(path, 16, 50)
            .map_err(|source| ArchiveError::Open { path: path.to_path_buf(), source })?;
        Self::from_file(path, file, max_window_size, chunk_size)
    }

    fn from_file(path: &Path, file: File, max_window_size: u64, chunk_size: usize) -> Result<Self, ArchiveError> {
        let counter = Arc::new(AtomicU64::new(0));
        let cnt = CountingReader { inner: file, counter: counter.clone() };
        let decompression = |source| ArchiveError::Decompression { position: StreamPosition::default(), source };

        let mut decoder = Decoder::new(cnt).map_err(decompression)?;
        decoder.window_log_max(window_log_for(max_window_size)).map_err(decompression)?;

        Ok(Self {
            path: path.to_path_buf(),
            decoder,
            compressed: counter,
            chunk_size: chunk_size.max(1),
            decoded: 0,
            low_memory_threshold: 0.0,
            deferred_err: None,
            done: false,
        })
    }

    /// Back off between chunks while available memory is under `frac` (0 disables).
    pub fn with_low_memory_threshold(mut self, frac: f64) -> Self {
        self.low_memory_threshold = frac;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Compressed bytes pulled from the file so far.
    pub fn compressed_bytes(&self) -> u64 {
        self.compressed.load(Ordering::Relaxed)
    }

    /// Decompressed bytes handed out so far.
    pub fn decoded_bytes(&self) -> u64 {
        self.decoded
    }

    pub fn stream_position(&self) -> StreamPosition {
        StreamPosition { line: 0, decoded_bytes: self.decoded, compressed_bytes: self.compressed_bytes() }
    }

    /// Fill `buf` up to its length; returns how many bytes were read (short only at EOF).
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(e) = self.deferred_err.take() {
            return Err(e);
        }
        let mut filled = 0;
        while filled < buf.len() {
            match self.decoder.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                // Hand out what decoded cleanly before the error first.
                Err(e) if filled > 0 => {
                    self.deferred_err = Some(e);
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

impl Iterator for StreamingDecompressor {
    type Item = Result<DecodedChunk, ArchiveError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut bytes = vec![0u8; self.chunk_size];
        match self.fill(&mut bytes) {
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(n) => {
                bytes.truncate(n);
                let chunk = DecodedChunk { offset: self.decoded, bytes };
                self.decoded += n as u64;
                maybe_throttle_low_memory(self.low_memory_threshold);
                Some(Ok(chunk))
            }
            Err(source) => {
                self.done = true;
                tracing::debug!(path = %self.path.display(), error = %source, "zstd decode error");
                Some(Err(ArchiveError::Decompression { position: self.stream_position(), source }))
            }
        }
    }
}
