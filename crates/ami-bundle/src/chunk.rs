//! Splitting the ciphertext stream into fixed-size part files.

use std::cmp;
use std::io::{self, Write};

use tracing::debug;

use crate::sink::{BundleFile, Sink};

/// Part size used for AMI bundles. Every part except possibly the last is
/// exactly this long.
pub const CHUNK_SIZE: u64 = 10 * 1024 * 1024;

/// An [`io::Write`] that splits its input across consecutive files named
/// `<name>.part.<i>`, each at most `chunk_size` bytes.
///
/// Parts are opened lazily on the first byte destined for them, so an empty
/// stream produces no files at all. A write larger than the space left in the
/// current part is split internally; the caller sees one full-length write.
pub struct ChunkWriter<S: Sink> {
    sink: S,
    name: String,
    chunk_size: u64,
    current: Option<Current<S::File>>,
    next_index: u32,
}

struct Current<F> {
    file: F,
    filename: String,
    written: u64,
}

impl<S: Sink> ChunkWriter<S> {
    pub fn new(sink: S, name: &str, chunk_size: u64) -> Self {
        assert!(chunk_size > 0, "chunk size must be positive");
        Self {
            sink,
            name: name.to_string(),
            chunk_size,
            current: None,
            next_index: 0,
        }
    }

    /// Close the part file currently being written, if any.
    ///
    /// Further writes would start a fresh part, so this is only called once,
    /// when the ciphertext stream ends.
    pub fn close(&mut self) -> io::Result<()> {
        if let Some(current) = self.current.take() {
            debug!(part = %current.filename, bytes = current.written, "closing part");
            current.file.close()?;
        }
        Ok(())
    }

    pub fn into_inner(self) -> S {
        self.sink
    }

    fn rotate(&mut self) -> io::Result<()> {
        if let Some(current) = self.current.take() {
            debug!(part = %current.filename, bytes = current.written, "closing part");
            current.file.close()?;
        }

        let filename = format!("{}.part.{}", self.name, self.next_index);
        self.next_index += 1;
        debug!(part = %filename, "opening part");
        let file = self.sink.open(&filename)?;
        self.current = Some(Current {
            file,
            filename,
            written: 0,
        });
        Ok(())
    }
}

impl<S: Sink> Write for ChunkWriter<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut written = 0;
        while written < buf.len() {
            let needs_rotate = match &self.current {
                None => true,
                Some(current) => current.written == self.chunk_size,
            };
            if needs_rotate {
                self.rotate()?;
            }

            let current = self.current.as_mut().expect("rotate leaves an open part");
            let room = (self.chunk_size - current.written) as usize;
            let take = cmp::min(room, buf.len() - written);

            let n = current.file.write(&buf[written..written + take])?;
            if n == 0 {
                return Err(io::ErrorKind::WriteZero.into());
            }
            current.written += n as u64;
            written += n;
        }
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.current {
            Some(current) => current.file.flush(),
            None => Ok(()),
        }
    }
}
