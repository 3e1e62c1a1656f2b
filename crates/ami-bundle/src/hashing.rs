//! SHA-1 digest collection for bundle part files.
//!
//! The manifest needs a digest for every part, in the order the parts were
//! produced. Rather than re-reading the parts (which the sink may not even
//! support), every file opened through [`HashingSink`] is teed through a
//! running SHA-1 and the digest is recorded when the file closes.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use sha1::{Digest, Sha1};

use crate::sink::{BundleFile, Sink};

/// Filename and SHA-1 digest of one finished bundle file, recorded in close
/// order. The manifest part index is the position in the recorded list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartDigest {
    pub filename: String,
    pub digest: [u8; 20],
}

/// Shared, ordered list of finished-file digests.
///
/// Closes append under a lock; the bundle writer keeps a handle so the list
/// survives the pipeline teardown at close time.
pub type PartDigests = Arc<Mutex<Vec<PartDigest>>>;

/// A [`Sink`] adapter that hashes every byte written to each file.
pub struct HashingSink<S> {
    inner: S,
    files: PartDigests,
}

impl<S: Sink> HashingSink<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            files: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A handle to the digest list, valid for the life of the bundling.
    pub fn digests(&self) -> PartDigests {
        Arc::clone(&self.files)
    }
}

impl<S: Sink> Sink for HashingSink<S> {
    type File = HashingFile<S::File>;

    fn open(&mut self, filename: &str) -> io::Result<Self::File> {
        let inner = self.inner.open(filename)?;
        Ok(HashingFile {
            filename: filename.to_string(),
            hasher: Sha1::new(),
            inner,
            files: Arc::clone(&self.files),
        })
    }
}

/// A bundle file wrapped with a running SHA-1.
pub struct HashingFile<F> {
    filename: String,
    hasher: Sha1,
    inner: F,
    files: PartDigests,
}

impl<F: Write> Write for HashingFile<F> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // Hash only what the underlying file actually accepted, so the
        // recorded digest always matches the file's bytes.
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<F: BundleFile> BundleFile for HashingFile<F> {
    fn close(self) -> io::Result<()> {
        let record = PartDigest {
            filename: self.filename,
            digest: self.hasher.finalize().into(),
        };
        self.files.lock().unwrap().push(record);
        self.inner.close()
    }
}
