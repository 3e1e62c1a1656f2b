//! Output abstraction for bundle files.
//!
//! The bundler never touches the filesystem or the network itself. Everything
//! it produces (part files and the manifest) is handed to a caller-supplied
//! [`Sink`], one named file at a time. Files are opened in strict sequential
//! order and each is closed before the next is opened, so implementations may
//! keep at most one file in flight.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// A single bundle file being written.
///
/// `close` finalizes the file; no further writes happen afterwards. Dropping
/// a `BundleFile` without closing it abandons the file; the bundler only
/// does that on an error path, where partial output is the sink's concern.
pub trait BundleFile: Write {
    fn close(self) -> io::Result<()>;
}

/// A destination for bundle files.
///
/// Opening the same filename twice within one bundling is a programming
/// error; implementations are free to reject it.
pub trait Sink {
    type File: BundleFile;

    fn open(&mut self, filename: &str) -> io::Result<Self::File>;
}

/// A [`Sink`] that accumulates finished files in memory.
///
/// Clones share the same underlying map, so a caller can hand one clone to
/// the bundle writer and keep another to read the results back. Useful for
/// tests and for buffer-then-upload arrangements.
#[derive(Clone, Default)]
pub struct MemorySink {
    shared: Arc<Mutex<MemorySinkState>>,
}

#[derive(Default, Debug)]
struct MemorySinkState {
    files: BTreeMap<String, Vec<u8>>,
    opened: std::collections::HashSet<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The contents of a finished file, if it exists.
    pub fn file(&self, filename: &str) -> Option<Vec<u8>> {
        self.shared.lock().unwrap().files.get(filename).cloned()
    }

    /// Names of all finished files, in lexical order.
    pub fn filenames(&self) -> Vec<String> {
        self.shared.lock().unwrap().files.keys().cloned().collect()
    }

    /// Number of finished files.
    pub fn len(&self) -> usize {
        self.shared.lock().unwrap().files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Sink for MemorySink {
    type File = MemoryFile;

    fn open(&mut self, filename: &str) -> io::Result<Self::File> {
        let mut state = self.shared.lock().unwrap();
        if !state.opened.insert(filename.to_string()) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("duplicate bundle file {filename:?}"),
            ));
        }
        Ok(MemoryFile {
            filename: filename.to_string(),
            buf: Vec::new(),
            shared: Arc::clone(&self.shared),
        })
    }
}

/// An in-flight [`MemorySink`] file. Contents become visible on close.
#[derive(Debug)]
pub struct MemoryFile {
    filename: String,
    buf: Vec<u8>,
    shared: Arc<Mutex<MemorySinkState>>,
}

impl Write for MemoryFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl BundleFile for MemoryFile {
    fn close(self) -> io::Result<()> {
        let mut state = self.shared.lock().unwrap();
        state.files.insert(self.filename, self.buf);
        Ok(())
    }
}
