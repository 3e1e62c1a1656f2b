//! Filesystem sink: one file per bundle artifact, inside a fixed directory.

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use tracing::info;

use ami_bundle::{BundleFile, Sink};

/// Writes bundle files into a directory.
#[derive(Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl Sink for DirectorySink {
    type File = DirectoryFile;

    fn open(&mut self, filename: &str) -> io::Result<Self::File> {
        // Bundle filenames are derived from the basename; anything path-like
        // indicates a misused basename rather than a legitimate file.
        if filename.contains(['/', '\\']) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("bundle filename {filename:?} contains a path separator"),
            ));
        }

        let path = self.dir.join(filename);
        info!(file = %path.display(), "writing bundle file");
        Ok(DirectoryFile {
            file: File::create(path)?,
        })
    }
}

pub struct DirectoryFile {
    file: File,
}

impl Write for DirectoryFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl BundleFile for DirectoryFile {
    fn close(mut self) -> io::Result<()> {
        self.file.flush()
    }
}
