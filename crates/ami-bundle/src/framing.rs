//! Tar framing for the image payload.
//!
//! A bundle wraps the raw disk image in a single-entry USTAR archive before
//! compression. The entry size has to be declared before any payload bytes
//! exist, which is why the bundle writer requires the image size up front.

use std::io::{self, Write};

const BLOCK: u64 = 512;
const ZEROS: [u8; 1024] = [0; 1024];

/// Emits one USTAR header, passes through exactly the declared number of
/// payload bytes, and appends the tar trailer on [`TarFramer::finish`].
///
/// The downstream writer is never closed; it is recovered with
/// [`TarFramer::into_inner`].
pub struct TarFramer<W> {
    inner: W,
    name: String,
    size: u64,
    mtime: u64,
    written: u64,
    started: bool,
    finished: bool,
}

impl<W: Write> TarFramer<W> {
    pub fn new(inner: W, name: &str, size: u64, mtime: u64) -> Self {
        Self {
            inner,
            name: name.to_string(),
            size,
            mtime,
            written: 0,
            started: false,
            finished: false,
        }
    }

    /// Override the header mtime. Only meaningful before the header has been
    /// emitted; later calls are ignored.
    pub fn set_mtime(&mut self, mtime: u64) {
        if !self.started {
            self.mtime = mtime;
        }
    }

    /// Write the USTAR header: a regular file owned by root:root, mode 0644,
    /// with the declared size.
    fn start(&mut self) -> io::Result<()> {
        let mut header = tar::Header::new_ustar();
        header.set_path(&self.name)?;
        header.set_mode(0o644);
        header.set_uid(0);
        header.set_gid(0);
        header.set_size(self.size);
        header.set_mtime(self.mtime);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_username("root")?;
        header.set_groupname("root")?;
        header.set_cksum();

        self.inner.write_all(header.as_bytes())?;
        self.started = true;
        Ok(())
    }

    /// Pad the payload to a 512-byte boundary and emit the two zero blocks
    /// that terminate a tar archive.
    ///
    /// The trailer is written even if fewer payload bytes arrived than were
    /// declared; the size check belongs to the bundle writer, which reports
    /// the mismatch as such rather than as a framing error.
    pub fn finish(&mut self) -> io::Result<()> {
        if self.finished {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "tar framer is already finished",
            ));
        }
        if !self.started {
            self.start()?;
        }
        self.finished = true;

        let partial = (self.written % BLOCK) as usize;
        let padding = if partial == 0 { 0 } else { BLOCK as usize - partial };
        self.inner.write_all(&ZEROS[..padding])?;
        self.inner.write_all(&ZEROS)?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for TarFramer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.finished {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "tar framer is already finished",
            ));
        }
        if !self.started {
            self.start()?;
        }
        if self.written + buf.len() as u64 > self.size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "payload exceeds the declared entry size",
            ));
        }

        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(payload: &[u8]) -> Vec<u8> {
        let mut framer = TarFramer::new(Vec::new(), "disk.img", payload.len() as u64, 1_234_567);
        framer.write_all(payload).unwrap();
        framer.finish().unwrap();
        framer.into_inner()
    }

    #[test]
    fn produces_a_readable_single_entry_archive() {
        let payload = vec![0x5A; 666];
        let bytes = frame(&payload);

        // header + payload padded to 512 + two trailer blocks
        assert_eq!(bytes.len(), 512 + 1024 + 1024);

        let mut archive = tar::Archive::new(bytes.as_slice());
        let mut entries = archive.entries().unwrap();
        let mut entry = entries.next().unwrap().unwrap();

        let header = entry.header();
        assert_eq!(entry.path().unwrap().to_str().unwrap(), "disk.img");
        assert_eq!(header.size().unwrap(), 666);
        assert_eq!(header.mode().unwrap(), 0o644);
        assert_eq!(header.uid().unwrap(), 0);
        assert_eq!(header.gid().unwrap(), 0);
        assert_eq!(header.username().unwrap(), Some("root"));
        assert_eq!(header.groupname().unwrap(), Some("root"));
        assert_eq!(header.mtime().unwrap(), 1_234_567);
        assert_eq!(header.entry_type(), tar::EntryType::Regular);

        let mut contents = Vec::new();
        io::Read::read_to_end(&mut entry, &mut contents).unwrap();
        assert_eq!(contents, payload);

        assert!(entries.next().is_none());
    }

    #[test]
    fn empty_payload_is_header_plus_trailer() {
        let bytes = frame(b"");
        assert_eq!(bytes.len(), 512 + 1024);
        assert!(bytes[512..].iter().all(|&b| b == 0));
    }

    #[test]
    fn finish_emits_header_even_without_writes() {
        let mut framer = TarFramer::new(Vec::new(), "img", 0, 0);
        framer.finish().unwrap();
        let bytes = framer.into_inner();
        assert_eq!(&bytes[257..262], b"ustar");
    }

    #[test]
    fn rejects_payload_beyond_declared_size() {
        let mut framer = TarFramer::new(Vec::new(), "img", 4, 0);
        framer.write_all(b"1234").unwrap();
        assert!(framer.write(b"5").is_err());
    }
}
