//! The streaming bundle writer.
//!
//! Bundling an image requires a processing chain on the image stream:
//!
//! 1. frame the image in a single-entry tar archive,
//! 2. gzip the tarred image,
//! 3. encrypt the gzipped stream with AES-128-CBC,
//! 4. split the ciphertext into 10 MiB part files.
//!
//! Additionally the chain keeps a SHA-1 of the image bytes, a SHA-1 of every
//! part file, and counters for bytes in and bytes out, which is everything
//! the manifest needs. In contrast to Amazon's `ec2-bundle-image` there are no
//! temporary files: the image is read once and never re-read.
//!
//! The bundle format requires the image size up front (it goes in the tar
//! header, which is written before the payload), so the size is a
//! constructor argument and is enforced at [`BundleWriter::close`].

use flate2::write::GzEncoder;
use flate2::Compression;
use rand::rngs::OsRng;
use rand::RngCore;
use sha1::{Digest, Sha1};

use crate::chunk::{ChunkWriter, CHUNK_SIZE};
use crate::cipher::AesCbcWriter;
use crate::count::CountingWriter;
use crate::error::{BundleError, Result};
use crate::framing::TarFramer;
use crate::hashing::{HashingSink, PartDigest, PartDigests};
use crate::sink::Sink;

type Pipeline<S> =
    TarFramer<GzEncoder<AesCbcWriter<CountingWriter<ChunkWriter<HashingSink<S>>>>>>;

/// Writes an image stream as an EC2 instance-store bundle.
///
/// The resulting files are named after the basename, e.g. `basename.part.0`,
/// and handed to the [`Sink`] supplied at construction. Once `close` has
/// succeeded the part files are fully written and the writer no longer
/// touches the sink. A bundle also needs a manifest to be useful; see
/// [`crate::metadata::BundleMetadata::write_manifest`].
pub struct BundleWriter<S: Sink> {
    basename: String,
    declared_size: u64,

    key: [u8; 16],
    iv: [u8; 16],

    digest: Sha1,
    true_size: u64,

    pipeline: Option<Pipeline<S>>,
    parts: PartDigests,

    // frozen at close
    bundled_size: u64,
    plaintext_sha1: Option<[u8; 20]>,
    closed: bool,
}

impl<S: Sink> BundleWriter<S> {
    /// Create a bundle writer for an image of exactly `size` bytes.
    ///
    /// Generates a fresh AES key and IV from the system RNG. The key pair is
    /// used for this one bundle and leaves the writer only inside the
    /// RSA-wrapped manifest fields.
    pub fn new(basename: &str, size: u64, sink: S) -> Result<Self> {
        let mut key = [0u8; 16];
        let mut iv = [0u8; 16];
        OsRng
            .try_fill_bytes(&mut key)
            .and_then(|()| OsRng.try_fill_bytes(&mut iv))
            .map_err(|e| BundleError::Rng(e.to_string()))?;

        // Build the chain bottom-up: the hashing sink digests each part file,
        // the chunker splits the ciphertext, a counter records the bundled
        // size, AES encrypts, gzip compresses, and the tar framer sits on
        // top. The plaintext digest and size counter live outside the chain,
        // between the caller and the framer.
        let hashing = HashingSink::new(sink);
        let parts = hashing.digests();
        let chunker = ChunkWriter::new(hashing, basename, CHUNK_SIZE);
        let counted = CountingWriter::new(chunker);
        let aes = AesCbcWriter::new(counted, &key, &iv);
        let gz = GzEncoder::new(aes, Compression::best());
        let mtime = chrono::Utc::now().timestamp().max(0) as u64;
        let framer = TarFramer::new(gz, basename, size, mtime);

        Ok(Self {
            basename: basename.to_string(),
            declared_size: size,
            key,
            iv,
            digest: Sha1::new(),
            true_size: 0,
            pipeline: Some(framer),
            parts,
            bundled_size: 0,
            plaintext_sha1: None,
            closed: false,
        })
    }

    /// Use a fixed tar mtime instead of the current wall-clock time.
    ///
    /// The legacy format stamps the tar entry with the bundling time; callers
    /// that want reproducible bundles can pin it here before the first write.
    pub fn with_mtime(mut self, epoch_secs: u64) -> Self {
        if let Some(pipeline) = self.pipeline.as_mut() {
            pipeline.set_mtime(epoch_secs);
        }
        self
    }

    /// Append image bytes to the bundle. Returns the number of bytes
    /// accepted, which is always `buf.len()` on success.
    ///
    /// The first write emits the tar header.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let Some(pipeline) = self.pipeline.as_mut() else {
            return Err(BundleError::AlreadyClosed);
        };
        std::io::Write::write_all(pipeline, buf)?;
        self.digest.update(buf);
        self.true_size += buf.len() as u64;
        Ok(buf.len())
    }

    /// Close the bundle. Closing more than once is an error.
    ///
    /// Close flushes every stage in order (tar trailer, gzip trailer, AES
    /// padding, final part file), attempting each even if an earlier one
    /// failed, and returns the first error. It then checks that the bytes
    /// written match the size declared in the tar header.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(BundleError::AlreadyClosed);
        }
        self.closed = true;

        let mut first_err: Option<BundleError> = None;
        let mut record = |e: BundleError| {
            if first_err.is_none() {
                first_err = Some(e);
            }
        };

        let mut framer = self.pipeline.take().expect("pipeline present until close");

        // Tar trailer. For an image nobody wrote to, this also emits the
        // header, so an empty bundling still produces a well-formed archive.
        if let Err(e) = framer.finish() {
            record(e.into());
        }

        // Gzip trailer. `finish` hands back the AES stage without closing it.
        let mut gz = framer.into_inner();
        if let Err(e) = gz.try_finish() {
            record(e.into());
        }
        match gz.finish() {
            Ok(mut aes) => {
                // AES padding block.
                if let Err(e) = aes.finish() {
                    record(e.into());
                }
                let counted = aes.into_inner();
                self.bundled_size = counted.count();

                // Final part file.
                let mut chunker = counted.into_inner();
                if let Err(e) = chunker.close() {
                    record(e.into());
                }
            }
            // The encoder could not be flushed at all; the stages below it
            // are unrecoverable, which only loses cleanup on a bundle that
            // is already broken.
            Err(e) => record(e.into()),
        }

        self.plaintext_sha1 = Some(self.digest.finalize_reset().into());

        if self.true_size != self.declared_size {
            record(BundleError::SizeMismatch {
                expected: self.declared_size,
                actual: self.true_size,
            });
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn basename(&self) -> &str {
        &self.basename
    }

    /// Bytes of image data written so far (equals the image size once the
    /// writer closed successfully).
    pub fn true_size(&self) -> u64 {
        self.true_size
    }

    /// Total ciphertext bytes across all part files. Zero until close.
    pub fn bundled_size(&self) -> u64 {
        self.bundled_size
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Digests of the finished part files, in part order.
    pub fn parts(&self) -> Vec<PartDigest> {
        self.parts.lock().unwrap().clone()
    }

    pub(crate) fn secrets(&self) -> (&[u8; 16], &[u8; 16]) {
        (&self.key, &self.iv)
    }

    pub(crate) fn plaintext_sha1(&self) -> Option<&[u8; 20]> {
        self.plaintext_sha1.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;

    #[test]
    fn write_after_close_is_rejected() {
        let mut writer = BundleWriter::new("img", 0, MemorySink::new()).unwrap();
        writer.close().unwrap();
        assert!(matches!(
            writer.write(b"x"),
            Err(BundleError::AlreadyClosed)
        ));
    }

    #[test]
    fn double_close_is_rejected() {
        let mut writer = BundleWriter::new("img", 0, MemorySink::new()).unwrap();
        writer.close().unwrap();
        assert!(matches!(writer.close(), Err(BundleError::AlreadyClosed)));
    }

    #[test]
    fn size_mismatch_is_fatal() {
        let mut writer = BundleWriter::new("img", 1024, MemorySink::new()).unwrap();
        writer.write(&[0u8; 512]).unwrap();
        let err = writer.close().unwrap_err();
        assert!(matches!(
            err,
            BundleError::SizeMismatch {
                expected: 1024,
                actual: 512,
            }
        ));
        assert!(err.is_protocol());
    }

    #[test]
    fn empty_image_still_produces_one_part() {
        let sink = MemorySink::new();
        let mut writer = BundleWriter::new("img", 0, sink.clone()).unwrap();
        writer.close().unwrap();

        // Even with no payload the tar header and trailer are framed,
        // compressed, and padded: a single short part.
        assert_eq!(sink.filenames(), vec!["img.part.0"]);
        let part = sink.file("img.part.0").unwrap();
        assert!(!part.is_empty());
        assert_eq!(part.len() % 16, 0);
        assert_eq!(part.len() as u64, writer.bundled_size());
        assert_eq!(writer.true_size(), 0);

        let parts = writer.parts();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].filename, "img.part.0");
    }

    #[test]
    fn bundled_size_is_a_multiple_of_the_block_size() {
        for len in [0usize, 1, 16, 100, 4096] {
            let sink = MemorySink::new();
            let mut writer = BundleWriter::new("img", len as u64, sink.clone()).unwrap();
            writer.write(&vec![0xA5; len]).unwrap();
            writer.close().unwrap();

            assert!(writer.bundled_size() > 0);
            assert_eq!(writer.bundled_size() % 16, 0, "image length {len}");

            let total: usize = sink
                .filenames()
                .iter()
                .map(|f| sink.file(f).unwrap().len())
                .sum();
            assert_eq!(total as u64, writer.bundled_size());
        }
    }

    #[test]
    fn plaintext_digest_covers_exactly_the_image_bytes() {
        let sink = MemorySink::new();
        let mut writer = BundleWriter::new("img", 3, sink).unwrap();
        writer.write(b"abc").unwrap();
        writer.close().unwrap();

        assert_eq!(
            hex::encode(writer.plaintext_sha1().unwrap()),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }
}
