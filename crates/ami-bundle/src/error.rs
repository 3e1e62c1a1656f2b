//! Error types for bundle creation.

use thiserror::Error;

/// Result type for bundling operations.
pub type Result<T> = std::result::Result<T, BundleError>;

/// Errors that can occur while producing a bundle or its manifest.
///
/// Sink failures, protocol misuse, and crypto failures are distinct variants
/// so callers can tell an I/O problem apart from a bug in their own sequencing
/// or from an RSA failure.
#[derive(Debug, Error)]
pub enum BundleError {
    /// An error surfaced by the caller-supplied sink (or by a pipeline stage
    /// writing into it). Propagated verbatim; partial files may remain.
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The system RNG refused to produce the bundle secrets.
    #[error("unable to gather randomness for bundle secrets: {0}")]
    Rng(String),

    /// Write or close was called on a writer that is already closed.
    #[error("bundle writer is already closed")]
    AlreadyClosed,

    /// Manifest generation was requested before the bundle writer was closed.
    #[error("bundle writer must be closed before a manifest can be generated")]
    NotClosed,

    /// The number of bytes written did not match the size declared up front.
    /// The tar header already promised `expected` bytes, so the bundle is
    /// unusable.
    #[error("declared image size was {expected} bytes, but {actual} bytes were written")]
    SizeMismatch { expected: u64, actual: u64 },

    /// RSA encryption, signing, or key generation failed.
    #[error("RSA operation failed: {0}")]
    Crypto(#[from] rsa::Error),

    /// The embedded EC2 certificate for a region could not be used.
    #[error("no usable EC2 certificate for region {region:?}: {reason}")]
    Region { region: String, reason: String },

    /// A sink accepted fewer bytes than were handed to it in a single write.
    #[error("short write to {filename}: {written} of {expected} bytes")]
    ShortWrite {
        filename: String,
        written: usize,
        expected: usize,
    },

    /// Caller-supplied metadata cannot be represented in the manifest.
    #[error("invalid bundle metadata: {0}")]
    Metadata(String),
}

impl BundleError {
    /// Returns true if this error indicates protocol misuse by the caller
    /// rather than an environmental failure.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Self::AlreadyClosed | Self::NotClosed | Self::SizeMismatch { .. }
        )
    }
}
