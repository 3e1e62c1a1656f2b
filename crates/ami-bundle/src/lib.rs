//! Streaming EC2 instance-store AMI bundler.
//!
//! Produces the part files and signed XML manifest that `RegisterImage`
//! expects for instance-store AMIs, in the exact format of Amazon's
//! `ec2-bundle-image`: the image is framed in a single-entry tar archive,
//! gzip-compressed, AES-128-CBC encrypted, and split into 10 MiB parts, and
//! the manifest binds SHA-1 digests of the image and every part to
//! RSA-wrapped copies of the AES secrets.
//!
//! The whole thing is a single-pass push pipeline: feed bytes to a
//! [`BundleWriter`], close it, then ask [`BundleMetadata::write_manifest`]
//! for the manifest. Output goes wherever the caller's [`Sink`] puts it;
//! this crate never touches the filesystem or the network.
//!
//! ```no_run
//! use ami_bundle::{Application, Architecture, BundleMetadata, BundleWriter, MemorySink};
//!
//! # fn main() -> Result<(), ami_bundle::BundleError> {
//! let image = [0u8; 4096];
//! let mut sink = MemorySink::new();
//!
//! let mut bundle = BundleWriter::new("disk", image.len() as u64, sink.clone())?;
//! bundle.write(&image)?;
//! bundle.close()?;
//!
//! let metadata = BundleMetadata {
//!     name: "disk".into(),
//!     architecture: Architecture::X86_64,
//!     aws_account_id: "123456789012".into(),
//!     aws_region: "us-east-1".into(),
//!     image_type: None,
//!     user_key: None,
//!     block_device_mappings: Vec::new(),
//!     bundler: Application {
//!         name: "ami-bundle".into(),
//!         version: env!("CARGO_PKG_VERSION").into(),
//!         release: "1".into(),
//!         comment: None,
//!     },
//! };
//! metadata.write_manifest(&bundle, &mut sink)?;
//! # Ok(())
//! # }
//! ```

pub mod certs;
pub mod chunk;
pub mod cipher;
pub mod count;
pub mod error;
pub mod framing;
pub mod hashing;
pub mod manifest;
pub mod metadata;
pub mod sink;
pub mod writer;

mod xml;

// Convenience re-exports
pub use certs::{certificate_for_region, public_key_for_region};
pub use chunk::CHUNK_SIZE;
pub use error::BundleError;
pub use hashing::PartDigest;
pub use manifest::MANIFEST_VERSION;
pub use metadata::{Application, Architecture, BlockDeviceMapping, BundleMetadata};
pub use sink::{BundleFile, MemorySink, Sink};
pub use writer::BundleWriter;
