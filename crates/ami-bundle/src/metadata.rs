//! Caller-supplied bundle metadata and the manifest entry point.

use std::fmt;
use std::io::Write as _;
use std::str::FromStr;

use rand::rngs::OsRng;
use rsa::RsaPrivateKey;
use tracing::info;

use crate::error::{BundleError, Result};
use crate::manifest::{Image, MachineConfiguration, Manifest, ManifestPart};
use crate::sink::{BundleFile, Sink};
use crate::writer::BundleWriter;

/// Key size used when the caller does not supply an RSA key, matching the
/// historical tooling. The generated key wraps one copy of the AES secrets
/// and signs the manifest, then is thrown away; supply your own key if you
/// ever want to decrypt the bundle yourself.
const GENERATED_USER_KEY_BITS: usize = 1024;

/// CPU architecture recorded in the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    X86_64,
    I386,
}

impl Architecture {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::I386 => "i386",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Architecture {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "x86_64" => Ok(Self::X86_64),
            "i386" => Ok(Self::I386),
            other => Err(format!(
                "unknown architecture {other:?} (expected \"x86_64\" or \"i386\")"
            )),
        }
    }
}

/// Identity of the application producing the bundle, recorded in the
/// manifest's `<bundler>` element.
#[derive(Debug, Clone)]
pub struct Application {
    /// e.g. "ec2-ami-tools"
    pub name: String,
    /// e.g. "1.5"
    pub version: String,
    /// e.g. "7"
    pub release: String,
    /// Optional; becomes an XML comment. Must not contain `--`.
    pub comment: Option<String>,
}

/// One entry of the manifest's block device mapping.
///
/// The schema defines these but the bundler never needs them; they exist for
/// callers that register images with ephemeral volumes attached.
#[derive(Debug, Clone)]
pub struct BlockDeviceMapping {
    pub virtual_name: String,
    pub device_name: String,
}

/// Everything the manifest needs beyond what the bundle writer measures.
pub struct BundleMetadata {
    /// Image name; also the tar entry name. Probably best kept to
    /// `[A-Za-z0-9._-]+`.
    pub name: String,
    pub architecture: Architecture,
    /// AWS account ID: just digits, no dashes.
    pub aws_account_id: String,
    /// The region the bundle will be registered in; selects the EC2
    /// public key that wraps the AES secrets.
    pub aws_region: String,
    /// Image type; `machine` if unset or empty.
    pub image_type: Option<String>,
    /// Optional RSA key, in case you'd like to decrypt the bundle later.
    /// A throwaway 1024-bit key is generated when absent.
    pub user_key: Option<RsaPrivateKey>,
    pub block_device_mappings: Vec<BlockDeviceMapping>,
    pub bundler: Application,
}

impl BundleMetadata {
    fn to_manifest<S: Sink>(&self, bundle: &BundleWriter<S>) -> Result<Manifest> {
        let digest = bundle.plaintext_sha1().ok_or(BundleError::NotClosed)?;

        let parts = bundle
            .parts()
            .into_iter()
            .map(|part| ManifestPart {
                filename: part.filename,
                digest: hex::encode(part.digest),
            })
            .collect();

        Ok(Manifest {
            bundler: self.bundler.clone(),
            machine_configuration: MachineConfiguration {
                architecture: self.architecture.as_str().to_string(),
                block_device_mappings: self.block_device_mappings.clone(),
            },
            image: Image {
                name: self.name.clone(),
                user: self.aws_account_id.clone(),
                image_type: self
                    .image_type
                    .clone()
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| "machine".to_string()),
                digest: hex::encode(digest),
                size: bundle.true_size(),
                bundled_size: bundle.bundled_size(),
                ec2_encrypted_key: String::new(),
                user_encrypted_key: String::new(),
                ec2_encrypted_iv: String::new(),
                user_encrypted_iv: String::new(),
                parts,
            },
        })
    }

    /// Build, sign, and write `<basename>.manifest.xml` for a closed bundle.
    ///
    /// The manifest binds the part digests, the image digest, and two
    /// RSA-wrapped copies of the bundle's AES secrets: one for the EC2
    /// region, one for the user key (generated on the fly if absent).
    pub fn write_manifest<B: Sink, S: Sink>(
        &self,
        bundle: &BundleWriter<B>,
        sink: &mut S,
    ) -> Result<()> {
        if !bundle.is_closed() {
            return Err(BundleError::NotClosed);
        }

        let mut manifest = self.to_manifest(bundle)?;

        let user_key = match &self.user_key {
            Some(key) => key.clone(),
            None => RsaPrivateKey::new(&mut OsRng, GENERATED_USER_KEY_BITS)?,
        };

        let (key, iv) = bundle.secrets();
        manifest.encrypt_secrets(key, iv, &self.aws_region, &user_key.to_public_key())?;

        let bytes = manifest.sign_and_serialize(&user_key)?;

        let filename = format!("{}.manifest.xml", bundle.basename());
        let mut file = sink.open(&filename)?;
        let written = file.write(&bytes)?;
        if written < bytes.len() {
            let _ = file.close();
            return Err(BundleError::ShortWrite {
                filename,
                written,
                expected: bytes.len(),
            });
        }
        file.close()?;

        info!(
            manifest = %filename,
            parts = manifest.image.parts.len(),
            bundled_size = manifest.image.bundled_size,
            "wrote bundle manifest"
        );
        Ok(())
    }
}
