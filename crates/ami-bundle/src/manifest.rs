//! Manifest assembly: XML layout, secret wrapping, and signing.
//!
//! The manifest format is fussy in two ways that matter here:
//!
//! - The RSA signature covers the serialized `<machine_configuration>` and
//!   `<image>` elements, and those exact bytes must appear inside
//!   `<manifest>`. The signed fragment is therefore serialized once and
//!   spliced into the outer document verbatim.
//! - The AES key and IV are not RSA-encrypted as raw bytes. They are first
//!   encoded as 32 lowercase hex characters and the ASCII is encrypted,
//!   a compatibility requirement inherited from `ec2-bundle-image` rather
//!   than a cryptographic choice.

use rand::rngs::OsRng;
use rsa::{Pkcs1v15Encrypt, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha1::{Digest, Sha1};

use crate::certs;
use crate::error::{BundleError, Result};
use crate::metadata::{Application, BlockDeviceMapping};
use crate::xml::XmlWriter;

/// The manifest schema version. Unchanged since 2007; EC2 still expects it.
pub const MANIFEST_VERSION: &str = "2007-10-10";

pub(crate) struct Manifest {
    pub bundler: Application,
    pub machine_configuration: MachineConfiguration,
    pub image: Image,
}

pub(crate) struct MachineConfiguration {
    pub architecture: String,
    pub block_device_mappings: Vec<BlockDeviceMapping>,
}

pub(crate) struct Image {
    pub name: String,
    pub user: String,
    pub image_type: String,
    pub digest: String,
    pub size: u64,
    pub bundled_size: u64,
    pub ec2_encrypted_key: String,
    pub user_encrypted_key: String,
    pub ec2_encrypted_iv: String,
    pub user_encrypted_iv: String,
    pub parts: Vec<ManifestPart>,
}

pub(crate) struct ManifestPart {
    pub filename: String,
    pub digest: String,
}

impl Manifest {
    /// Wrap the AES secrets for both parties: the EC2 key for the target
    /// region, and the caller's own key so the bundle stays decryptable.
    pub fn encrypt_secrets(
        &mut self,
        key: &[u8; 16],
        iv: &[u8; 16],
        region: &str,
        user_key: &RsaPublicKey,
    ) -> Result<()> {
        let ec2_key = certs::public_key_for_region(region)?;

        // The hex ASCII is what gets encrypted, not the raw bytes.
        let encoded_key = hex::encode(key);
        let encoded_iv = hex::encode(iv);

        let mut rng = OsRng;
        self.image.ec2_encrypted_key = hex::encode(ec2_key.encrypt(
            &mut rng,
            Pkcs1v15Encrypt,
            encoded_key.as_bytes(),
        )?);
        self.image.user_encrypted_key = hex::encode(user_key.encrypt(
            &mut rng,
            Pkcs1v15Encrypt,
            encoded_key.as_bytes(),
        )?);
        self.image.ec2_encrypted_iv = hex::encode(ec2_key.encrypt(
            &mut rng,
            Pkcs1v15Encrypt,
            encoded_iv.as_bytes(),
        )?);
        self.image.user_encrypted_iv = hex::encode(user_key.encrypt(
            &mut rng,
            Pkcs1v15Encrypt,
            encoded_iv.as_bytes(),
        )?);
        Ok(())
    }

    /// Serialize `<machine_configuration>` followed by `<image>`, the byte
    /// range the signature is computed over.
    pub fn signed_fragment(&self) -> Vec<u8> {
        let mut w = XmlWriter::new();

        w.open("machine_configuration");
        w.element("architecture", &self.machine_configuration.architecture);
        if !self.machine_configuration.block_device_mappings.is_empty() {
            w.open("block_device_mapping");
            for mapping in &self.machine_configuration.block_device_mappings {
                w.open("mapping");
                w.element("virtual", &mapping.virtual_name);
                w.element("device", &mapping.device_name);
                w.close("mapping");
            }
            w.close("block_device_mapping");
        }
        w.close("machine_configuration");

        w.open("image");
        w.element("name", &self.image.name);
        w.element("user", &self.image.user);
        w.element("type", &self.image.image_type);
        w.element_with("digest", &[("algorithm", "SHA1")], &self.image.digest);
        w.element("size", &self.image.size.to_string());
        w.element("bundled_size", &self.image.bundled_size.to_string());
        w.element_with(
            "ec2_encrypted_key",
            &[("algorithm", "AES-128-CBC")],
            &self.image.ec2_encrypted_key,
        );
        w.element_with(
            "user_encrypted_key",
            &[("algorithm", "AES-128-CBC")],
            &self.image.user_encrypted_key,
        );
        w.element("ec2_encrypted_iv", &self.image.ec2_encrypted_iv);
        w.element("user_encrypted_iv", &self.image.user_encrypted_iv);

        w.open_with("parts", &[("count", &self.image.parts.len().to_string())]);
        for (index, part) in self.image.parts.iter().enumerate() {
            w.open_with("part", &[("index", &index.to_string())]);
            w.element("filename", &part.filename);
            w.element_with("digest", &[("algorithm", "SHA1")], &part.digest);
            w.close("part");
        }
        w.close("parts");
        w.close("image");

        w.into_bytes()
    }

    /// Sign the fragment with the user's private key and produce the full
    /// manifest document.
    pub fn sign_and_serialize(&self, user_key: &RsaPrivateKey) -> Result<Vec<u8>> {
        if let Some(comment) = &self.bundler.comment {
            if comment.contains("--") {
                return Err(BundleError::Metadata(
                    "bundler comment must not contain \"--\"".to_string(),
                ));
            }
        }

        let fragment = self.signed_fragment();
        let digest = Sha1::digest(&fragment);
        let signature = user_key.sign(Pkcs1v15Sign::new::<Sha1>(), &digest)?;

        let mut w = XmlWriter::new();
        w.raw(b"<?xml version='1.0'?>");
        w.open("manifest");
        w.element("version", MANIFEST_VERSION);

        w.open("bundler");
        w.element("name", &self.bundler.name);
        w.element("version", &self.bundler.version);
        w.element("release", &self.bundler.release);
        if let Some(comment) = &self.bundler.comment {
            w.comment(comment);
        }
        w.close("bundler");

        // The signed bytes, spliced in unchanged.
        w.raw(&fragment);

        w.element("signature", &hex::encode(signature));
        w.close("manifest");
        Ok(w.into_bytes())
    }
}
