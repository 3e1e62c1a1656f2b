//! `ami-bundle`: bundle a disk image for EC2 instance-store registration.
//!
//! Reads a bootable disk image, produces `name.part.N` files plus
//! `name.manifest.xml` in the output directory. Upload those to S3 and
//! register the image with `RegisterImage` (neither step happens here; this
//! tool stays off the network).

use std::fs::{self, File};
use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use ami_bundle::{Application, Architecture, BundleMetadata, BundleWriter};

mod sink;

use sink::DirectorySink;

#[derive(Parser, Debug)]
#[command(name = "ami-bundle", version, about)]
struct Args {
    /// Disk image to bundle. Must be a bootable raw image.
    #[arg(long)]
    image: PathBuf,

    /// Basename for the resulting bundle files.
    #[arg(long, default_value = "image")]
    name: String,

    /// CPU architecture ("x86_64" or "i386").
    #[arg(long, default_value = "x86_64")]
    arch: Architecture,

    /// AWS account number, digits only, no dashes.
    #[arg(long)]
    account: String,

    /// Region the bundle will be registered in; selects the EC2 key that
    /// wraps the image secrets.
    #[arg(long)]
    region: String,

    /// Output directory for part files and the manifest. Created if missing.
    #[arg(long)]
    out: PathBuf,

    /// PEM-encoded RSA private key (PKCS#8 or PKCS#1). Keeps the bundle
    /// decryptable by you; a throwaway key is generated when omitted.
    #[arg(long)]
    user_key: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let mut image = File::open(&args.image)
        .with_context(|| format!("failed to open image {}", args.image.display()))?;
    let size = image
        .metadata()
        .with_context(|| format!("failed to stat image {}", args.image.display()))?
        .len();

    let user_key = args.user_key.as_deref().map(load_user_key).transpose()?;

    fs::create_dir_all(&args.out)
        .with_context(|| format!("failed to create output directory {}", args.out.display()))?;
    let mut sink = DirectorySink::new(&args.out);

    info!(image = %args.image.display(), size, name = %args.name, "bundling image");

    let mut writer = BundleWriter::new(&args.name, size, sink.clone())
        .context("failed to initialize bundle writer")?;

    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = image.read(&mut buf).context("failed to read image")?;
        if n == 0 {
            break;
        }
        writer.write(&buf[..n]).context("failed to write bundle")?;
    }
    writer.close().context("failed to finalize bundle")?;

    let metadata = BundleMetadata {
        name: args.name.clone(),
        architecture: args.arch,
        aws_account_id: args.account,
        aws_region: args.region,
        image_type: None,
        user_key,
        block_device_mappings: Vec::new(),
        bundler: Application {
            name: "ami-bundle".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            release: "1".to_string(),
            comment: None,
        },
    };
    metadata
        .write_manifest(&writer, &mut sink)
        .context("failed to write manifest")?;

    println!(
        "bundled {} bytes into {} part(s) + {}.manifest.xml in {}",
        writer.true_size(),
        writer.parts().len(),
        args.name,
        args.out.display()
    );
    Ok(())
}

fn load_user_key(path: &std::path::Path) -> Result<rsa::RsaPrivateKey> {
    use rsa::pkcs1::DecodeRsaPrivateKey;
    use rsa::pkcs8::DecodePrivateKey;

    let pem = fs::read_to_string(path)
        .with_context(|| format!("failed to read user key {}", path.display()))?;

    rsa::RsaPrivateKey::from_pkcs8_pem(&pem)
        .or_else(|_| rsa::RsaPrivateKey::from_pkcs1_pem(&pem).map_err(anyhow::Error::from))
        .with_context(|| format!("{} is not a PEM-encoded RSA private key", path.display()))
}
