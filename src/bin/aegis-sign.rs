//! Release signing utility for aegis-agent.
//!
//! Generates ECDSA P-384 keypairs and produces the detached hex signatures
//! the agent verifies before installing an update:
//!
//!   aegis-sign keygen --output-dir keys/
//!   aegis-sign sign --key keys/release-signing-key.pem target/release/aegis-agent
//!   aegis-sign verify --public-key keys/release-signing-key.pub.pem \
//!       --signature target/release/aegis-agent.sig target/release/aegis-agent

use aegis_agent::update::verify;
use chrono::Utc;
use clap::{Parser, Subcommand};
use color_eyre::eyre::eyre;
use p384::ecdsa::signature::hazmat::PrehashSigner;
use p384::ecdsa::{Signature, SigningKey};
use p384::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rand_core::OsRng;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;

/// Release signing utility for aegis-agent.
#[derive(Parser, Debug)]
#[command(name = "aegis-sign")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a new P-384 release signing keypair.
    Keygen {
        /// Directory to write the keypair into.
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Sign a release binary, producing a detached hex signature.
    Sign {
        /// Path to the PEM-encoded private signing key.
        #[arg(long)]
        key: PathBuf,
        /// Where to write the signature (defaults to `<binary>.sig`).
        #[arg(long)]
        output: Option<PathBuf>,
        /// The binary to sign.
        binary: PathBuf,
    },
    /// Verify a detached signature the way the agent does.
    Verify {
        /// Path to the PEM-encoded public key.
        #[arg(long)]
        public_key: PathBuf,
        /// Path to the hex signature file.
        #[arg(long)]
        signature: PathBuf,
        /// The binary to verify.
        binary: PathBuf,
    },
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    match cli.command {
        Command::Keygen { output_dir } => keygen(&output_dir),
        Command::Sign {
            key,
            output,
            binary,
        } => sign(&key, output.as_deref(), &binary),
        Command::Verify {
            public_key,
            signature,
            binary,
        } => verify_detached(&public_key, &signature, &binary),
    }
}

fn keygen(output_dir: &std::path::Path) -> color_eyre::Result<()> {
    fs::create_dir_all(output_dir)?;

    let signing_key = SigningKey::random(&mut OsRng);
    let private_pem = signing_key.to_pkcs8_pem(LineEnding::LF)?;
    let public_pem = signing_key.verifying_key().to_public_key_pem(LineEnding::LF)?;

    let private_path = output_dir.join("release-signing-key.pem");
    fs::write(&private_path, private_pem.as_bytes())?;
    restrict_permissions(&private_path)?;

    let public_path = output_dir.join("release-signing-key.pub.pem");
    fs::write(&public_path, public_pem.as_bytes())?;

    println!("Generated P-384 release signing keypair ({})", Utc::now().format("%Y-%m-%d %H:%M:%S UTC"));
    println!();
    println!("Private key: {}", private_path.display());
    println!("  WARNING: keep this file secure; it signs releases.");
    println!("Public key:  {}", public_path.display());
    println!();
    println!("Pin the public key in the agent config as update.public_key_pem:");
    println!();
    print!("{public_pem}");

    Ok(())
}

fn sign(
    key: &std::path::Path,
    output: Option<&std::path::Path>,
    binary: &std::path::Path,
) -> color_eyre::Result<()> {
    let key_pem = fs::read_to_string(key)?;
    let signing_key = SigningKey::from_pkcs8_pem(&key_pem)
        .map_err(|e| eyre!("failed to parse signing key {}: {e}", key.display()))?;

    let content = fs::read(binary)?;
    let checksum: [u8; 32] = Sha256::digest(&content).into();
    let signature: Signature = signing_key
        .sign_prehash(&checksum)
        .map_err(|e| eyre!("signing failed: {e}"))?;
    let signature_hex = hex::encode(signature.to_der().as_bytes());

    let output_path = match output {
        Some(path) => path.to_path_buf(),
        None => {
            let mut name = binary
                .file_name()
                .ok_or_else(|| eyre!("binary path has no file name"))?
                .to_os_string();
            name.push(".sig");
            binary.with_file_name(name)
        }
    };
    fs::write(&output_path, &signature_hex)?;

    println!("Signed {} ({} bytes)", binary.display(), content.len());
    println!("  sha256:    {}", hex::encode(checksum));
    println!("  signature: {}", output_path.display());

    Ok(())
}

fn verify_detached(
    public_key: &std::path::Path,
    signature: &std::path::Path,
    binary: &std::path::Path,
) -> color_eyre::Result<()> {
    let key = verify::parse_public_key(&fs::read_to_string(public_key)?)?;
    let signature = verify::decode_signature(&fs::read_to_string(signature)?)?;
    let content = fs::read(binary)?;

    let checksum = verify::verify_candidate(&key, &signature, &content)?;
    println!("OK: signature valid for {}", binary.display());
    println!("  sha256: {}", hex::encode(checksum));

    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(path: &std::path::Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &std::path::Path) -> std::io::Result<()> {
    Ok(())
}
