//! End-to-end update flow tests.
//!
//! Exercises the full pipeline the agent runs in production: a candidate
//! binary on disk, a pinned PEM public key, a detached hex signature, and an
//! atomic swap of the target binary.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use aegis_agent::loader::{FileLoader, MemoryLoader};
use aegis_agent::{SecureUpdater, UpdateOptions};
use p384::ecdsa::signature::hazmat::PrehashSigner;
use p384::ecdsa::{Signature, SigningKey};
use p384::pkcs8::{EncodePublicKey, LineEnding};
use rand_core::OsRng;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct ReleaseFixture {
    signing_key: SigningKey,
    public_key_pem: String,
    dir: TempDir,
}

impl ReleaseFixture {
    fn new() -> Self {
        let signing_key = SigningKey::random(&mut OsRng);
        let public_key_pem = signing_key
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap();
        Self {
            signing_key,
            public_key_pem,
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn sign(&self, content: &[u8]) -> String {
        let checksum: [u8; 32] = Sha256::digest(content).into();
        let signature: Signature = self.signing_key.sign_prehash(&checksum).unwrap();
        hex::encode(signature.to_der().as_bytes())
    }

    fn write_candidate(&self, content: &[u8]) -> PathBuf {
        let path = self.dir.path().join("candidate.bin");
        fs::write(&path, content).unwrap();
        path
    }

    fn target_with(&self, content: &[u8]) -> PathBuf {
        let path = self.dir.path().join("agent");
        fs::write(&path, content).unwrap();
        path
    }

    fn options(&self, signature_hex: String, target: &Path) -> UpdateOptions {
        UpdateOptions {
            public_key_pem: self.public_key_pem.clone(),
            signature_hex,
            target: target.to_path_buf(),
        }
    }
}

const NEW_RELEASE: &[u8] = b"\x7fELF pretend release v2 contents";
const OLD_RELEASE: &[u8] = b"\x7fELF pretend release v1 contents";

#[tokio::test]
async fn signed_candidate_from_file_replaces_target() {
    let fixture = ReleaseFixture::new();
    let candidate_path = fixture.write_candidate(NEW_RELEASE);
    let target = fixture.target_with(OLD_RELEASE);

    let updater = SecureUpdater::new(
        FileLoader::new(candidate_path),
        fixture.options(fixture.sign(NEW_RELEASE), &target),
    );

    let receipt = updater.apply().await.unwrap();
    assert_eq!(receipt.bytes_written, NEW_RELEASE.len() as u64);
    assert_eq!(fs::read(&target).unwrap(), NEW_RELEASE);
}

#[cfg(unix)]
#[tokio::test]
async fn installed_target_is_executable() {
    use std::os::unix::fs::PermissionsExt;

    let fixture = ReleaseFixture::new();
    let candidate_path = fixture.write_candidate(NEW_RELEASE);
    let target = fixture.dir.path().join("agent");

    let updater = SecureUpdater::new(
        FileLoader::new(candidate_path),
        fixture.options(fixture.sign(NEW_RELEASE), &target),
    );
    updater.apply().await.unwrap();

    let mode = fs::metadata(&target).unwrap().permissions().mode();
    assert_eq!(mode & 0o111, 0o111, "expected executable bits, got {mode:o}");
}

#[tokio::test]
async fn cleared_signature_fails_and_leaves_target() {
    let fixture = ReleaseFixture::new();
    let target = fixture.target_with(OLD_RELEASE);

    let updater = SecureUpdater::new(
        MemoryLoader::new(NEW_RELEASE),
        fixture.options(String::new(), &target),
    );

    let err = updater.apply().await.unwrap_err();
    assert_eq!(err.reason(), "invalid_signature_encoding");
    assert_eq!(fs::read(&target).unwrap(), OLD_RELEASE);
}

#[tokio::test]
async fn cleared_public_key_fails_and_leaves_target() {
    let fixture = ReleaseFixture::new();
    let target = fixture.target_with(OLD_RELEASE);

    let mut options = fixture.options(fixture.sign(NEW_RELEASE), &target);
    options.public_key_pem = String::new();
    let updater = SecureUpdater::new(MemoryLoader::new(NEW_RELEASE), options);

    let err = updater.apply().await.unwrap_err();
    assert_eq!(err.reason(), "invalid_public_key");
    assert_eq!(fs::read(&target).unwrap(), OLD_RELEASE);
}

#[tokio::test]
async fn tampered_candidate_fails_and_leaves_target() {
    let fixture = ReleaseFixture::new();
    let target = fixture.target_with(OLD_RELEASE);

    // Signature matches the real release; the loader serves tampered bytes.
    let updater = SecureUpdater::new(
        MemoryLoader::new(&b"tampered contents"[..]),
        fixture.options(fixture.sign(NEW_RELEASE), &target),
    );

    let err = updater.apply().await.unwrap_err();
    assert_eq!(err.reason(), "signature_verification_failed");
    assert_eq!(fs::read(&target).unwrap(), OLD_RELEASE);
}

#[tokio::test]
async fn missing_candidate_fails_and_leaves_target() {
    let fixture = ReleaseFixture::new();
    let target = fixture.target_with(OLD_RELEASE);

    let updater = SecureUpdater::new(
        FileLoader::new(fixture.dir.path().join("does-not-exist.bin")),
        fixture.options(fixture.sign(NEW_RELEASE), &target),
    );

    let err = updater.apply().await.unwrap_err();
    assert_eq!(err.reason(), "load_failed");
    assert_eq!(fs::read(&target).unwrap(), OLD_RELEASE);
}

#[tokio::test]
async fn signature_from_wrong_key_is_rejected() {
    let fixture = ReleaseFixture::new();
    let other = ReleaseFixture::new();
    let target = fixture.target_with(OLD_RELEASE);

    // Signed by a key other than the pinned one.
    let updater = SecureUpdater::new(
        MemoryLoader::new(NEW_RELEASE),
        fixture.options(other.sign(NEW_RELEASE), &target),
    );

    let err = updater.apply().await.unwrap_err();
    assert_eq!(err.reason(), "signature_verification_failed");
    assert_eq!(fs::read(&target).unwrap(), OLD_RELEASE);
}
