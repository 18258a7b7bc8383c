//! Atomic on-disk binary replacement.
//!
//! The swap keeps one invariant at all times: the target path resolves to
//! either the old complete binary or the new complete binary, never to a
//! partial or missing file. Verified bytes are written to a temporary file
//! on the same volume, the existing binary is staged aside, and the
//! temporary file is renamed into place. On failure the staged binary is
//! restored.

use super::UpdateError;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Sibling path the previous binary is staged at during a swap.
///
/// Appends `.old` to the full file name rather than replacing an existing
/// extension, so `agent.exe` stages as `agent.exe.old`.
#[must_use]
pub fn backup_path(target: &Path) -> PathBuf {
    match target.file_name() {
        Some(name) => {
            let mut staged = name.to_os_string();
            staged.push(".old");
            target.with_file_name(staged)
        }
        None => target.with_extension("old"),
    }
}

/// Remove a backup left behind by a previous swap.
///
/// On platforms where the running image cannot be unlinked during the swap,
/// the stale backup is cleaned up here at next start. Returns whether a
/// backup was removed.
///
/// # Errors
///
/// Returns an error if a backup exists but cannot be removed.
pub fn remove_stale_backup(target: &Path) -> std::io::Result<bool> {
    let backup = backup_path(target);
    match fs::remove_file(&backup) {
        Ok(()) => {
            debug!("removed stale backup {}", backup.display());
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Install verified bytes at the target path.
///
/// The caller has already authenticated `bytes`; this function only moves
/// them into place:
///
/// 1. write to a temporary file adjacent to the target (same volume, so the
///    final rename is atomic) and fsync it
/// 2. carry over the target's permissions, or default to `0o755`
/// 3. stage the existing binary aside as `<name>.old`
/// 4. rename the temporary file over the target
///
/// If the final rename fails the staged binary is moved back; a failed
/// restore is reported as the distinct
/// [`UpdateError::ReplacementUnrestored`] condition.
///
/// # Errors
///
/// Returns [`UpdateError::Replacement`] (or `ReplacementUnrestored`) on any
/// filesystem failure. The target is left as the prior valid binary except
/// in the unrestored case, where the prior binary remains available at the
/// backup path.
pub fn install(target: &Path, bytes: &[u8]) -> Result<(), UpdateError> {
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut staged_new = NamedTempFile::new_in(dir).map_err(|e| replacement(target, e))?;
    staged_new
        .write_all(bytes)
        .map_err(|e| replacement(target, e))?;
    staged_new
        .as_file()
        .sync_all()
        .map_err(|e| replacement(target, e))?;

    set_executable(target, staged_new.path()).map_err(|e| replacement(target, e))?;

    // A stale backup from an interrupted swap would make the stage-aside
    // rename fail on some platforms; clear it first.
    let backup = backup_path(target);
    let _ = fs::remove_file(&backup);

    let staged_old = if target.exists() {
        fs::rename(target, &backup).map_err(|e| replacement(target, e))?;
        true
    } else {
        false
    };

    match staged_new.persist(target) {
        Ok(_) => {
            if staged_old {
                if let Err(e) = fs::remove_file(&backup) {
                    // Running images cannot always be unlinked; the stale
                    // backup is removed at next start instead.
                    debug!("leaving backup {} in place: {}", backup.display(), e);
                }
            }
            debug!("installed {} bytes at {}", bytes.len(), target.display());
            Ok(())
        }
        Err(e) => {
            let cause = e.error;
            if staged_old {
                if let Err(restore) = fs::rename(&backup, target) {
                    warn!(
                        "failed to restore {} from {}: {}",
                        target.display(),
                        backup.display(),
                        restore
                    );
                    return Err(UpdateError::ReplacementUnrestored {
                        target: target.to_path_buf(),
                        source: cause,
                        restore,
                    });
                }
            }
            Err(replacement(target, cause))
        }
    }
}

fn replacement(target: &Path, source: std::io::Error) -> UpdateError {
    UpdateError::Replacement {
        target: target.to_path_buf(),
        source,
    }
}

/// Give the staged file the permissions an executable needs, preserving the
/// current target's mode when one exists.
#[cfg(unix)]
fn set_executable(target: &Path, staged: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let permissions = match fs::metadata(target) {
        Ok(metadata) => metadata.permissions(),
        Err(_) => fs::Permissions::from_mode(0o755),
    };
    fs::set_permissions(staged, permissions)
}

#[cfg(not(unix))]
fn set_executable(_target: &Path, _staged: &Path) -> std::io::Result<()> {
    // Execute permission is not a file mode bit on this platform.
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn install_writes_exact_bytes() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("agent");

        install(&target, b"new binary").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"new binary");
    }

    #[test]
    fn install_replaces_existing_binary() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("agent");
        fs::write(&target, b"old binary").unwrap();

        install(&target, b"new binary").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"new binary");
        // Backup is cleaned up after a successful swap on this platform.
        assert!(!backup_path(&target).exists());
    }

    #[cfg(unix)]
    #[test]
    fn install_marks_target_executable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let target = dir.path().join("agent");

        install(&target, b"#!/bin/sh\n").unwrap();
        let mode = fs::metadata(&target).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111, "expected executable bits, got {mode:o}");
    }

    #[cfg(unix)]
    #[test]
    fn install_preserves_existing_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let target = dir.path().join("agent");
        fs::write(&target, b"old").unwrap();
        fs::set_permissions(&target, fs::Permissions::from_mode(0o700)).unwrap();

        install(&target, b"new").unwrap();
        let mode = fs::metadata(&target).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[test]
    fn backup_path_appends_old() {
        assert_eq!(
            backup_path(Path::new("/usr/bin/agent")),
            PathBuf::from("/usr/bin/agent.old")
        );
        assert_eq!(
            backup_path(Path::new("/srv/agent.exe")),
            PathBuf::from("/srv/agent.exe.old")
        );
    }

    #[test]
    fn stale_backup_is_removed_once() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("agent");
        fs::write(backup_path(&target), b"leftover").unwrap();

        assert!(remove_stale_backup(&target).unwrap());
        assert!(!remove_stale_backup(&target).unwrap());
    }

    #[test]
    fn failed_install_leaves_prior_binary() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("missing-dir").join("agent");

        // Parent directory does not exist: the temp write fails before any
        // mutation of the (nonexistent) target.
        let err = install(&target, b"new").unwrap_err();
        assert!(matches!(err, UpdateError::Replacement { .. }));
        assert!(!target.exists());
    }

    #[test]
    fn install_overwrites_stale_backup() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("agent");
        fs::write(&target, b"old").unwrap();
        fs::write(backup_path(&target), b"ancient leftover").unwrap();

        install(&target, b"new").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"new");
    }
}
