//! Saving tokens, QR images and decrypted payloads to disk
//!
//! Every artifact is written atomically: a tempfile in the target directory
//! is filled, flushed, fsynced and then renamed over the destination, so a
//! reader sees either the old file or the complete new one.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ErrorCategory, ErrorKind, QrsealError, Result};

/// Reduce a suggested name to a bare file name.
///
/// Payload names come out of decrypted data, so anything that looks like a
/// path is cut down to its last component. Returns `None` when nothing
/// usable is left.
pub fn sanitize_file_name(name: &str) -> Option<&str> {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    match base {
        "" | "." | ".." => None,
        _ if base.contains('\0') => None,
        _ => Some(base),
    }
}

/// Write `contents` to `dir/name` and return the final path.
///
/// The file is created with mode 0o600 (read/write for owner only) on Unix
/// systems.
pub fn save_artifact(dir: &Path, name: &str, contents: &[u8]) -> Result<PathBuf> {
    let file_name = sanitize_file_name(name).ok_or_else(|| {
        QrsealError::with_kind(
            ErrorCategory::User,
            ErrorKind::Io,
            format!("refusing to save under unusable file name {:?}", name),
        )
    })?;
    let target = dir.join(file_name);

    let mut temp_file = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| io_error(ErrorCategory::User, "failed to create tempfile", e))?;
    temp_file
        .write_all(contents)
        .map_err(|e| io_error(ErrorCategory::Internal, "failed to write to tempfile", e))?;
    // Flush and fsync() such that the rename later, if it succeeds, will
    // always point to a valid file.
    temp_file
        .flush()
        .map_err(|e| io_error(ErrorCategory::Internal, "failed to flush tempfile", e))?;
    temp_file.as_file().sync_all().map_err(|e| {
        io_error(
            ErrorCategory::Internal,
            "failed to sync file prior to rename",
            e,
        )
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = temp_file
            .as_file()
            .metadata()
            .map_err(|e| io_error(ErrorCategory::Internal, "failed to get tempfile metadata", e))?
            .permissions();
        perms.set_mode(0o600);
        temp_file.as_file().set_permissions(perms).map_err(|e| {
            io_error(
                ErrorCategory::Internal,
                "failed to set tempfile permissions",
                e,
            )
        })?;
    }

    temp_file.persist(&target).map_err(|e| {
        QrsealError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            format!("failed to rename to target file {}", target.display()),
            e,
        )
    })?;
    debug!(path = %target.display(), bytes = contents.len(), "artifact saved");
    Ok(target)
}

fn io_error(category: ErrorCategory, msg: &str, err: io::Error) -> QrsealError {
    QrsealError::with_kind_and_source(category, ErrorKind::Io, msg, err)
}
