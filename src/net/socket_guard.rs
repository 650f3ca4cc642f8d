//! Proxy socket path check before binding.
//!
//! A leftover socket from a previous run is removed; anything else at the
//! path is left alone and startup aborts.

use std::io;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("unable to stat proxy socket '{}': {source}", .path.display())]
    Stat { path: PathBuf, source: io::Error },

    #[error("proxy socket '{}' exists and could not be removed: {source}", .path.display())]
    Remove { path: PathBuf, source: io::Error },

    #[error("proxy socket '{}' exists and is not a socket", .path.display())]
    NotASocket { path: PathBuf },
}

/// What the guard found at the bind path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOutcome {
    /// Nothing was there.
    Absent,
    /// A stale Unix socket was removed.
    RemovedStale,
}

/// Make sure `path` is free to bind.
pub fn ensure_socket_path_free(path: &Path) -> Result<GuardOutcome, GuardError> {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(GuardOutcome::Absent),
        Err(source) => {
            return Err(GuardError::Stat {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    if !metadata.file_type().is_socket() {
        return Err(GuardError::NotASocket {
            path: path.to_path_buf(),
        });
    }

    std::fs::remove_file(path).map_err(|source| GuardError::Remove {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(path = %path.display(), "Removed old proxy socket");
    Ok(GuardOutcome::RemovedStale)
}
