use crate::tier::config::{TierConfig, TransferMode};
use sha2::{Digest, Sha256};
use std::fs::{self, File, FileTimes, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("{tool} exited with {status}: {stderr}")]
    CommandFailed {
        tool: String,
        status: String,
        stderr: String,
    },
    #[error("{0}")]
    Launch(String),
    #[error("verification failed for {}: {reason}", .path.display())]
    Verify { path: PathBuf, reason: String },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl TransferError {
    fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Moves one file from the cache tier to the array tier.
///
/// Implementations must keep file attributes and remove `src` only after the
/// destination is complete. On error `src` must still be intact.
pub trait TierTransfer {
    fn name(&self) -> &'static str;
    fn transfer(&self, src: &Path, dst: &Path) -> Result<(), TransferError>;
}

#[derive(Debug, Clone, Default)]
pub struct NativeTransfer {
    always_copy: bool,
}

impl NativeTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skips the rename fast path so the copy branch runs on one filesystem.
    #[cfg(test)]
    pub fn copying() -> Self {
        Self { always_copy: true }
    }
}

fn sha256_file(path: &Path) -> Result<String, TransferError> {
    let mut file =
        File::open(path).map_err(|err| TransferError::io(format!("failed to open {}", path.display()), err))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .map_err(|err| TransferError::io(format!("failed to hash {}", path.display()), err))?;
    Ok(format!("{:x}", hasher.finalize()))
}

fn discard_partial(dst: &Path) {
    let _ = fs::remove_file(dst);
}

fn copy_verify_delete(src: &Path, dst: &Path) -> Result<(), TransferError> {
    let meta = fs::metadata(src)
        .map_err(|err| TransferError::io(format!("failed to stat {}", src.display()), err))?;

    if let Err(err) = fs::copy(src, dst) {
        discard_partial(dst);
        return Err(TransferError::io(
            format!("failed to copy {} to {}", src.display(), dst.display()),
            err,
        ));
    }

    let copied_len = fs::metadata(dst).map(|m| m.len()).unwrap_or(u64::MAX);
    if copied_len != meta.len() {
        discard_partial(dst);
        return Err(TransferError::Verify {
            path: dst.to_path_buf(),
            reason: format!("size {} != {}", copied_len, meta.len()),
        });
    }
    let (src_hash, dst_hash) = (sha256_file(src)?, sha256_file(dst)?);
    if src_hash != dst_hash {
        discard_partial(dst);
        return Err(TransferError::Verify {
            path: dst.to_path_buf(),
            reason: "sha256 mismatch".to_string(),
        });
    }

    let mut times = FileTimes::new();
    if let Ok(modified) = meta.modified() {
        times = times.set_modified(modified);
    }
    if let Ok(accessed) = meta.accessed() {
        times = times.set_accessed(accessed);
    }
    OpenOptions::new()
        .write(true)
        .open(dst)
        .and_then(|file| file.set_times(times))
        .map_err(|err| TransferError::io(format!("failed to set times on {}", dst.display()), err))?;

    keep_ownership(&meta, dst);

    fs::remove_file(src)
        .map_err(|err| TransferError::io(format!("failed to remove {}", src.display()), err))
}

/// Best effort: changing owners needs privilege, so an unprivileged run keeps
/// the copy owned by itself.
#[cfg(unix)]
fn keep_ownership(meta: &fs::Metadata, dst: &Path) {
    use std::os::unix::fs::MetadataExt;
    let _ = std::os::unix::fs::chown(dst, Some(meta.uid()), Some(meta.gid()));
}

#[cfg(not(unix))]
fn keep_ownership(_meta: &fs::Metadata, _dst: &Path) {}

impl TierTransfer for NativeTransfer {
    fn name(&self) -> &'static str {
        "native"
    }

    fn transfer(&self, src: &Path, dst: &Path) -> Result<(), TransferError> {
        if src == dst {
            return Ok(());
        }
        if self.always_copy {
            return copy_verify_delete(src, dst);
        }

        match fs::rename(src, dst) {
            Ok(()) => Ok(()),
            Err(rename_err)
                if matches!(
                    rename_err.kind(),
                    ErrorKind::CrossesDevices | ErrorKind::PermissionDenied
                ) =>
            {
                copy_verify_delete(src, dst)
            }
            Err(rename_err) => Err(TransferError::io(
                format!("failed to move {} to {}", src.display(), dst.display()),
                rename_err,
            )),
        }
    }
}

/// Picks the transfer implementation named by the configuration.
pub fn transfer_for(cfg: &TierConfig) -> Result<Box<dyn TierTransfer>, TransferError> {
    let rsync = || crate::host::rsync::RsyncTransfer::resolve(cfg);
    match cfg.sweep.transfer {
        TransferMode::Native => Ok(Box::new(NativeTransfer::new())),
        TransferMode::Rsync => Ok(Box::new(rsync()?)),
        TransferMode::Auto => match rsync() {
            Ok(rsync) => Ok(Box::new(rsync)),
            Err(_) => Ok(Box::new(NativeTransfer::new())),
        },
    }
}
