use crate::tier::config::TierConfig;
use crate::tier::transfer::{TierTransfer, TransferError};
use crate::tier::util::{run_command_with_optional_timeout, truncate_with_ellipsis};
use std::path::{Path, PathBuf};
use std::process::Command;

const STDERR_EXCERPT_CHARS: usize = 240;

/// `rsync -a --inplace --remove-source-files`: attributes kept, resumable
/// in-place writes, source dropped only after rsync reports success.
#[derive(Debug, Clone)]
pub struct RsyncTransfer {
    bin: PathBuf,
    timeout_secs: Option<u64>,
}

impl RsyncTransfer {
    pub fn resolve(cfg: &TierConfig) -> Result<Self, TransferError> {
        let bin = match &cfg.sweep.rsync_bin {
            Some(bin) => {
                if !bin.is_file() {
                    return Err(TransferError::Launch(format!(
                        "rsync binary path is not a file: {}",
                        bin.display()
                    )));
                }
                bin.clone()
            }
            None => which::which("rsync")
                .map_err(|err| TransferError::Launch(format!("rsync not found on PATH: {err}")))?,
        };
        Ok(Self {
            bin,
            timeout_secs: cfg.sweep.transfer_timeout_secs,
        })
    }

    fn command(&self, src: &Path, dst: &Path) -> Command {
        let mut cmd = Command::new(&self.bin);
        cmd.args(["-a", "--inplace", "--remove-source-files"])
            .arg(src)
            .arg(dst);
        cmd
    }
}

impl TierTransfer for RsyncTransfer {
    fn name(&self) -> &'static str {
        "rsync"
    }

    fn transfer(&self, src: &Path, dst: &Path) -> Result<(), TransferError> {
        let mut cmd = self.command(src, dst);
        let out = run_command_with_optional_timeout(&mut cmd, self.timeout_secs).map_err(|err| {
            TransferError::Launch(format!("failed to run `{}`: {err:#}", self.bin.display()))
        })?;
        if out.status.success() {
            return Ok(());
        }
        Err(TransferError::CommandFailed {
            tool: "rsync".to_string(),
            status: out.status.to_string(),
            stderr: truncate_with_ellipsis(
                String::from_utf8_lossy(&out.stderr).trim(),
                STDERR_EXCERPT_CHARS,
            ),
        })
    }
}
