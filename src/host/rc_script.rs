use crate::tier::util::{run_command_with_optional_timeout, truncate_with_ellipsis};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::process::Command;

fn ensure_executable_path(path: &Path) -> Result<()> {
    let meta = fs::metadata(path)
        .with_context(|| format!("service command does not exist: {}", path.display()))?;
    if !meta.is_file() {
        anyhow::bail!("service command is not a file: {}", path.display());
    }
    Ok(())
}

/// Accepts an absolute path or a bare name looked up on PATH.
pub fn resolve_service_command(raw: &str) -> Result<std::path::PathBuf> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        anyhow::bail!("service command is empty; set TIER_SERVICE_CMD or [service].command");
    }
    let path = Path::new(trimmed);
    if path.components().count() > 1 {
        ensure_executable_path(path)?;
        return Ok(path.to_path_buf());
    }
    which::which(trimmed).with_context(|| format!("service command `{trimmed}` not found on PATH"))
}

/// Runs `<command> <verb>` once. No retries; convergence is checked by the caller.
pub fn run_service_verb(command: &str, verb: &str, timeout_secs: Option<u64>) -> Result<String> {
    let bin = resolve_service_command(command)?;
    let mut cmd = Command::new(&bin);
    cmd.arg(verb);
    let out = run_command_with_optional_timeout(&mut cmd, timeout_secs)
        .with_context(|| format!("failed to run `{} {verb}`", bin.display()))?;

    let stdout = String::from_utf8_lossy(&out.stdout).trim().to_string();
    if out.status.success() {
        return Ok(truncate_with_ellipsis(&stdout, 240));
    }
    anyhow::bail!(
        "`{} {verb}` exited with {}\nstdout: {}\nstderr: {}",
        bin.display(),
        out.status,
        stdout,
        String::from_utf8_lossy(&out.stderr).trim()
    )
}
