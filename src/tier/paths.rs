use anyhow::Result;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct TierPaths {
    pub tier_home: PathBuf,
    pub ledger_file: PathBuf,
    pub logs_dir: PathBuf,
    pub lock_dir: PathBuf,
    pub pid_file: PathBuf,
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

pub fn tier_home() -> Result<PathBuf> {
    match env::var("TIER_HOME") {
        Ok(v) if !v.trim().is_empty() => Ok(PathBuf::from(v.trim())),
        _ => Ok(required_home_dir()?.join(".cache-tier")),
    }
}

pub fn resolve_paths() -> Result<TierPaths> {
    let tier_home = tier_home()?;

    let ledger_file = env_or_default_path("TIER_LEDGER_FILE", tier_home.join("cached_files.list"));
    let logs_dir = env_or_default_path("TIER_LOGS_DIR", tier_home.join("logs"));
    let lock_dir = env_or_default_path("TIER_LOCK_DIR", tier_home.join("locks"));
    let pid_file = env_or_default_path("TIER_PID_FILE", tier_home.join("daemon.pid"));

    Ok(TierPaths {
        tier_home,
        ledger_file,
        logs_dir,
        lock_dir,
        pid_file,
    })
}

#[cfg(test)]
impl TierPaths {
    pub fn under(root: &std::path::Path) -> Self {
        Self {
            tier_home: root.to_path_buf(),
            ledger_file: root.join("cached_files.list"),
            logs_dir: root.join("logs"),
            lock_dir: root.join("locks"),
            pid_file: root.join("daemon.pid"),
        }
    }
}
