//! Lifecycle control and liveness of the copy-in daemon, keyed by its pid file.

use crate::host::rc_script;
use crate::tier::config::ServiceConfig;
use anyhow::Result;
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Running,
    Stopped,
}

impl ServiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ServiceCommand {
    Start,
    Stop,
    Restart,
}

impl ServiceCommand {
    pub fn verb(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceProbe {
    pub status: ServiceStatus,
    pub pid: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ControlOutcome {
    pub command: ServiceCommand,
    pub output: String,
    pub probe: ServiceProbe,
}

fn read_pid(pid_file: &Path) -> Option<u32> {
    let raw = fs::read_to_string(pid_file).ok()?;
    raw.lines()
        .find(|line| !line.trim().is_empty())?
        .trim()
        .parse::<u32>()
        .ok()
        .filter(|pid| *pid > 0)
}

fn proc_state(pid: u32) -> Option<char> {
    let raw = fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    // The command name is parenthesised and may itself contain spaces.
    let after_comm = raw.rsplit_once(')')?.1;
    after_comm.trim_start().chars().next()
}

pub fn process_alive(pid: u32) -> bool {
    if Path::new("/proc/self/stat").exists() {
        return matches!(proc_state(pid), Some(state) if state != 'Z' && state != 'X');
    }
    if cfg!(windows) {
        return false;
    }
    Command::new("kill")
        .arg("-0")
        .arg(pid.to_string())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Never fails: an absent, unreadable, or stale pid file means stopped.
pub fn status(pid_file: &Path) -> ServiceProbe {
    match read_pid(pid_file) {
        Some(pid) if process_alive(pid) => ServiceProbe {
            status: ServiceStatus::Running,
            pid: Some(pid),
        },
        pid => ServiceProbe {
            status: ServiceStatus::Stopped,
            pid,
        },
    }
}

/// Issues the lifecycle verb, waits one settle delay, and re-probes once.
pub fn control(cfg: &ServiceConfig, pid_file: &Path, command: ServiceCommand) -> Result<ControlOutcome> {
    let Some(script) = cfg.command.as_deref() else {
        anyhow::bail!("no service command configured; set TIER_SERVICE_CMD or [service].command");
    };
    let output = rc_script::run_service_verb(script, command.verb(), cfg.timeout_secs)?;
    thread::sleep(Duration::from_millis(cfg.settle_ms));
    Ok(ControlOutcome {
        command,
        output,
        probe: status(pid_file),
    })
}
