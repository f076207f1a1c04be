use anyhow::Result;
use serde::Serialize;
use std::env;

use crate::commands::CommandReport;
use crate::tier::config::load_config;
use crate::tier::ledger::LedgerStore;
use crate::tier::lock::lock_path_for;
use crate::tier::paths::resolve_paths;
use crate::tier::service::{self, ServiceProbe};

include!(concat!(env!("OUT_DIR"), "/tier_env_allowlist.rs"));

#[derive(Debug, Clone, Serialize)]
struct StatusView {
    service: ServiceProbe,
    build_uuid: &'static str,
    ledger_entries: usize,
    env_overrides: Vec<String>,
}

/// Recognised `TIER_*` keys that are set in the current environment.
pub fn active_env_overrides() -> Vec<String> {
    GENERATED_TIER_ENV_ALLOWLIST
        .iter()
        .filter(|key| env::var_os(key).is_some())
        .map(|key| key.to_string())
        .collect()
}

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("status");

    let probe = service::status(&paths.pid_file);
    report.detail(format!("service={}", probe.status.as_str()));
    if let Some(pid) = probe.pid {
        report.detail(format!("service.pid={pid}"));
    }
    report.detail(format!("build_uuid={}", env!("BUILD_UUID")));

    report.detail(format!("tier_home={}", paths.tier_home.display()));
    report.detail(format!("ledger_file={}", paths.ledger_file.display()));
    report.detail(format!("logs_dir={}", paths.logs_dir.display()));
    report.detail(format!("pid_file={}", paths.pid_file.display()));

    let overrides = active_env_overrides();
    for key in &overrides {
        report.detail(format!("env.{key}=set"));
    }

    let ledger_entries = match LedgerStore::new(&paths.ledger_file).load() {
        Ok(snapshot) => {
            report.detail(format!("ledger.entries={}", snapshot.len()));
            snapshot.len()
        }
        Err(err) => {
            report.issue(format!("ledger unreadable: {err}"));
            0
        }
    };

    match load_config() {
        Ok(cfg) => {
            let cache_root = &cfg.tiers.cache_root;
            report.detail(format!("cache_root={}", cache_root.display()));
            report.detail(format!("array_root={}", cfg.tiers.array_root.display()));
            report.detail(format!("transfer={}", cfg.sweep.transfer.as_str()));
            report.detail(format!("ledger_clear={}", cfg.sweep.ledger_clear.as_str()));
            report.detail(format!(
                "sweep_lock={}",
                lock_path_for(&paths.lock_dir, cache_root).display()
            ));
            if !cache_root.is_dir() {
                report.issue(format!("cache root missing ({})", cache_root.display()));
            }
            if !cfg.tiers.array_root.is_dir() {
                report.issue(format!("array root missing ({})", cfg.tiers.array_root.display()));
            }
        }
        Err(err) => report.issue(format!("config invalid: {err}")),
    }

    report.attach(&StatusView {
        service: probe,
        build_uuid: env!("BUILD_UUID"),
        ledger_entries,
        env_overrides: overrides,
    });
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::GENERATED_TIER_ENV_ALLOWLIST;

    #[test]
    fn allowlist_contains_known_overrides_only() {
        assert!(GENERATED_TIER_ENV_ALLOWLIST.contains(&"TIER_CACHE_ROOT"));
        assert!(GENERATED_TIER_ENV_ALLOWLIST.contains(&"TIER_LEDGER_CLEAR"));
        assert!(!GENERATED_TIER_ENV_ALLOWLIST.iter().any(|key| key.ends_with('_')));
    }
}
