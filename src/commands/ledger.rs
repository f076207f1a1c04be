use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::commands::CommandReport;
use crate::tier::ledger::{LedgerEntry, LedgerStore};
use crate::tier::paths::resolve_paths;
use crate::tier::util::now_epoch_secs_f64;

#[derive(Debug, Clone, Serialize)]
struct EntryView {
    path: PathBuf,
    cached_at: Option<f64>,
    cached_at_utc: Option<String>,
}

pub fn format_timestamp(secs: f64) -> Option<String> {
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
        .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true))
}

fn view(entry: &LedgerEntry) -> EntryView {
    EntryView {
        path: entry.path.clone(),
        cached_at: entry.cached_at,
        cached_at_utc: entry.cached_at.and_then(format_timestamp),
    }
}

fn store() -> Result<LedgerStore> {
    let paths = resolve_paths()?;
    Ok(LedgerStore::new(paths.ledger_file))
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("failed to make {} absolute", path.display()))
}

pub fn list() -> Result<CommandReport> {
    let store = store()?;
    let snapshot = store.load()?;
    let mut report = CommandReport::new("ledger-list");
    report.detail(format!("ledger_file={}", store.path().display()));

    let entries = snapshot.entries().map(view).collect::<Vec<_>>();
    for entry in &entries {
        let at = entry.cached_at_utc.as_deref().unwrap_or("-");
        report.detail(format!("{at} {}", entry.path.display()));
    }
    if snapshot.is_empty() {
        report.detail("ledger is empty");
    }
    report.detail(format!("entries={}", entries.len()));
    if !snapshot.rejected().is_empty() {
        report.detail(format!("rejected_lines={}", snapshot.rejected().len()));
    }
    report.attach(&entries);
    Ok(report)
}

pub fn add(path: &Path, at: Option<f64>) -> Result<CommandReport> {
    if let Some(at) = at.filter(|at| !at.is_finite() || *at < 0.0) {
        anyhow::bail!("--at must be a non-negative number of seconds, got {at}");
    }
    let path = absolute(path)?;
    let cached_at = match at {
        Some(at) => at,
        None => now_epoch_secs_f64()?,
    };

    let store = store()?;
    let mut report = CommandReport::new("ledger-add");
    if store.append(&path, Some(cached_at))? {
        report.detail(format!("added={}", path.display()));
    } else {
        report.detail(format!("already_tracked={}", path.display()));
    }
    Ok(report)
}

pub fn remove(paths: &[PathBuf]) -> Result<CommandReport> {
    let targets = paths
        .iter()
        .map(|path| absolute(path))
        .collect::<Result<BTreeSet<_>>>()?;
    let store = store()?;
    let removed = store.remove(&targets)?;

    let mut report = CommandReport::new("ledger-remove");
    report.detail(format!("requested={}", targets.len()));
    report.detail(format!("removed={removed}"));
    Ok(report)
}

/// Empties the ledger outright, late appends included.
pub fn clear() -> Result<CommandReport> {
    let store = store()?;
    let dropped = store.load()?.len();
    store.clear()?;

    let mut report = CommandReport::new("ledger-clear");
    report.detail(format!("ledger_file={}", store.path().display()));
    report.detail(format!("cleared={dropped}"));
    Ok(report)
}
