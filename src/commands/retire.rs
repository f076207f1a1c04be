use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;

use crate::commands::CommandReport;
use crate::tier::config::{TierConfig, load_config};
use crate::tier::interrupt::Interrupt;
use crate::tier::paths::{TierPaths, resolve_paths};
use crate::tier::policy::{LedgerPlan, MigrationPolicy, Selection};
use crate::tier::sweep::{FileError, LedgerOutcome, MigrationEngine, MigrationResult, SweepPlan};
use crate::tier::transfer::transfer_for;
use crate::tier::util::human_bytes;

#[derive(Debug, Clone, Serialize)]
struct PlanView {
    selection: String,
    dry_run: bool,
    candidates: Vec<PathBuf>,
    candidate_bytes: u64,
    files_skipped: u64,
    files_missing: Vec<PathBuf>,
    scan_errors: Vec<FileError>,
    ledger_plan: LedgerPlan,
}

impl From<&SweepPlan> for PlanView {
    fn from(plan: &SweepPlan) -> Self {
        Self {
            selection: plan.selection.label().to_string(),
            dry_run: true,
            candidates: plan.candidates.iter().map(|c| c.source_path.clone()).collect(),
            candidate_bytes: plan.candidate_bytes(),
            files_skipped: plan.skipped,
            files_missing: plan.missing.clone(),
            scan_errors: plan.scan_errors.clone(),
            ledger_plan: plan.ledger_plan,
        }
    }
}

fn describe_ledger(outcome: &LedgerOutcome) -> String {
    match outcome {
        LedgerOutcome::Untouched => "untouched".to_string(),
        LedgerOutcome::Cleared => "cleared".to_string(),
        LedgerOutcome::Pruned { removed } => format!("pruned ({removed} entries removed)"),
        LedgerOutcome::Retained { reason } => format!("retained ({reason})"),
    }
}

fn plan_report(command: &str, plan: &SweepPlan) -> CommandReport {
    let mut report = CommandReport::new(command);
    report.detail(format!("selection={}", plan.selection.label()));
    report.detail("dry_run=true");
    for candidate in &plan.candidates {
        report.detail(format!(
            "would_resolve={} ({})",
            candidate.source_path.display(),
            human_bytes(candidate.size_bytes)
        ));
    }
    report.detail(format!("candidates={}", plan.candidates.len()));
    report.detail(format!(
        "candidate_bytes={} ({})",
        plan.candidate_bytes(),
        human_bytes(plan.candidate_bytes())
    ));
    report.detail(format!("files_skipped={}", plan.skipped));
    report.detail(format!("files_missing={}", plan.missing.len()));
    for err in &plan.scan_errors {
        report.issue(format!("scan_error path={} message={}", err.path.display(), err.message));
    }
    report.attach(&PlanView::from(plan));
    report
}

pub fn sweep_report(command: &str, result: &MigrationResult) -> CommandReport {
    let mut report = CommandReport::new(command);
    report.detail(format!("selection={}", result.selection));
    report.detail(format!("files_moved={}", result.files_moved));
    report.detail(format!("files_deleted={}", result.files_deleted));
    report.detail(format!("files_resolved={}", result.files_resolved()));
    report.detail(format!("files_skipped={}", result.files_skipped));
    report.detail(format!("files_missing={}", result.files_missing));
    report.detail(format!(
        "total_bytes={} ({})",
        result.total_bytes,
        human_bytes(result.total_bytes)
    ));
    report.detail(format!("dirs_pruned={}", result.dirs_pruned));
    report.detail(format!("ledger={}", describe_ledger(&result.ledger)));
    for err in &result.errors {
        report.issue(format!("error path={} message={}", err.path.display(), err.message));
    }
    if result.interrupted {
        report.issue("sweep interrupted; remaining files left on cache");
    }
    report.attach(result);
    report
}

/// Loads configuration once and runs (or previews) one selection.
pub fn run_selection(
    command: &str,
    selection: Selection,
    dry_run: bool,
    interrupt: Interrupt,
) -> Result<CommandReport> {
    let cfg = load_config()?;
    let paths = resolve_paths()?;
    run_selection_with(&cfg, &paths, command, selection, dry_run, interrupt)
}

pub fn run_selection_with(
    cfg: &TierConfig,
    paths: &TierPaths,
    command: &str,
    selection: Selection,
    dry_run: bool,
    interrupt: Interrupt,
) -> Result<CommandReport> {
    let transfer = transfer_for(cfg).context("failed to set up file transfer")?;
    let engine = MigrationEngine::new(cfg, paths, transfer, interrupt);

    if dry_run {
        let plan = engine.plan(selection)?;
        return Ok(plan_report(command, &plan));
    }
    let result = match selection {
        Selection::Policy(policy) => engine.run_sweep(policy)?,
        other => engine.run(other)?,
    };
    Ok(sweep_report(command, &result))
}

pub fn run(policy: MigrationPolicy, dry_run: bool, interrupt: Interrupt) -> Result<CommandReport> {
    let command = match policy {
        MigrationPolicy::AllFiles => "retire-all",
        MigrationPolicy::LedgeredOnly => "retire-tracked",
        MigrationPolicy::NonLedgeredOnly => "retire-other",
    };
    run_selection(command, Selection::Policy(policy), dry_run, interrupt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_report_flags_errors_and_interrupt() {
        let result = MigrationResult {
            selection: "ledgered-only".to_string(),
            files_moved: 1,
            total_bytes: 524_288_000,
            errors: vec![FileError {
                path: PathBuf::from("/mnt/cache/b.mkv"),
                message: "rsync exited 23".to_string(),
            }],
            interrupted: true,
            ledger: LedgerOutcome::Retained {
                reason: "interrupted".to_string(),
            },
            ..MigrationResult::default()
        };
        let report = sweep_report("retire-tracked", &result);
        assert!(!report.ok);
        assert!(report.details.contains(&"total_bytes=524288000 (500.00 MiB)".to_string()));
        assert!(report.details.contains(&"ledger=retained (interrupted)".to_string()));
        assert!(report.details.contains(&"files_resolved=1".to_string()));
        assert_eq!(report.issues.len(), 2);
        let data = report.data.expect("data");
        assert_eq!(data["files_moved"], 1);
        assert_eq!(data["ledger"]["action"], "retained");
    }

    #[test]
    fn clean_sweep_report_is_ok() {
        let result = MigrationResult {
            selection: "all-files".to_string(),
            ledger: LedgerOutcome::Cleared,
            ..MigrationResult::default()
        };
        let report = sweep_report("retire-all", &result);
        assert!(report.ok);
        assert_eq!(report.data.expect("data")["ledger"]["action"], "cleared");
    }
}
