//! One sweep: enumerate the cache tree, select candidates, resolve each file,
//! prune emptied directories deepest-first, then settle the ledger.
//!
//! Enumeration and mutation are separate passes. The cache root is checked
//! before the lock is taken, so a misconfigured root never mutates anything.

use crate::error::{TierError, TierErrorCode};
use crate::tier::audit;
use crate::tier::config::TierConfig;
use crate::tier::interrupt::Interrupt;
use crate::tier::ledger::{LedgerSnapshot, LedgerStore};
use crate::tier::lock::SweepLock;
use crate::tier::paths::TierPaths;
use crate::tier::policy::{self, LedgerPlan, MigrationCandidate, MigrationPolicy, Selection};
use crate::tier::resolver::{self, Resolution, TierLayout};
use crate::tier::transfer::TierTransfer;
use crate::tier::warn::{self, WarnEvent};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileError {
    pub path: PathBuf,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LedgerOutcome {
    #[default]
    Untouched,
    Cleared,
    Pruned {
        removed: usize,
    },
    Retained {
        reason: String,
    },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationResult {
    pub selection: String,
    pub files_deleted: u64,
    pub files_moved: u64,
    pub files_skipped: u64,
    pub files_missing: u64,
    pub total_bytes: u64,
    pub dirs_pruned: u64,
    pub errors: Vec<FileError>,
    pub interrupted: bool,
    pub ledger: LedgerOutcome,
}

impl MigrationResult {
    pub fn files_resolved(&self) -> u64 {
        self.files_deleted + self.files_moved
    }
}

#[derive(Debug, Clone)]
pub struct SweepPlan {
    pub selection: Selection,
    pub candidates: Vec<MigrationCandidate>,
    pub skipped: u64,
    pub missing: Vec<PathBuf>,
    pub scan_errors: Vec<FileError>,
    pub ledger_plan: LedgerPlan,
}

impl SweepPlan {
    pub fn candidate_bytes(&self) -> u64 {
        self.candidates.iter().map(|c| c.size_bytes).sum()
    }
}

fn ensure_cache_root(cache_root: &Path) -> Result<(), TierError> {
    if cache_root.is_dir() {
        Ok(())
    } else {
        Err(TierError::CacheRootMissing(cache_root.to_path_buf()))
    }
}

fn is_skipped(entry: &walkdir::DirEntry, skip: &[PathBuf]) -> bool {
    entry.depth() > 0 && skip.iter().any(|path| entry.path() == path)
}

/// Every regular file under `cache_root`; symlinks are not followed. Entries
/// in `skip`, and everything below a skipped directory, are never listed.
pub fn enumerate(cache_root: &Path, skip: &[PathBuf]) -> (Vec<MigrationCandidate>, Vec<FileError>) {
    let mut files = Vec::new();
    let mut errors = Vec::new();
    let walk = WalkDir::new(cache_root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_skipped(entry, skip));
    for entry in walk {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                errors.push(FileError {
                    path: err.path().unwrap_or(cache_root).to_path_buf(),
                    message: format!("scan failed: {err}"),
                });
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        match entry.metadata() {
            Ok(meta) => files.push(MigrationCandidate {
                source_path: entry.into_path(),
                size_bytes: meta.len(),
            }),
            Err(err) => errors.push(FileError {
                path: entry.into_path(),
                message: format!("scan failed: {err}"),
            }),
        }
    }
    (files, errors)
}

/// Removes directories left empty, deepest first. The root and protected
/// directories stay, and nothing below a `skip` entry is visited. Returns how
/// many were removed.
pub fn prune_empty_dirs(cache_root: &Path, protected: &[PathBuf], skip: &[PathBuf]) -> u64 {
    let dirs = WalkDir::new(cache_root)
        .min_depth(1)
        .follow_links(false)
        .contents_first(true)
        .into_iter()
        .filter_entry(|entry| !is_skipped(entry, skip))
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_dir())
        .map(|entry| entry.into_path())
        .collect::<Vec<_>>();

    let mut pruned = 0u64;
    for dir in dirs {
        if protected.iter().any(|p| p == &dir) || skip.iter().any(|p| p == &dir) {
            continue;
        }
        match fs::remove_dir(&dir) {
            Ok(()) => pruned += 1,
            Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty || err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                let path = dir.to_string_lossy();
                warn::emit(WarnEvent {
                    code: TierErrorCode::E007Io,
                    stage: "prune",
                    action: "keep-dir",
                    path: &path,
                    reason: "remove_dir failed",
                    err: &err.to_string(),
                });
            }
        }
    }
    pruned
}

pub struct MigrationEngine<'a> {
    cfg: &'a TierConfig,
    layout: TierLayout,
    ledger: LedgerStore,
    lock_dir: PathBuf,
    logs_dir: PathBuf,
    state_paths: Vec<PathBuf>,
    transfer: Box<dyn TierTransfer>,
    interrupt: Interrupt,
}

/// Files and directories this tool owns. A sweep never moves or prunes them,
/// even when they live under the cache root.
fn state_paths(paths: &TierPaths, ledger: &LedgerStore) -> Vec<PathBuf> {
    vec![
        paths.tier_home.clone(),
        paths.ledger_file.clone(),
        ledger.lock_path(),
        paths.lock_dir.clone(),
        paths.logs_dir.clone(),
        paths.pid_file.clone(),
    ]
}

impl<'a> MigrationEngine<'a> {
    pub fn new(
        cfg: &'a TierConfig,
        paths: &TierPaths,
        transfer: Box<dyn TierTransfer>,
        interrupt: Interrupt,
    ) -> Self {
        let ledger = LedgerStore::new(&paths.ledger_file);
        Self {
            cfg,
            layout: TierLayout::from_config(cfg),
            state_paths: state_paths(paths, &ledger),
            ledger,
            lock_dir: paths.lock_dir.clone(),
            logs_dir: paths.logs_dir.clone(),
            transfer,
            interrupt,
        }
    }

    pub fn ledger_snapshot(&self) -> Result<LedgerSnapshot, TierError> {
        self.ledger.load()
    }

    fn plan_with(&self, selection: Selection, ledger: &LedgerSnapshot) -> SweepPlan {
        let (files, scan_errors) = enumerate(&self.layout.cache_root, &self.state_paths);
        let selected = policy::select(&selection, files, ledger, self.cfg);
        SweepPlan {
            selection,
            candidates: selected.accepted,
            skipped: selected.skipped,
            missing: selected.missing,
            scan_errors,
            ledger_plan: policy::ledger_plan(&selection, self.cfg.sweep.ledger_clear),
        }
    }

    /// Read-only preview of what `run` would act on.
    pub fn plan(&self, selection: Selection) -> Result<SweepPlan, TierError> {
        ensure_cache_root(&self.layout.cache_root)?;
        let ledger = self.ledger_snapshot()?;
        Ok(self.plan_with(selection, &ledger))
    }

    pub fn run_sweep(&self, policy: MigrationPolicy) -> Result<MigrationResult, TierError> {
        self.run(Selection::Policy(policy))
    }

    pub fn run(&self, selection: Selection) -> Result<MigrationResult, TierError> {
        ensure_cache_root(&self.layout.cache_root)?;
        let lock = SweepLock::acquire(&self.lock_dir, &self.layout.cache_root)?;
        let ledger = self.ledger_snapshot()?;
        let plan = self.plan_with(selection, &ledger);

        audit::record(
            &self.logs_dir,
            "sweep",
            "started",
            &format!(
                "selection={} transfer={} candidates={} cache_root={} lock={}",
                selection.label(),
                self.transfer.name(),
                plan.candidates.len(),
                self.layout.cache_root.display(),
                lock.path().display()
            ),
        );

        let mut result = MigrationResult {
            selection: selection.label().to_string(),
            files_skipped: plan.skipped,
            files_missing: plan.missing.len() as u64,
            errors: plan.scan_errors.clone(),
            ..MigrationResult::default()
        };
        let mut resolved = BTreeSet::new();

        for candidate in &plan.candidates {
            if self.interrupt.is_set() {
                result.interrupted = true;
                let path = candidate.source_path.to_string_lossy();
                warn::emit(WarnEvent {
                    code: TierErrorCode::E006Interrupted,
                    stage: "sweep",
                    action: "stop",
                    path: &path,
                    reason: "interrupt received before this file",
                    err: "-",
                });
                break;
            }
            let path = &candidate.source_path;
            match resolver::resolve(&self.layout, self.transfer.as_ref(), path) {
                Ok(Resolution::DuplicateDeleted { bytes }) => {
                    audit::record(
                        &self.logs_dir,
                        "resolve",
                        "duplicate-deleted",
                        &format!("path={}", path.display()),
                    );
                    result.files_deleted += 1;
                    result.total_bytes += bytes;
                    resolved.insert(path.clone());
                }
                Ok(Resolution::Transferred { bytes, destination }) => {
                    audit::record(
                        &self.logs_dir,
                        "resolve",
                        "moved",
                        &format!("path={} destination={}", path.display(), destination.display()),
                    );
                    result.files_moved += 1;
                    result.total_bytes += bytes;
                    resolved.insert(path.clone());
                }
                Ok(Resolution::Absent) => {
                    self.record_error(&mut result, path, "disappeared before its size could be read");
                }
                Err(err) => {
                    let message = match err {
                        TierError::FileResolution { message, .. } => message,
                        other => other.to_string(),
                    };
                    self.record_error(&mut result, path, &message);
                }
            }
        }

        if !result.interrupted {
            result.dirs_pruned = prune_empty_dirs(
                &self.layout.cache_root,
                &self.cfg.protected_dirs(),
                &self.state_paths,
            );
        }

        result.ledger = self.settle_ledger(&ledger, &plan, &resolved, &mut result);

        audit::record(
            &self.logs_dir,
            "sweep",
            if result.errors.is_empty() && !result.interrupted {
                "completed"
            } else {
                "completed-with-issues"
            },
            &format!(
                "selection={} moved={} deleted={} skipped={} missing={} bytes={} errors={} interrupted={} dirs_pruned={}",
                result.selection,
                result.files_moved,
                result.files_deleted,
                result.files_skipped,
                result.files_missing,
                result.total_bytes,
                result.errors.len(),
                result.interrupted,
                result.dirs_pruned,
            ),
        );
        Ok(result)
    }

    fn record_error(&self, result: &mut MigrationResult, path: &Path, message: &str) {
        let display = path.to_string_lossy();
        warn::emit(WarnEvent {
            code: TierErrorCode::E005TransferFailed,
            stage: "sweep",
            action: "leave-in-place",
            path: &display,
            reason: "resolution failed",
            err: message,
        });
        audit::record(
            &self.logs_dir,
            "resolve",
            "error",
            &format!("path={} message={}", display, message),
        );
        result.errors.push(FileError {
            path: path.to_path_buf(),
            message: message.to_string(),
        });
    }

    fn settle_ledger(
        &self,
        snapshot: &LedgerSnapshot,
        plan: &SweepPlan,
        resolved: &BTreeSet<PathBuf>,
        result: &mut MigrationResult,
    ) -> LedgerOutcome {
        let outcome = match plan.ledger_plan {
            LedgerPlan::Keep => return LedgerOutcome::Untouched,
            LedgerPlan::ClearOnSuccess if result.interrupted => {
                return LedgerOutcome::Retained {
                    reason: "interrupted".to_string(),
                };
            }
            LedgerPlan::ClearOnSuccess if !result.errors.is_empty() => {
                return LedgerOutcome::Retained {
                    reason: format!("{} file errors", result.errors.len()),
                };
            }
            // Entries appended after the snapshot belong to the next sweep.
            LedgerPlan::ClearOnSuccess => self
                .ledger
                .remove(&snapshot.paths())
                .map(|_| LedgerOutcome::Cleared),
            LedgerPlan::PruneResolved => {
                let mut remove = resolved.clone();
                if !result.interrupted {
                    remove.extend(plan.missing.iter().cloned());
                }
                self.ledger
                    .remove(&remove)
                    .map(|removed| LedgerOutcome::Pruned { removed })
            }
        };

        match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                let message = err.to_string();
                result.errors.push(FileError {
                    path: self.ledger.path().to_path_buf(),
                    message: message.clone(),
                });
                LedgerOutcome::Retained { reason: message }
            }
        }
    }
}
