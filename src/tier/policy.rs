use crate::tier::config::{LedgerClearMode, TierConfig};
use crate::tier::ledger::LedgerSnapshot;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MigrationPolicy {
    AllFiles,
    LedgeredOnly,
    NonLedgeredOnly,
}

impl MigrationPolicy {
    pub fn label(self) -> &'static str {
        match self {
            Self::AllFiles => "all-files",
            Self::LedgeredOnly => "ledgered-only",
            Self::NonLedgeredOnly => "non-ledgered-only",
        }
    }
}

/// What a sweep acts on: one of the three policies, or one of the narrower
/// maintenance selections that reuse the same resolver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Selection {
    Policy(MigrationPolicy),
    /// Files whose extension is in the configured media set.
    MediaOnly,
    /// Ledgered files cached strictly before `cutoff` (Unix seconds).
    AgedBefore { cutoff: f64 },
}

impl Selection {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Policy(policy) => policy.label(),
            Self::MediaOnly => "media-only",
            Self::AgedBefore { .. } => "aged",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationCandidate {
    pub source_path: PathBuf,
    pub size_bytes: u64,
}

/// What happens to the ledger once the files are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LedgerPlan {
    Keep,
    /// Empty the ledger only if nothing errored and nothing interrupted.
    ClearOnSuccess,
    /// Remove resolved and missing entries, keep the rest.
    PruneResolved,
}

#[derive(Debug, Clone, Default)]
pub struct Selected {
    pub accepted: Vec<MigrationCandidate>,
    /// Ledgered files deliberately left alone.
    pub skipped: u64,
    /// Ledgered paths that are not on disk under the cache root.
    pub missing: Vec<PathBuf>,
}

pub fn ledger_plan(selection: &Selection, clear_mode: LedgerClearMode) -> LedgerPlan {
    match selection {
        Selection::Policy(MigrationPolicy::NonLedgeredOnly) => LedgerPlan::Keep,
        Selection::Policy(MigrationPolicy::AllFiles | MigrationPolicy::LedgeredOnly) => {
            match clear_mode {
                LedgerClearMode::OnSuccess => LedgerPlan::ClearOnSuccess,
                LedgerClearMode::PruneResolved => LedgerPlan::PruneResolved,
            }
        }
        Selection::MediaOnly | Selection::AgedBefore { .. } => LedgerPlan::PruneResolved,
    }
}

fn missing_from(ledgered: impl Iterator<Item = PathBuf>, on_disk: &BTreeSet<&PathBuf>) -> Vec<PathBuf> {
    ledgered.filter(|path| !on_disk.contains(path)).collect()
}

/// Filters the enumerated cache files against the ledger snapshot.
pub fn select(
    selection: &Selection,
    files: Vec<MigrationCandidate>,
    ledger: &LedgerSnapshot,
    cfg: &TierConfig,
) -> Selected {
    let mut out = Selected::default();
    let on_disk = files.iter().map(|f| &f.source_path).collect::<BTreeSet<_>>();

    match selection {
        Selection::Policy(MigrationPolicy::AllFiles) => {
            out.missing = missing_from(ledger.paths().into_iter(), &on_disk);
            out.accepted = files;
        }
        Selection::Policy(MigrationPolicy::LedgeredOnly) => {
            out.missing = missing_from(ledger.paths().into_iter(), &on_disk);
            out.accepted = files
                .into_iter()
                .filter(|f| ledger.contains(&f.source_path))
                .collect();
        }
        Selection::Policy(MigrationPolicy::NonLedgeredOnly) => {
            for file in files {
                if ledger.contains(&file.source_path) {
                    out.skipped += 1;
                } else {
                    out.accepted.push(file);
                }
            }
        }
        Selection::MediaOnly => {
            out.accepted = files
                .into_iter()
                .filter(|f| cfg.is_media_file(&f.source_path))
                .collect();
        }
        Selection::AgedBefore { cutoff } => {
            let aged = ledger
                .entries()
                .filter(|entry| matches!(entry.cached_at, Some(ts) if ts < *cutoff))
                .map(|entry| entry.path.clone())
                .collect::<BTreeSet<_>>();
            out.missing = missing_from(aged.iter().cloned(), &on_disk);
            out.accepted = files
                .into_iter()
                .filter(|f| aged.contains(&f.source_path))
                .collect();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier::ledger::LedgerEntry;

    fn file(path: &str, size: u64) -> MigrationCandidate {
        MigrationCandidate {
            source_path: PathBuf::from(path),
            size_bytes: size,
        }
    }

    fn ledger(entries: &[(&str, Option<f64>)]) -> LedgerSnapshot {
        LedgerSnapshot::from_entries(entries.iter().map(|(p, ts)| LedgerEntry {
            path: PathBuf::from(p),
            cached_at: *ts,
        }))
    }

    fn cfg() -> TierConfig {
        TierConfig::for_roots("/mnt/cache", "/mnt/user0")
    }

    fn disk() -> Vec<MigrationCandidate> {
        vec![
            file("/mnt/cache/Movies/A.mkv", 10),
            file("/mnt/cache/Movies/A.srt", 1),
            file("/mnt/cache/TV/S01E01.mkv", 20),
        ]
    }

    fn paths(selected: &Selected) -> Vec<&str> {
        selected
            .accepted
            .iter()
            .map(|c| c.source_path.to_str().expect("utf8"))
            .collect()
    }

    #[test]
    fn all_files_accepts_everything_and_reports_missing_entries() {
        let snap = ledger(&[("/mnt/cache/Movies/A.mkv", Some(1.0)), ("/mnt/cache/gone.mkv", Some(1.0))]);
        let selected = select(&Selection::Policy(MigrationPolicy::AllFiles), disk(), &snap, &cfg());
        assert_eq!(selected.accepted.len(), 3);
        assert_eq!(selected.missing, vec![PathBuf::from("/mnt/cache/gone.mkv")]);
        assert_eq!(selected.skipped, 0);
    }

    #[test]
    fn ledgered_only_touches_only_ledger_paths() {
        let snap = ledger(&[("/mnt/cache/Movies/A.mkv", Some(1.0)), ("/mnt/cache/gone.mkv", None)]);
        let selected = select(&Selection::Policy(MigrationPolicy::LedgeredOnly), disk(), &snap, &cfg());
        assert_eq!(paths(&selected), vec!["/mnt/cache/Movies/A.mkv"]);
        assert_eq!(selected.skipped, 0);
        assert_eq!(selected.missing, vec![PathBuf::from("/mnt/cache/gone.mkv")]);
    }

    #[test]
    fn non_ledgered_only_skips_ledger_paths() {
        let snap = ledger(&[("/mnt/cache/Movies/A.mkv", Some(1.0)), ("/mnt/cache/gone.mkv", None)]);
        let selected = select(&Selection::Policy(MigrationPolicy::NonLedgeredOnly), disk(), &snap, &cfg());
        assert_eq!(paths(&selected), vec!["/mnt/cache/Movies/A.srt", "/mnt/cache/TV/S01E01.mkv"]);
        assert_eq!(selected.skipped, 1);
        assert!(selected.missing.is_empty());
    }

    #[test]
    fn media_only_filters_by_extension() {
        let selected = select(&Selection::MediaOnly, disk(), &LedgerSnapshot::default(), &cfg());
        assert_eq!(paths(&selected), vec!["/mnt/cache/Movies/A.mkv", "/mnt/cache/TV/S01E01.mkv"]);
    }

    #[test]
    fn aged_selects_old_timestamps_and_ignores_untimed_entries() {
        let snap = ledger(&[
            ("/mnt/cache/Movies/A.mkv", Some(100.0)),
            ("/mnt/cache/TV/S01E01.mkv", Some(900.0)),
            ("/mnt/cache/Movies/A.srt", None),
            ("/mnt/cache/old-gone.mkv", Some(50.0)),
        ]);
        let selected = select(&Selection::AgedBefore { cutoff: 500.0 }, disk(), &snap, &cfg());
        assert_eq!(paths(&selected), vec!["/mnt/cache/Movies/A.mkv"]);
        assert_eq!(selected.missing, vec![PathBuf::from("/mnt/cache/old-gone.mkv")]);
    }

    #[test]
    fn ledger_plan_follows_clear_mode_for_full_ledger_policies() {
        let all = Selection::Policy(MigrationPolicy::AllFiles);
        assert_eq!(ledger_plan(&all, LedgerClearMode::OnSuccess), LedgerPlan::ClearOnSuccess);
        assert_eq!(ledger_plan(&all, LedgerClearMode::PruneResolved), LedgerPlan::PruneResolved);
        assert_eq!(
            ledger_plan(&Selection::Policy(MigrationPolicy::NonLedgeredOnly), LedgerClearMode::PruneResolved),
            LedgerPlan::Keep
        );
        assert_eq!(ledger_plan(&Selection::MediaOnly, LedgerClearMode::OnSuccess), LedgerPlan::PruneResolved);
    }
}
