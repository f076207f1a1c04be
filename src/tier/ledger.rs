//! Durable record of the files placed on the cache tier by the copy-in daemon.
//!
//! On disk the ledger is UTF-8 text, one `path|timestamp` entry per line, no
//! header. Blank lines are ignored, a line without `|` is a path with no
//! timestamp, and a line whose timestamp does not parse is rejected without
//! failing the load. The last occurrence of a path wins.

use crate::error::{TierError, TierErrorCode};
use crate::tier::warn::{self, WarnEvent};
use fs2::FileExt;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const DELIMITER: char = '|';

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub path: PathBuf,
    /// Unix seconds, fractional allowed. `None` for legacy path-only lines.
    pub cached_at: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedLine {
    pub line_no: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot {
    entries: BTreeMap<PathBuf, LedgerEntry>,
    rejected: Vec<RejectedLine>,
}

impl LedgerSnapshot {
    #[cfg(test)]
    pub fn from_entries(entries: impl IntoIterator<Item = LedgerEntry>) -> Self {
        let mut out = Self::default();
        for entry in entries {
            out.entries.insert(entry.path.clone(), entry);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    #[cfg(test)]
    pub fn get(&self, path: &Path) -> Option<&LedgerEntry> {
        self.entries.get(path)
    }

    /// Entries ordered by path.
    pub fn entries(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.values()
    }

    pub fn paths(&self) -> BTreeSet<PathBuf> {
        self.entries.keys().cloned().collect()
    }

    pub fn rejected(&self) -> &[RejectedLine] {
        &self.rejected
    }
}

fn parse_timestamp(raw: &str) -> Result<f64, String> {
    let value = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("timestamp `{}` is not a number", raw.trim()))?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("timestamp `{}` is out of range", raw.trim()));
    }
    Ok(value)
}

pub fn parse_ledger(raw: &str) -> LedgerSnapshot {
    let mut snapshot = LedgerSnapshot::default();
    for (idx, line) in raw.lines().enumerate() {
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }

        let (path, cached_at) = match line.rsplit_once(DELIMITER) {
            Some((path, ts)) => match parse_timestamp(ts) {
                Ok(ts) => (path.trim(), Some(ts)),
                Err(reason) => {
                    snapshot.rejected.push(RejectedLine { line_no, reason });
                    continue;
                }
            },
            None => (line.trim(), None),
        };

        if path.is_empty() {
            snapshot.rejected.push(RejectedLine {
                line_no,
                reason: "empty path".to_string(),
            });
            continue;
        }

        let path = PathBuf::from(path);
        snapshot
            .entries
            .insert(path.clone(), LedgerEntry { path, cached_at });
    }
    snapshot
}

pub fn render_ledger<'a>(entries: impl IntoIterator<Item = &'a LedgerEntry>) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&render_line(entry));
    }
    out
}

fn render_line(entry: &LedgerEntry) -> String {
    match entry.cached_at {
        Some(ts) => format!("{}{DELIMITER}{ts}\n", entry.path.to_string_lossy()),
        None => format!("{}\n", entry.path.to_string_lossy()),
    }
}

/// Held for the duration of a read-modify-write; released on drop.
pub struct LedgerLock {
    file: File,
}

impl Drop for LedgerLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    fn ensure_parent(&self) -> Result<(), TierError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                TierError::io(format!("failed to create {}", parent.display()), err)
            })?;
        }
        Ok(())
    }

    pub fn lock(&self) -> Result<LedgerLock, TierError> {
        self.ensure_parent()?;
        let lock_path = self.lock_path();
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|err| TierError::io(format!("failed to open {}", lock_path.display()), err))?;
        file.lock_exclusive()
            .map_err(|err| TierError::io(format!("failed to lock {}", lock_path.display()), err))?;
        Ok(LedgerLock { file })
    }

    fn read_raw(&self) -> Result<Option<String>, TierError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(TierError::io(
                format!("failed to read {}", self.path.display()),
                err,
            )),
        }
    }

    /// A missing ledger file is an empty ledger.
    pub fn load(&self) -> Result<LedgerSnapshot, TierError> {
        let Some(raw) = self.read_raw()? else {
            return Ok(LedgerSnapshot::default());
        };
        let snapshot = parse_ledger(&raw);
        let path = self.path.to_string_lossy();
        for rejected in snapshot.rejected() {
            let line = format!("line {}", rejected.line_no);
            warn::emit(WarnEvent {
                code: TierErrorCode::E004LedgerCorrupt,
                stage: "ledger",
                action: "skip-line",
                path: &path,
                reason: &line,
                err: &rejected.reason,
            });
        }
        Ok(snapshot)
    }

    fn write_atomic(&self, contents: &str) -> Result<(), TierError> {
        self.ensure_parent()?;
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|err| TierError::io(format!("failed to stage ledger in {}", dir.display()), err))?;
        tmp.write_all(contents.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|err| TierError::io("failed to write staged ledger", err))?;
        tmp.persist(&self.path).map_err(|err| {
            TierError::io(format!("failed to replace {}", self.path.display()), err.error)
        })?;
        Ok(())
    }

    /// Empties the ledger in one rename.
    pub fn clear(&self) -> Result<(), TierError> {
        let _guard = self.lock()?;
        self.write_atomic("")
    }

    /// Adds `path` unless it is already tracked. Returns whether a line was written.
    pub fn append(&self, path: &Path, cached_at: Option<f64>) -> Result<bool, TierError> {
        let _guard = self.lock()?;
        let raw = self.read_raw()?.unwrap_or_default();
        if parse_ledger(&raw).contains(path) {
            return Ok(false);
        }

        let mut line = render_line(&LedgerEntry {
            path: path.to_path_buf(),
            cached_at,
        });
        if !raw.is_empty() && !raw.ends_with('\n') {
            line.insert(0, '\n');
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|err| TierError::io(format!("failed to open {}", self.path.display()), err))?;
        file.write_all(line.as_bytes())
            .map_err(|err| TierError::io(format!("failed to append {}", self.path.display()), err))?;
        Ok(true)
    }

    /// Removes the given paths; rewrites the ledger sorted and deduplicated.
    pub fn remove(&self, paths: &BTreeSet<PathBuf>) -> Result<usize, TierError> {
        if paths.is_empty() {
            return Ok(0);
        }
        let _guard = self.lock()?;
        let Some(raw) = self.read_raw()? else {
            return Ok(0);
        };
        let existing = parse_ledger(&raw);
        let kept = existing
            .entries()
            .filter(|entry| !paths.contains(&entry.path))
            .collect::<Vec<_>>();
        let removed = existing.len().saturating_sub(kept.len());
        if removed == 0 {
            return Ok(0);
        }
        self.write_atomic(&render_ledger(kept))?;
        Ok(removed)
    }
}
