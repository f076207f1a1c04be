use crate::error::TierError;
use fs2::FileExt;
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Exclusive claim on one cache root for the lifetime of a sweep.
#[derive(Debug)]
pub struct SweepLock {
    file: File,
    path: PathBuf,
}

pub fn lock_path_for(lock_dir: &Path, cache_root: &Path) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(cache_root.to_string_lossy().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    lock_dir.join(format!("sweep-{}.lock", &digest[..16]))
}

fn read_holder(file: &mut File) -> Option<u32> {
    let mut raw = String::new();
    file.seek(SeekFrom::Start(0)).ok()?;
    file.read_to_string(&mut raw).ok()?;
    raw.lines().next()?.trim().parse::<u32>().ok()
}

impl SweepLock {
    pub fn acquire(lock_dir: &Path, cache_root: &Path) -> Result<Self, TierError> {
        fs::create_dir_all(lock_dir)
            .map_err(|err| TierError::io(format!("failed to create {}", lock_dir.display()), err))?;
        let path = lock_path_for(lock_dir, cache_root);
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|err| TierError::io(format!("failed to open {}", path.display()), err))?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(err) if err.kind() == fs2::lock_contended_error().kind() => {
                return Err(TierError::Locked {
                    holder: read_holder(&mut file),
                    lock: path,
                });
            }
            Err(err) => {
                return Err(TierError::io(format!("failed to lock {}", path.display()), err));
            }
        }

        file.set_len(0)
            .and_then(|_| file.seek(SeekFrom::Start(0)).map(|_| ()))
            .and_then(|_| writeln!(file, "{}\n{}", std::process::id(), cache_root.display()))
            .map_err(|err| TierError::io(format!("failed to record holder in {}", path.display()), err))?;

        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SweepLock {
    fn drop(&mut self) {
        let _ = self.file.set_len(0);
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn lock_path_is_stable_per_cache_root() {
        let dir = Path::new("/var/lock/cache-tier");
        let a = lock_path_for(dir, Path::new("/mnt/cache"));
        assert_eq!(a, lock_path_for(dir, Path::new("/mnt/cache")));
        assert_ne!(a, lock_path_for(dir, Path::new("/mnt/fast")));
        let name = a.file_name().and_then(|n| n.to_str()).expect("name");
        assert!(name.starts_with("sweep-") && name.ends_with(".lock"));
    }

    #[test]
    fn second_sweep_on_same_root_is_refused() {
        let tmp = tempdir().expect("tempdir");
        let root = tmp.path().join("cache");
        let first = SweepLock::acquire(tmp.path(), &root).expect("first lock");

        match SweepLock::acquire(tmp.path(), &root) {
            Err(TierError::Locked { holder, lock }) => {
                assert_eq!(holder, Some(std::process::id()));
                assert_eq!(lock, first.path());
            }
            other => panic!("expected Locked, got {other:?}"),
        }

        drop(first);
        SweepLock::acquire(tmp.path(), &root).expect("lock after release");
    }

    #[test]
    fn different_roots_lock_independently() {
        let tmp = tempdir().expect("tempdir");
        let _a = SweepLock::acquire(tmp.path(), Path::new("/mnt/cache")).expect("a");
        let _b = SweepLock::acquire(tmp.path(), Path::new("/mnt/fast")).expect("b");
    }
}
