use crate::error::TierError;
use crate::tier::config::TierConfig;
use crate::tier::transfer::TierTransfer;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Maps cache-root-relative paths onto the array root.
#[derive(Debug, Clone)]
pub struct TierLayout {
    pub cache_root: PathBuf,
    pub array_root: PathBuf,
}

impl TierLayout {
    pub fn from_config(cfg: &TierConfig) -> Self {
        Self {
            cache_root: cfg.tiers.cache_root.clone(),
            array_root: cfg.tiers.array_root.clone(),
        }
    }

    pub fn array_path_for(&self, cache_path: &Path) -> Option<PathBuf> {
        let relative = cache_path.strip_prefix(&self.cache_root).ok()?;
        if relative.as_os_str().is_empty() {
            return None;
        }
        Some(self.array_root.join(relative))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The array already had the file; the cache copy was deleted.
    DuplicateDeleted { bytes: u64 },
    Transferred { bytes: u64, destination: PathBuf },
    /// Nothing at `source`; resolving an already-resolved path lands here.
    Absent,
}

fn destination_is_file(dst: &Path) -> Result<bool, TierError> {
    match fs::metadata(dst) {
        Ok(meta) if meta.is_file() => Ok(true),
        Ok(_) => Err(TierError::resolution(
            dst,
            "array destination exists but is not a regular file",
        )),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(TierError::resolution(dst, format!("cannot stat destination: {err}"))),
    }
}

/// Deletes `source` when the array already holds the mapped path, otherwise
/// transfers it there. A failed transfer leaves `source` untouched and never
/// leaves a partial destination behind that a later run would take for a
/// duplicate.
pub fn resolve(
    layout: &TierLayout,
    transfer: &dyn TierTransfer,
    source: &Path,
) -> Result<Resolution, TierError> {
    let meta = match fs::symlink_metadata(source) {
        Ok(meta) => meta,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Resolution::Absent),
        Err(err) => return Err(TierError::resolution(source, format!("cannot stat: {err}"))),
    };
    if !meta.is_file() {
        return Err(TierError::resolution(source, "not a regular file"));
    }
    let bytes = meta.len();

    let Some(destination) = layout.array_path_for(source) else {
        return Err(TierError::resolution(
            source,
            format!("outside cache root {}", layout.cache_root.display()),
        ));
    };

    if destination_is_file(&destination)? {
        fs::remove_file(source)
            .map_err(|err| TierError::resolution(source, format!("duplicate delete failed: {err}")))?;
        return Ok(Resolution::DuplicateDeleted { bytes });
    }

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|err| {
            TierError::resolution(source, format!("cannot create {}: {err}", parent.display()))
        })?;
    }

    if let Err(err) = transfer.transfer(source, &destination) {
        if source.exists() {
            match fs::remove_file(&destination) {
                Ok(()) => {}
                Err(rm_err) if rm_err.kind() == ErrorKind::NotFound => {}
                Err(rm_err) => {
                    return Err(TierError::resolution(
                        source,
                        format!(
                            "{} transfer failed: {err}; partial {} left behind: {rm_err}",
                            transfer.name(),
                            destination.display()
                        ),
                    ));
                }
            }
        }
        return Err(TierError::resolution(
            source,
            format!("{} transfer failed: {err}", transfer.name()),
        ));
    }

    if !destination.is_file() {
        return Err(TierError::resolution(
            source,
            format!("destination {} missing after transfer", destination.display()),
        ));
    }
    if source.exists() {
        return Err(TierError::resolution(source, "source still present after transfer"));
    }

    Ok(Resolution::Transferred { bytes, destination })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier::transfer::{NativeTransfer, TransferError};
    use tempfile::{TempDir, tempdir};

    struct Tiers {
        _tmp: TempDir,
        layout: TierLayout,
    }

    fn tiers() -> Tiers {
        let tmp = tempdir().expect("tempdir");
        let layout = TierLayout {
            cache_root: tmp.path().join("cache"),
            array_root: tmp.path().join("user0"),
        };
        fs::create_dir_all(&layout.cache_root).expect("cache");
        fs::create_dir_all(&layout.array_root).expect("array");
        Tiers { _tmp: tmp, layout }
    }

    fn seed(path: &Path, bytes: &[u8]) {
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, bytes).expect("write");
    }

    /// Writes half the file, then reports failure.
    struct PartialThenFail;

    impl TierTransfer for PartialThenFail {
        fn name(&self) -> &'static str {
            "partial"
        }

        fn transfer(&self, src: &Path, dst: &Path) -> Result<(), TransferError> {
            let bytes = fs::read(src).expect("read src");
            fs::write(dst, &bytes[..bytes.len() / 2]).expect("write partial");
            Err(TransferError::CommandFailed {
                tool: "partial".to_string(),
                status: "exit status: 23".to_string(),
                stderr: "connection reset".to_string(),
            })
        }
    }

    #[test]
    fn layout_maps_relative_path_onto_array_root() {
        let layout = TierLayout {
            cache_root: PathBuf::from("/mnt/cache"),
            array_root: PathBuf::from("/mnt/user0"),
        };
        assert_eq!(
            layout.array_path_for(Path::new("/mnt/cache/Movies/A.mkv")),
            Some(PathBuf::from("/mnt/user0/Movies/A.mkv"))
        );
        assert_eq!(layout.array_path_for(Path::new("/mnt/cachex/A.mkv")), None);
        assert_eq!(layout.array_path_for(Path::new("/mnt/cache")), None);
    }

    #[test]
    fn existing_array_copy_means_duplicate_delete() {
        let t = tiers();
        let src = t.layout.cache_root.join("Movies/A.mkv");
        let dst = t.layout.array_root.join("Movies/A.mkv");
        seed(&src, b"cache copy");
        seed(&dst, b"array copy!");

        let out = resolve(&t.layout, &NativeTransfer::new(), &src).expect("resolve");
        assert_eq!(out, Resolution::DuplicateDeleted { bytes: 10 });
        assert!(!src.exists());
        assert_eq!(fs::read(&dst).expect("read"), b"array copy!");
    }

    #[test]
    fn missing_array_copy_means_transfer_with_parent_dirs() {
        let t = tiers();
        let src = t.layout.cache_root.join("TV/Show/Season 1/S01E01.mkv");
        seed(&src, b"episode");

        let out = resolve(&t.layout, &NativeTransfer::new(), &src).expect("resolve");
        let dst = t.layout.array_root.join("TV/Show/Season 1/S01E01.mkv");
        assert_eq!(
            out,
            Resolution::Transferred {
                bytes: 7,
                destination: dst.clone()
            }
        );
        assert!(!src.exists());
        assert_eq!(fs::read(&dst).expect("read"), b"episode");
    }

    #[test]
    fn failed_transfer_keeps_source_and_removes_partial_destination() {
        let t = tiers();
        let src = t.layout.cache_root.join("Movies/B.mkv");
        seed(&src, b"0123456789");

        let err = resolve(&t.layout, &PartialThenFail, &src).unwrap_err();
        assert!(matches!(err, TierError::FileResolution { .. }));
        assert!(err.to_string().contains("connection reset"));
        assert_eq!(fs::metadata(&src).expect("src").len(), 10);
        assert!(!t.layout.array_root.join("Movies/B.mkv").exists());
    }

    #[test]
    fn resolving_twice_is_a_no_op() {
        let t = tiers();
        let src = t.layout.cache_root.join("Movies/C.mkv");
        seed(&src, b"c");

        resolve(&t.layout, &NativeTransfer::new(), &src).expect("first");
        let again = resolve(&t.layout, &NativeTransfer::new(), &src).expect("second");
        assert_eq!(again, Resolution::Absent);
    }

    #[test]
    fn directory_at_destination_is_an_error_not_a_duplicate() {
        let t = tiers();
        let src = t.layout.cache_root.join("Movies/D.mkv");
        seed(&src, b"d");
        fs::create_dir_all(t.layout.array_root.join("Movies/D.mkv")).expect("dir");

        assert!(resolve(&t.layout, &NativeTransfer::new(), &src).is_err());
        assert!(src.exists());
    }

    #[test]
    fn path_outside_cache_root_is_refused() {
        let t = tiers();
        let stray = t.layout.array_root.join("stray.mkv");
        seed(&stray, b"x");
        assert!(resolve(&t.layout, &NativeTransfer::new(), &stray).is_err());
        assert!(stray.exists());
    }
}
