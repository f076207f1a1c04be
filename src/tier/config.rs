use crate::error::TierError;
use crate::tier::paths::tier_home;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierRoots {
    pub cache_root: PathBuf,
    /// Physical array disks, not the user-facing union mount.
    pub array_root: PathBuf,
}

impl Default for TierRoots {
    fn default() -> Self {
        Self {
            cache_root: PathBuf::from("/mnt/cache"),
            array_root: PathBuf::from("/mnt/user0"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    pub extensions: Vec<String>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            extensions: vec![".mkv".to_string(), ".mp4".to_string(), ".avi".to_string()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LedgerClearMode {
    /// Clear the whole ledger only when the sweep finished with zero errors.
    #[default]
    OnSuccess,
    /// Drop exactly the entries that were resolved; keep the ones that failed.
    PruneResolved,
}

impl LedgerClearMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OnSuccess => "on-success",
            Self::PruneResolved => "prune-resolved",
        }
    }
}

impl FromStr for LedgerClearMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "on-success" => Ok(Self::OnSuccess),
            "prune-resolved" => Ok(Self::PruneResolved),
            other => Err(format!(
                "unknown ledger clear mode `{other}`: use `on-success` or `prune-resolved`"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TransferMode {
    #[default]
    Auto,
    Rsync,
    Native,
}

impl TransferMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Rsync => "rsync",
            Self::Native => "native",
        }
    }
}

impl FromStr for TransferMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "auto" => Ok(Self::Auto),
            "rsync" => Ok(Self::Rsync),
            "native" => Ok(Self::Native),
            other => Err(format!(
                "unknown transfer mode `{other}`: use `auto`, `rsync` or `native`"
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub ledger_clear: LedgerClearMode,
    pub transfer: TransferMode,
    pub rsync_bin: Option<PathBuf>,
    pub transfer_timeout_secs: Option<u64>,
    pub protected_dirs: Vec<PathBuf>,
    pub max_cache_days: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            ledger_clear: LedgerClearMode::OnSuccess,
            transfer: TransferMode::Auto,
            rsync_bin: None,
            transfer_timeout_secs: None,
            protected_dirs: Vec::new(),
            max_cache_days: 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub command: Option<String>,
    pub settle_ms: u64,
    pub timeout_secs: Option<u64>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            command: None,
            settle_ms: 2_000,
            timeout_secs: Some(30),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TierConfig {
    pub tiers: TierRoots,
    pub media: MediaConfig,
    pub sweep: SweepConfig,
    pub service: ServiceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialTierConfig {
    tiers: Option<TierRoots>,
    media: Option<MediaConfig>,
    sweep: Option<SweepConfig>,
    service: Option<ServiceConfig>,
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_optional_u64(var: &str, fallback: Option<u64>) -> Option<u64> {
    match env::var(var) {
        Ok(v) if v.trim().is_empty() || v.trim() == "0" => None,
        Ok(v) => v.trim().parse::<u64>().ok().or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_path(var: &str, fallback: &Path) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback.to_path_buf(),
    }
}

fn env_or_optional_string(var: &str, fallback: Option<String>) -> Option<String> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => fallback,
    }
}

fn env_or_parsed<T: FromStr<Err = String>>(var: &str, fallback: T) -> Result<T, TierError> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v
            .parse::<T>()
            .map_err(|err| TierError::Configuration(format!("{var}: {err}"))),
        _ => Ok(fallback),
    }
}

fn env_or_csv_paths(var: &str, fallback: &[PathBuf]) -> Vec<PathBuf> {
    match env::var(var) {
        Ok(v) => {
            let out = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .collect::<Vec<_>>();
            if out.is_empty() {
                fallback.to_vec()
            } else {
                out
            }
        }
        Err(_) => fallback.to_vec(),
    }
}

/// Accepts the settings-form style `".mkv .mp4 .avi"` as well as commas.
pub fn parse_extensions(raw: &str) -> Vec<String> {
    raw.split(|c: char| c.is_whitespace() || c == ',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            let lower = s.to_ascii_lowercase();
            if lower.starts_with('.') {
                lower
            } else {
                format!(".{lower}")
            }
        })
        .collect()
}

fn validate(cfg: &TierConfig) -> Result<(), TierError> {
    let cache = &cfg.tiers.cache_root;
    let array = &cfg.tiers.array_root;
    if !cache.is_absolute() {
        return Err(TierError::Configuration(format!(
            "cache root must be an absolute path: {}",
            cache.display()
        )));
    }
    if !array.is_absolute() {
        return Err(TierError::Configuration(format!(
            "array root must be an absolute path: {}",
            array.display()
        )));
    }
    if cache == array {
        return Err(TierError::Configuration(
            "cache root and array root must differ".to_string(),
        ));
    }
    if cache.starts_with(array) || array.starts_with(cache) {
        return Err(TierError::Configuration(
            "cache root and array root must not be nested inside each other".to_string(),
        ));
    }
    if cfg.media.extensions.iter().any(|ext| ext.trim().is_empty()) {
        return Err(TierError::Configuration(
            "media extensions cannot contain empty entries".to_string(),
        ));
    }
    if cfg.sweep.max_cache_days == 0 {
        return Err(TierError::Configuration(
            "max cache days must be >= 1".to_string(),
        ));
    }
    Ok(())
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(custom) = env::var("TIER_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    Some(tier_home().ok()?.join("cache-tier.toml"))
}

fn merge_file_config(base: &mut TierConfig) -> Result<(), TierError> {
    let Some(path) = resolve_config_path() else {
        return Ok(());
    };
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(&path)
        .map_err(|err| TierError::io(format!("failed to read {}", path.display()), err))?;
    let parsed: PartialTierConfig = toml::from_str(&raw).map_err(|err| {
        TierError::Configuration(format!("failed to parse {}: {err}", path.display()))
    })?;
    if let Some(tiers) = parsed.tiers {
        base.tiers = tiers;
    }
    if let Some(media) = parsed.media {
        base.media = media;
    }
    if let Some(sweep) = parsed.sweep {
        base.sweep = sweep;
    }
    if let Some(service) = parsed.service {
        base.service = service;
    }
    Ok(())
}

fn apply_env_overrides(cfg: &mut TierConfig) -> Result<(), TierError> {
    cfg.tiers.cache_root = env_or_path("TIER_CACHE_ROOT", &cfg.tiers.cache_root);
    cfg.tiers.array_root = env_or_path("TIER_ARRAY_ROOT", &cfg.tiers.array_root);
    if let Ok(raw) = env::var("TIER_MEDIA_FILETYPES") {
        let parsed = parse_extensions(&raw);
        if !parsed.is_empty() {
            cfg.media.extensions = parsed;
        }
    }
    cfg.sweep.protected_dirs = env_or_csv_paths("TIER_PROTECTED_DIRS", &cfg.sweep.protected_dirs);
    cfg.sweep.max_cache_days = env_or_u64("TIER_MAX_CACHE_DAYS", cfg.sweep.max_cache_days);
    cfg.sweep.ledger_clear = env_or_parsed("TIER_LEDGER_CLEAR", cfg.sweep.ledger_clear)?;
    cfg.sweep.transfer = env_or_parsed("TIER_TRANSFER", cfg.sweep.transfer)?;
    if let Ok(bin) = env::var("TIER_RSYNC_BIN") {
        if !bin.trim().is_empty() {
            cfg.sweep.rsync_bin = Some(PathBuf::from(bin.trim()));
        }
    }
    cfg.sweep.transfer_timeout_secs = env_or_optional_u64(
        "TIER_TRANSFER_TIMEOUT_SECS",
        cfg.sweep.transfer_timeout_secs,
    );
    cfg.service.command = env_or_optional_string("TIER_SERVICE_CMD", cfg.service.command.take());
    cfg.service.settle_ms = env_or_u64("TIER_SERVICE_SETTLE_MS", cfg.service.settle_ms);
    cfg.service.timeout_secs =
        env_or_optional_u64("TIER_SERVICE_TIMEOUT_SECS", cfg.service.timeout_secs);
    Ok(())
}

pub fn load_config() -> Result<TierConfig, TierError> {
    let mut cfg = TierConfig::default();
    merge_file_config(&mut cfg)?;
    apply_env_overrides(&mut cfg)?;
    cfg.media.extensions = cfg
        .media
        .extensions
        .iter()
        .flat_map(|ext| parse_extensions(ext))
        .collect();

    validate(&cfg)?;
    Ok(cfg)
}

impl TierConfig {
    /// Config for the given roots with defaults elsewhere, mostly for tests.
    pub fn for_roots(cache_root: impl Into<PathBuf>, array_root: impl Into<PathBuf>) -> Self {
        Self {
            tiers: TierRoots {
                cache_root: cache_root.into(),
                array_root: array_root.into(),
            },
            ..Self::default()
        }
    }

    pub fn is_media_file(&self, path: &Path) -> bool {
        if self.media.extensions.is_empty() {
            return true;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        let name = name.to_ascii_lowercase();
        self.media.extensions.iter().any(|ext| name.ends_with(ext.as_str()))
    }

    /// Protected dirs as absolute paths; relative entries hang off the cache root.
    pub fn protected_dirs(&self) -> Vec<PathBuf> {
        self.sweep
            .protected_dirs
            .iter()
            .map(|dir| {
                if dir.is_absolute() {
                    dir.clone()
                } else {
                    self.tiers.cache_root.join(dir)
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_accept_spaces_commas_and_missing_dots() {
        assert_eq!(
            parse_extensions(".MKV mp4, .avi"),
            vec![".mkv".to_string(), ".mp4".to_string(), ".avi".to_string()]
        );
        assert!(parse_extensions("  ").is_empty());
    }

    #[test]
    fn media_match_is_case_insensitive_suffix() {
        let cfg = TierConfig::for_roots("/mnt/cache", "/mnt/user0");
        assert!(cfg.is_media_file(Path::new("/mnt/cache/Movies/A.MKV")));
        assert!(!cfg.is_media_file(Path::new("/mnt/cache/Movies/A.nfo")));
    }

    #[test]
    fn empty_extension_list_matches_everything() {
        let mut cfg = TierConfig::for_roots("/mnt/cache", "/mnt/user0");
        cfg.media.extensions.clear();
        assert!(cfg.is_media_file(Path::new("/mnt/cache/Movies/A.srt")));
    }

    #[test]
    fn validate_rejects_nested_or_relative_roots() {
        assert!(validate(&TierConfig::for_roots("/mnt/cache", "/mnt/user0")).is_ok());
        assert!(validate(&TierConfig::for_roots("/mnt/cache", "/mnt/cache/array")).is_err());
        assert!(validate(&TierConfig::for_roots("cache", "/mnt/user0")).is_err());
        assert!(validate(&TierConfig::for_roots("/mnt/a", "/mnt/a")).is_err());
    }

    #[test]
    fn validate_rejects_zero_max_days() {
        let mut cfg = TierConfig::for_roots("/mnt/cache", "/mnt/user0");
        cfg.sweep.max_cache_days = 0;
        assert!(matches!(validate(&cfg), Err(TierError::Configuration(_))));
    }

    #[test]
    fn relative_protected_dirs_hang_off_cache_root() {
        let mut cfg = TierConfig::for_roots("/mnt/cache", "/mnt/user0");
        cfg.sweep.protected_dirs = vec![PathBuf::from("appdata"), PathBuf::from("/mnt/cache/system")];
        assert_eq!(
            cfg.protected_dirs(),
            vec![PathBuf::from("/mnt/cache/appdata"), PathBuf::from("/mnt/cache/system")]
        );
    }

    #[test]
    fn toml_sections_parse_with_kebab_case_modes() {
        let raw = r#"
[tiers]
cache_root = "/mnt/fast"
array_root = "/mnt/disk1"

[sweep]
ledger_clear = "prune-resolved"
transfer = "native"
"#;
        let parsed: PartialTierConfig = toml::from_str(raw).expect("parse");
        let sweep = parsed.sweep.expect("sweep");
        assert_eq!(sweep.ledger_clear, LedgerClearMode::PruneResolved);
        assert_eq!(sweep.transfer, TransferMode::Native);
        assert_eq!(sweep.max_cache_days, 7);
        assert_eq!(parsed.tiers.expect("tiers").cache_root, PathBuf::from("/mnt/fast"));
    }
}
