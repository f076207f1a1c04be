use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TierError {
    #[error("configuration invalid: {0}")]
    Configuration(String),
    #[error("cache root not found or not a directory: {}", .0.display())]
    CacheRootMissing(PathBuf),
    #[error("failed to resolve {}: {message}", .path.display())]
    FileResolution { path: PathBuf, message: String },
    #[error("another sweep holds {}{}", .lock.display(), holder_suffix(.holder))]
    Locked { lock: PathBuf, holder: Option<u32> },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

fn holder_suffix(holder: &Option<u32>) -> String {
    match holder {
        Some(pid) => format!(" (pid {pid})"),
        None => String::new(),
    }
}

impl TierError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn resolution(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::FileResolution {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> TierErrorCode {
        match self {
            Self::Configuration(_) => TierErrorCode::E002ConfigInvalid,
            Self::CacheRootMissing(_) => TierErrorCode::E003CacheRootMissing,
            Self::FileResolution { .. } => TierErrorCode::E005TransferFailed,
            Self::Locked { .. } => TierErrorCode::E001Locked,
            Self::Io { .. } => TierErrorCode::E007Io,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierErrorCode {
    E001Locked,
    E002ConfigInvalid,
    E003CacheRootMissing,
    E004LedgerCorrupt,
    E005TransferFailed,
    E006Interrupted,
    E007Io,
}

impl TierErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::E001Locked => "E001_LOCKED",
            Self::E002ConfigInvalid => "E002_CONFIG_INVALID",
            Self::E003CacheRootMissing => "E003_CACHE_ROOT_MISSING",
            Self::E004LedgerCorrupt => "E004_LEDGER_CORRUPT",
            Self::E005TransferFailed => "E005_TRANSFER_FAILED",
            Self::E006Interrupted => "E006_INTERRUPTED",
            Self::E007Io => "E007_IO",
        }
    }
}
