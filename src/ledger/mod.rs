//! Ledger module for resumable crawling
//!
//! This module keeps the on-disk record of what the crawl has finished:
//! - `TrackingStore`: the append-only completion ledger, reloaded at startup
//! - `SkipLedger`: documents excluded because the portal marks them not in force
//! - `DocumentKey` / `DocumentRole`: canonical keys shared by both ledgers
//! - Statistics over both files for the `stats` command
//!
//! Both files are pretty-printed JSON and are safe to inspect or edit between runs.

mod key;
mod skipped;
mod stats;
mod tracking;

pub use key::{portal_path, DocumentKey, DocumentRole};
pub use skipped::{SkipLedger, SkippedDocument};
pub use stats::{load_statistics, print_statistics, LedgerStatistics};
pub use tracking::{TrackedDocument, TrackingStore};

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Ledger persistence errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Ledger {path} is not valid JSON: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to serialize ledger: {0}")]
    Json(#[from] serde_json::Error),
}

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Reads a ledger file, returning `None` when it does not exist yet
fn read_ledger<T: DeserializeOwned>(path: &Path) -> LedgerResult<Option<T>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(LedgerError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| LedgerError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

/// Writes a ledger file through a sibling temp file and a rename
fn write_ledger<T: Serialize>(path: &Path, value: &T) -> LedgerResult<()> {
    let io_error = |source| LedgerError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }

    let json = serde_json::to_string_pretty(value)?;
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);

    fs::write(&temp, json).map_err(io_error)?;
    fs::rename(&temp, path).map_err(io_error)
}
