use super::{read_ledger, write_ledger, LedgerResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A document excluded because the portal marks it repealed, spent or not in force
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedDocument {
    pub title: String,
    pub href: String,
    pub url: String,

    /// The warning text that triggered the skip
    pub reason: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped_at: Option<DateTime<Utc>>,
}

impl SkippedDocument {
    pub fn new(
        title: impl Into<String>,
        href: impl Into<String>,
        url: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            href: href.into(),
            url: url.into(),
            reason: reason.into(),
            skipped_at: Some(Utc::now()),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SkipFile {
    #[serde(default)]
    skipped_documents: Vec<SkippedDocument>,
}

/// Ledger of skipped documents, kept apart from completions
#[derive(Debug)]
pub struct SkipLedger {
    path: PathBuf,
    file: SkipFile,
}

impl SkipLedger {
    pub fn load(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = read_ledger(&path)?.unwrap_or_default();
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, href: &str) -> bool {
        self.file.skipped_documents.iter().any(|d| d.href == href)
    }

    /// Adds a skip unless its href is already recorded, persisting on change
    pub fn record(&mut self, doc: SkippedDocument) -> LedgerResult<bool> {
        if self.contains(&doc.href) {
            return Ok(false);
        }

        tracing::info!("Skipping {} ({})", doc.title, doc.reason.trim());
        self.file.skipped_documents.push(doc);
        self.persist()?;
        Ok(true)
    }

    pub fn persist(&self) -> LedgerResult<()> {
        write_ledger(&self.path, &self.file)
    }

    pub fn entries(&self) -> &[SkippedDocument] {
        &self.file.skipped_documents
    }

    pub fn len(&self) -> usize {
        self.file.skipped_documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file.skipped_documents.is_empty()
    }
}
