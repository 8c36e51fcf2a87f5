use super::{read_ledger, write_ledger, DocumentKey, DocumentRole, LedgerResult};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// A finished document: stored downstream and recorded once
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedDocument {
    pub key: DocumentKey,
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation: Option<String>,
    pub role: DocumentRole,
    pub storage_key: String,
    /// Source file the artifact was downloaded from, when it was not rendered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl TrackedDocument {
    pub fn new(
        key: DocumentKey,
        role: DocumentRole,
        url: impl Into<String>,
        title: impl Into<String>,
        storage_key: impl Into<String>,
    ) -> Self {
        Self {
            key,
            url: url.into(),
            title: title.into(),
            citation: None,
            role,
            storage_key: storage_key.into(),
            pdf_url: None,
            completed_at: Utc::now(),
        }
    }

    pub fn with_pdf_url(mut self, pdf_url: impl Into<String>) -> Self {
        self.pdf_url = Some(pdf_url.into());
        self
    }

    pub fn with_citation(mut self, citation: impl Into<String>) -> Self {
        let citation = citation.into();
        self.citation = (!citation.trim().is_empty()).then_some(citation);
        self
    }
}

/// On-disk shape; entries stay loose so older layouts still load
#[derive(Debug, Default, Deserialize)]
struct RawLedger {
    #[serde(default)]
    processed_documents: Vec<Value>,
    #[serde(default)]
    processed_keys: Vec<String>,
}

/// Object entries written by earlier versions of the crawler
///
/// Those used `s3_key` for the storage key, a naive `downloaded_at` timestamp,
/// and decision records carried no `key` at all.
#[derive(Debug, Deserialize)]
struct EarlierRecord {
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    citation: Option<String>,
    #[serde(default)]
    role: Option<DocumentRole>,
    #[serde(default)]
    pdf_url: Option<String>,
    #[serde(default, alias = "s3_key")]
    storage_key: Option<String>,
    #[serde(default, alias = "downloaded_at")]
    completed_at: Option<String>,
}

impl EarlierRecord {
    /// Key the record stands for, derived from its url for keyless decisions
    fn key(&self) -> Option<DocumentKey> {
        match (&self.key, &self.url, &self.pdf_url) {
            (Some(key), _, _) => Some(DocumentKey::from(key.clone())),
            (None, Some(url), Some(_)) => Some(DocumentKey::new(DocumentRole::Decision, url)),
            _ => None,
        }
    }

    fn into_document(self) -> Option<TrackedDocument> {
        let key = self.key()?;
        let role = self.role.or_else(|| key.role())?;
        let completed_at = parse_timestamp(self.completed_at.as_deref()?)?;
        Some(TrackedDocument {
            key,
            url: self.url?,
            title: self.title?,
            citation: self.citation.filter(|c| !c.trim().is_empty()),
            role,
            storage_key: self.storage_key?,
            pdf_url: self.pdf_url,
            completed_at,
        })
    }
}

/// RFC 3339, or the `%Y-%m-%d %H:%M:%S` form older ledgers wrote (taken as UTC)
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(stamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(stamp.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[derive(Serialize)]
#[serde(untagged)]
enum LedgerEntry<'a> {
    Tracked(&'a TrackedDocument),
    Retained(&'a Value),
}

#[derive(Serialize)]
struct LedgerView<'a> {
    processed_documents: Vec<LedgerEntry<'a>>,
    processed_keys: &'a [DocumentKey],
}

/// The completion ledger
///
/// Structured records live in `processed_documents`; keys known to be done
/// but without metadata (older ledgers) live in `processed_keys`. Both count
/// for `is_complete`. Object entries that cannot be read as a record are
/// retained as written and still count when they name a key.
#[derive(Debug)]
pub struct TrackingStore {
    path: PathBuf,
    documents: Vec<TrackedDocument>,
    retained: Vec<Value>,
    legacy_keys: Vec<DocumentKey>,
    index: HashSet<DocumentKey>,
    migrated: usize,
}

impl TrackingStore {
    /// Loads the ledger at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Ledger file; a missing file yields an empty store
    ///
    /// # Returns
    ///
    /// * `Ok(TrackingStore)` - Loaded store, with earlier layouts upgraded in memory
    /// * `Err(LedgerError)` - The file is unreadable or not JSON; it is left untouched
    pub fn load(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = path.as_ref().to_path_buf();
        let raw: RawLedger = read_ledger(&path)?.unwrap_or_default();

        let mut store = Self {
            path,
            documents: Vec::new(),
            retained: Vec::new(),
            legacy_keys: Vec::new(),
            index: HashSet::new(),
            migrated: 0,
        };

        for key in raw.processed_keys {
            store.remember_key(DocumentKey::from(key));
        }

        for entry in raw.processed_documents {
            match entry {
                Value::String(key) => {
                    store.migrated += 1;
                    store.remember_key(DocumentKey::from(key));
                }
                Value::Object(_) => store.load_object(entry),
                other => {
                    tracing::warn!("Keeping unexpected ledger entry as written: {}", other);
                    store.retained.push(other);
                }
            }
        }

        if store.migrated > 0 {
            tracing::info!(
                "Upgraded {} legacy entries from {}",
                store.migrated,
                store.path.display()
            );
        }

        Ok(store)
    }

    fn load_object(&mut self, entry: Value) {
        if let Ok(doc) = serde_json::from_value::<TrackedDocument>(entry.clone()) {
            self.remember_document(doc);
            return;
        }

        let record = match serde_json::from_value::<EarlierRecord>(entry.clone()) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Keeping unreadable ledger entry as written: {}", e);
                if let Some(key) = entry.get("key").and_then(Value::as_str) {
                    self.index.insert(DocumentKey::from(key.to_string()));
                }
                self.retained.push(entry);
                return;
            }
        };

        let key = record.key();
        match record.into_document() {
            Some(doc) => {
                self.migrated += 1;
                self.remember_document(doc);
            }
            None => {
                match &key {
                    Some(key) => {
                        tracing::debug!("Keeping {} as written, metadata incomplete", key);
                        self.index.insert(key.clone());
                    }
                    None => tracing::warn!("Keeping ledger entry without a key as written"),
                }
                self.retained.push(entry);
            }
        }
    }

    fn remember_key(&mut self, key: DocumentKey) {
        if self.index.insert(key.clone()) {
            self.legacy_keys.push(key);
        }
    }

    fn remember_document(&mut self, doc: TrackedDocument) {
        if self.index.insert(doc.key.clone()) {
            self.documents.push(doc);
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_complete(&self, key: &DocumentKey) -> bool {
        self.index.contains(key)
    }

    /// Records a finished document and persists immediately
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The document was new and is now on disk
    /// * `Ok(false)` - The key was already complete; nothing changed
    /// * `Err(LedgerError)` - The write failed; the record is still held in memory
    pub fn mark_complete(&mut self, doc: TrackedDocument) -> LedgerResult<bool> {
        if self.is_complete(&doc.key) {
            return Ok(false);
        }

        tracing::debug!("Marking {} complete", doc.key);
        self.remember_document(doc);
        self.persist()?;
        Ok(true)
    }

    /// Writes the whole ledger in the current format
    ///
    /// Retained entries follow the structured records, unchanged.
    pub fn persist(&self) -> LedgerResult<()> {
        let processed_documents = self
            .documents
            .iter()
            .map(LedgerEntry::Tracked)
            .chain(self.retained.iter().map(LedgerEntry::Retained))
            .collect();
        write_ledger(
            &self.path,
            &LedgerView {
                processed_documents,
                processed_keys: &self.legacy_keys,
            },
        )
    }

    pub fn documents(&self) -> &[TrackedDocument] {
        &self.documents
    }

    /// Keys that are complete but carry no metadata
    pub fn legacy_keys(&self) -> &[DocumentKey] {
        &self.legacy_keys
    }

    /// Entries kept exactly as written because they could not be read as records
    pub fn retained(&self) -> &[Value] {
        &self.retained
    }

    /// Entries upgraded from an older layout during `load`
    pub fn migrated_count(&self) -> usize {
        self.migrated
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
