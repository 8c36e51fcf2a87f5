use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Why a document was reached from its listing row
///
/// One physical document can appear under several rows with different roles;
/// each role gets its own ledger key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentRole {
    Main,
    Regulation,
    AmendedStatute,
    AmendedRegulation,
    EnablingStatute,
    /// Board or tribunal decision, reached through the per-year listings
    Decision,
}

impl DocumentRole {
    pub const ALL: [DocumentRole; 6] = [
        DocumentRole::Main,
        DocumentRole::Regulation,
        DocumentRole::AmendedStatute,
        DocumentRole::AmendedRegulation,
        DocumentRole::EnablingStatute,
        DocumentRole::Decision,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            DocumentRole::Main => "main",
            DocumentRole::Regulation => "regulation",
            DocumentRole::AmendedStatute => "amended_statute",
            DocumentRole::AmendedRegulation => "amended_regulation",
            DocumentRole::EnablingStatute => "enabling_statute",
            DocumentRole::Decision => "decision",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.tag() == tag)
    }
}

impl fmt::Display for DocumentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Canonical ledger key: `"{role_tag}_{portal_path}"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentKey(String);

impl DocumentKey {
    pub fn new(role: DocumentRole, href: &str) -> Self {
        Self(format!("{}_{}", role.tag(), portal_path(href)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Role encoded in the key, if it carries a known tag
    pub fn role(&self) -> Option<DocumentRole> {
        self.split().map(|(role, _)| role)
    }

    pub fn path(&self) -> Option<&str> {
        self.split().map(|(_, path)| path)
    }

    fn split(&self) -> Option<(DocumentRole, &str)> {
        // longest tag first so "amended_statute_" never matches a shorter tag
        let mut roles = DocumentRole::ALL;
        roles.sort_by_key(|r| std::cmp::Reverse(r.tag().len()));
        roles.into_iter().find_map(|role| {
            self.0
                .strip_prefix(role.tag())
                .and_then(|rest| rest.strip_prefix('_'))
                .map(|path| (role, path))
        })
    }
}

impl From<String> for DocumentKey {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Portal-relative path of an href, without query or fragment
///
/// Absolute and relative hrefs to the same document yield the same path.
pub fn portal_path(href: &str) -> String {
    let href = href.trim();
    if let Ok(url) = Url::parse(href) {
        return url.path().to_string();
    }

    let end = href.find(['?', '#']).unwrap_or(href.len());
    let path = &href[..end];
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}
