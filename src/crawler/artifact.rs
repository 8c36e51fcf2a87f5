//! Artifact rendering and storage
//!
//! A harvested document is rendered to a local file, handed to an
//! `ArtifactStore`, and the local file is removed once the store confirms.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Longest storage stem before the extension
pub const MAX_STEM_CHARS: usize = 150;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Store rejected {key}: {message}")]
    Store { key: String, message: String },
}

pub type ArtifactResult<T> = std::result::Result<T, ArtifactError>;

/// Durable destination for rendered documents
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn exists(&self, key: &str) -> ArtifactResult<bool>;

    /// Stores `local` under `key`; returns once the copy is durable
    async fn put(&self, key: &str, local: &Path) -> ArtifactResult<()>;
}

/// Turns extracted content into a standalone file
pub trait ArtifactRenderer: Send + Sync {
    /// File extension without the dot
    fn extension(&self) -> &'static str;

    fn render(&self, title: &str, content_html: &str, output: &Path) -> ArtifactResult<PathBuf>;
}

/// A directory acting as the artifact store
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn exists(&self, key: &str) -> ArtifactResult<bool> {
        Ok(tokio::fs::metadata(self.root.join(key)).await.is_ok())
    }

    async fn put(&self, key: &str, local: &Path) -> ArtifactResult<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| ArtifactError::Io {
                path: self.root.clone(),
                source,
            })?;

        let target = self.root.join(key);
        tokio::fs::copy(local, &target)
            .await
            .map_err(|source| ArtifactError::Io {
                path: target.clone(),
                source,
            })?;

        tracing::info!("Stored {}", target.display());
        Ok(())
    }
}

const DOCUMENT_STYLE: &str = "\
@page { size: A4; margin: 2cm; }
body { font-family: Arial, sans-serif; line-height: 1.6; color: #333; max-width: 210mm; margin: 0 auto; padding: 20px; }
h1 { color: #1a1a1a; border-bottom: 2px solid #333; padding-bottom: 10px; margin-bottom: 20px; }
h2 { color: #2a2a2a; margin-top: 25px; margin-bottom: 15px; }
h3 { color: #3a3a3a; margin-top: 20px; margin-bottom: 10px; }
section { margin-bottom: 20px; }
.order { margin-left: 20px; }
p { margin-bottom: 10px; }";

/// Renders a self-contained, print-styled HTML document
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlArtifactRenderer;

impl HtmlArtifactRenderer {
    pub fn document(title: &str, content_html: &str) -> String {
        let title = escape_html(title);
        format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n<title>{title}</title>\n<style>\n{DOCUMENT_STYLE}\n</style>\n</head>\n<body>\n<h1>{title}</h1>\n{content_html}\n</body>\n</html>\n"
        )
    }
}

impl ArtifactRenderer for HtmlArtifactRenderer {
    fn extension(&self) -> &'static str {
        "html"
    }

    fn render(&self, title: &str, content_html: &str, output: &Path) -> ArtifactResult<PathBuf> {
        let io_error = |source| ArtifactError::Io {
            path: output.to_path_buf(),
            source,
        };

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        std::fs::write(output, Self::document(title, content_html)).map_err(io_error)?;
        Ok(output.to_path_buf())
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Replaces characters that are invalid in file names with `_`
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Storage key from citation and title, capped at `MAX_STEM_CHARS` before the extension
pub fn storage_key(citation: &str, title: &str, extension: &str) -> String {
    let citation = citation.trim();
    let stem = if citation.is_empty() {
        title.trim().to_string()
    } else {
        format!("{}_{}", citation, title.trim())
    };
    let stem: String = stem.chars().take(MAX_STEM_CHARS).collect();
    format!("{}.{}", sanitize_filename(stem.trim_end()), extension)
}
