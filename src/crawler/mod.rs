//! Crawler module for the portal traversal
//!
//! This module contains the traversal engine the recovery core serves:
//! - Listing and document parsing, decisions included
//! - Artifact rendering and storage
//! - Sequential crawl coordination over a single browser page

mod artifact;
mod coordinator;
mod parser;

pub use artifact::{
    sanitize_filename, storage_key, ArtifactError, ArtifactRenderer, ArtifactResult, ArtifactStore,
    HtmlArtifactRenderer, LocalArtifactStore, MAX_STEM_CHARS,
};
pub use coordinator::{
    CrawlReport, CrawlSettings, Crawler, DocumentOutcome, EXPAND_DROPDOWNS_SCRIPT,
};
pub use parser::{
    parse_category_links, parse_decision_listing, parse_decision_page, parse_document,
    parse_listing, parse_year_link, parse_year_options, section_role, DecisionPage, DocumentPage,
    DocumentRef, YearOption, INACTIVE_MARKERS,
};
