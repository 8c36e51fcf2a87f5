//! HTML parser for portal pages
//!
//! This module extracts, from page snapshots:
//! - Category links from the landing page section
//! - Document rows and their nested dropdown items from a listing
//! - In-force warnings, title and content from a document page
//! - The per-year decision listings of boards and tribunals
//!
//! Parsing is synchronous and works on owned HTML so no parsed tree is held
//! across a browser call.

use crate::ledger::{DocumentKey, DocumentRole};
use scraper::{ElementRef, Html, Selector};

/// Warning words that mark a document as no longer in force
pub const INACTIVE_MARKERS: [&str; 3] = ["repealed", "spent", "not in force"];

/// A document reference collected from a listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    pub href: String,
    pub title: String,
    pub citation: String,
    pub role: DocumentRole,

    /// Title of the row this item was nested under
    pub parent_title: Option<String>,
}

impl DocumentRef {
    pub fn key(&self) -> DocumentKey {
        DocumentKey::new(self.role, &self.href)
    }
}

/// What a document page shows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentPage {
    pub warnings: Vec<String>,
    pub title: Option<String>,
    pub content_html: Option<String>,
}

impl DocumentPage {
    /// First warning saying the document is repealed, spent or not in force
    pub fn inactive_warning(&self) -> Option<&str> {
        self.warnings
            .iter()
            .find(|w| {
                let lower = w.to_lowercase();
                INACTIVE_MARKERS.iter().any(|m| lower.contains(m))
            })
            .map(String::as_str)
    }
}

/// One entry of a tribunal's year selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearOption {
    pub label: String,
    pub href: String,
}

/// What a decision page offers for download
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecisionPage {
    pub title: Option<String>,
    pub pdf_href: Option<String>,
}

const YEAR_INDEX_TEXT: &str = "more, by year";

fn selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(selector) => Some(selector),
        Err(e) => {
            tracing::error!("Invalid selector {}: {:?}", css, e);
            None
        }
    }
}

fn text_of(element: &ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Collects category hrefs from the landing-page section titled `section_title`
///
/// # Arguments
///
/// * `html` - Landing page HTML
/// * `section_title` - Heading text of the `section` to read, matched case-insensitively
///
/// # Returns
///
/// The `a.canlii` hrefs of the matching sections, in page order
pub fn parse_category_links(html: &str, section_title: &str) -> Vec<String> {
    let (Some(sections), Some(headings), Some(links)) =
        (selector("section"), selector("h2"), selector("a.canlii"))
    else {
        return Vec::new();
    };

    let wanted = section_title.trim().to_lowercase();
    let document = Html::parse_document(html);

    document
        .select(&sections)
        .filter(|section| {
            section
                .select(&headings)
                .any(|h| text_of(&h).to_lowercase().contains(&wanted))
        })
        .flat_map(|section| section.select(&links).collect::<Vec<_>>())
        .filter_map(|a| a.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .map(str::to_string)
        .collect()
}

/// Extracts every document reference from a category listing
///
/// Each `#legislationsContainer tr` row contributes its primary document and
/// then the items of its expanded dropdown, whose section headers decide the
/// role. Sections for repealed, spent or not-in-force items are left out.
pub fn parse_listing(html: &str) -> Vec<DocumentRef> {
    let (Some(rows), Some(primary), Some(date_cell), Some(cell), Some(nowrap)) = (
        selector("#legislationsContainer tr"),
        selector("a.canlii"),
        selector("td.decisionDate"),
        selector("td"),
        selector("span.nowrap"),
    ) else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    let mut refs = Vec::new();

    for row in document.select(&rows) {
        let Some(link) = row.select(&primary).next() else {
            continue;
        };
        let Some(href) = link.value().attr("href").map(str::trim).filter(|h| !h.is_empty()) else {
            continue;
        };
        let title = text_of(&link);

        // statutes carry the citation in its own cell, regulations next to the link
        let citation = row
            .select(&date_cell)
            .next()
            .or_else(|| {
                row.select(&cell)
                    .next()
                    .and_then(|first| first.select(&nowrap).next())
            })
            .map(|el| text_of(&el))
            .unwrap_or_default();

        refs.push(DocumentRef {
            href: href.to_string(),
            title: title.clone(),
            citation,
            role: DocumentRole::Main,
            parent_title: None,
        });

        refs.extend(parse_dropdown(&row, &title));
    }

    refs
}

fn parse_dropdown(row: &ElementRef<'_>, parent_title: &str) -> Vec<DocumentRef> {
    let (Some(containers), Some(items), Some(anchor), Some(nowrap)) = (
        selector("div[id^='regulation_'], div[id^='legislation_']"),
        selector("li"),
        selector("a"),
        selector("span.nowrap"),
    ) else {
        return Vec::new();
    };

    let Some(container) = row.select(&containers).next() else {
        return Vec::new();
    };

    let mut refs = Vec::new();
    let mut role = None;

    for child in container.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "div" => {
                let style = child.value().attr("style").unwrap_or_default();
                let class = child.value().attr("class").unwrap_or_default();
                if style.contains("font-weight: bold") || class.split_whitespace().any(|c| c == "pt-1") {
                    role = section_role(&text_of(&child));
                }
            }
            "ul" => {
                let Some(role) = role else {
                    continue;
                };
                for li in child.select(&items) {
                    let Some(link) = li.select(&anchor).next() else {
                        continue;
                    };
                    let Some(href) = link.value().attr("href").filter(|h| !h.trim().is_empty()) else {
                        continue;
                    };
                    refs.push(DocumentRef {
                        href: href.trim().to_string(),
                        title: text_of(&link),
                        citation: li.select(&nowrap).next().map(|s| text_of(&s)).unwrap_or_default(),
                        role,
                        parent_title: Some(parent_title.to_string()),
                    });
                }
            }
            _ => {}
        }
    }

    refs
}

/// Role for items under a dropdown section header, `None` to skip the section
pub fn section_role(header: &str) -> Option<DocumentRole> {
    let header = header.to_lowercase();
    if INACTIVE_MARKERS.iter().any(|m| header.contains(m)) {
        None
    } else if header.contains("in force") {
        Some(DocumentRole::Regulation)
    } else if header.contains("amended statutes") {
        Some(DocumentRole::AmendedStatute)
    } else if header.contains("amended regulations") {
        Some(DocumentRole::AmendedRegulation)
    } else if header.contains("enabling") {
        Some(DocumentRole::EnablingStatute)
    } else {
        None
    }
}

/// Reads warnings, title and content from a document page
pub fn parse_document(html: &str) -> DocumentPage {
    let (Some(warnings), Some(title), Some(main), Some(fallback)) = (
        selector("#warnings .warning"),
        selector("h1.main-title"),
        selector("#docCont"),
        selector(".docContents"),
    ) else {
        return DocumentPage::default();
    };

    let document = Html::parse_document(html);

    DocumentPage {
        warnings: document
            .select(&warnings)
            .map(|w| text_of(&w))
            .filter(|w| !w.is_empty())
            .collect(),
        title: document
            .select(&title)
            .next()
            .map(|t| text_of(&t))
            .filter(|t| !t.is_empty()),
        content_html: document
            .select(&main)
            .next()
            .or_else(|| document.select(&fallback).next())
            .map(|c| c.inner_html()),
    }
}

/// Href of the "more, by year" link on a tribunal's page
pub fn parse_year_link(html: &str) -> Option<String> {
    let anchors = selector("a")?;
    let document = Html::parse_document(html);
    let link = document
        .select(&anchors)
        .find(|a| text_of(a).to_lowercase().contains(YEAR_INDEX_TEXT))?;
    link.value()
        .attr("href")
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .map(str::to_string)
}

/// Options of `#navYearsSelector`; options without a value are left out
pub fn parse_year_options(html: &str) -> Vec<YearOption> {
    let Some(options) = selector("#navYearsSelector option") else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    document
        .select(&options)
        .filter_map(|option| {
            let href = option.value().attr("value")?.trim();
            (!href.is_empty()).then(|| YearOption {
                label: text_of(&option),
                href: href.to_string(),
            })
        })
        .collect()
}

/// Decision links of one year listing (`#decisionsListing tr a.canlii`)
pub fn parse_decision_listing(html: &str) -> Vec<DocumentRef> {
    let (Some(rows), Some(link)) = (selector("#decisionsListing tr"), selector("a.canlii")) else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    document
        .select(&rows)
        .filter_map(|row| row.select(&link).next())
        .filter_map(|a| {
            let href = a.value().attr("href")?.trim();
            (!href.is_empty()).then(|| DocumentRef {
                href: href.to_string(),
                title: text_of(&a),
                citation: String::new(),
                role: DocumentRole::Decision,
                parent_title: None,
            })
        })
        .collect()
}

/// Reads the title and the `#pdf-link` href from a decision page
pub fn parse_decision_page(html: &str) -> DecisionPage {
    let (Some(title), Some(pdf)) = (selector("h1.main-title"), selector("#pdf-link")) else {
        return DecisionPage::default();
    };

    let document = Html::parse_document(html);
    DecisionPage {
        title: document
            .select(&title)
            .next()
            .map(|t| text_of(&t))
            .filter(|t| !t.is_empty()),
        pdf_href: document
            .select(&pdf)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(str::trim)
            .filter(|href| !href.is_empty())
            .map(str::to_string),
    }
}
