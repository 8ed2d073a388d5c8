//! Muster detail table extraction.
//!
//! The detail page has no stable ids. What it does have is a caption reading
//! "Mustroll Detail" followed, somewhere later in the document, by the table
//! of workers. [`TableExtractor`] anchors on that caption and reads the first
//! table after it through the narrow [`TableSource`] interface, so parsing is
//! testable against static markup.

use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::core::error::{MusterError, Result};
use crate::core::types::{
    FieldRecord, Provenance, RecordSet, MUSTER_ROLL_LABEL_FIELD, WORK_IDENTIFIER_FIELD,
};
use crate::scraping::automation::{xpath_literal, Locator, PageAutomation};

/// Caption text that precedes the worker table on a muster roll page.
pub const DETAIL_MARKER: &str = "Mustroll Detail";

/// Read-only view of a rendered page, just enough to find and walk a table.
pub trait TableSource {
    type Node<'a>: Copy
    where
        Self: 'a;

    /// First element whose own text contains `marker`.
    fn find_anchor(&self, marker: &str) -> Option<Self::Node<'_>>;

    /// First `<table>` after `anchor` in document order, excluding the
    /// anchor's own descendants.
    fn following_table<'a>(&'a self, anchor: Self::Node<'a>) -> Option<Self::Node<'a>>;

    /// Every row of `table`, in document order.
    fn rows<'a>(&'a self, table: Self::Node<'a>) -> Vec<Self::Node<'a>>;

    /// Whitespace-normalized text of each `kind` cell in `row`.
    fn cell_texts<'a>(&'a self, row: Self::Node<'a>, kind: CellKind) -> Vec<String>;
}

/// Which cells of a row count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    /// `<th>` and `<td>`: the portal mixes both in header rows.
    Header,
    /// `<td>` only.
    Data,
}

/// [`TableSource`] over a parsed HTML snapshot of the page.
pub struct HtmlSnapshot {
    html: Html,
}

impl HtmlSnapshot {
    pub fn parse(markup: &str) -> Self {
        Self {
            html: Html::parse_document(markup),
        }
    }
}

impl TableSource for HtmlSnapshot {
    type Node<'a> = ElementRef<'a>;

    fn find_anchor(&self, marker: &str) -> Option<ElementRef<'_>> {
        self.html
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .find(|el| {
                el.children()
                    .filter_map(|c| c.value().as_text())
                    .any(|t| t.contains(marker))
            })
    }

    fn following_table<'a>(&'a self, anchor: ElementRef<'a>) -> Option<ElementRef<'a>> {
        let anchor_id = (*anchor).id();
        self.html
            .tree
            .root()
            .descendants()
            .skip_while(|n| n.id() != anchor_id)
            .skip(1)
            .filter(|n| !n.ancestors().any(|a| a.id() == anchor_id))
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == "table")
    }

    fn rows<'a>(&'a self, table: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        match Selector::parse("tr") {
            Ok(sel) => table.select(&sel).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn cell_texts<'a>(&'a self, row: ElementRef<'a>, kind: CellKind) -> Vec<String> {
        row.children()
            .filter_map(ElementRef::wrap)
            .filter(|c| match (kind, c.value().name()) {
                (_, "td") => true,
                (CellKind::Header, "th") => true,
                _ => false,
            })
            .map(|c| {
                let mut parts = Vec::new();
                collect_visible_text(&c, &mut parts);
                normalize_text(&parts.concat())
            })
            .collect()
    }
}

/// Elements that break the rendered line, so their text never runs into a
/// neighbour's.
const LINE_BREAKING_TAGS: &[&str] = &[
    "br", "p", "div", "li", "ul", "ol", "tr", "table", "h1", "h2", "h3", "h4", "h5", "h6",
];

fn collect_visible_text(element: &ElementRef, parts: &mut Vec<String>) {
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            let name = child_element.value().name();
            if matches!(name, "script" | "style") {
                continue;
            }
            let breaks = LINE_BREAKING_TAGS.contains(&name);
            if breaks {
                parts.push("\n".to_string());
            }
            collect_visible_text(&child_element, parts);
            if breaks {
                parts.push("\n".to_string());
            }
        } else if let Some(text_node) = child.value().as_text() {
            parts.push(text_node.text.to_string());
        }
    }
}

/// Collapse whitespace runs (including `&nbsp;` and line breaks) to one
/// space and trim.
fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Header names that cannot each get their own column: repeats, and names
/// the provenance columns will overwrite.
fn header_conflicts(header: &[String]) -> Vec<&str> {
    let mut conflicts = Vec::new();
    for (i, name) in header.iter().enumerate() {
        let repeated = header[..i].contains(name);
        let reserved = name == WORK_IDENTIFIER_FIELD || name == MUSTER_ROLL_LABEL_FIELD;
        if (repeated || reserved) && !conflicts.contains(&name.as_str()) {
            conflicts.push(name.as_str());
        }
    }
    conflicts
}

/// Turns the muster detail table of the focused page into records.
#[derive(Debug, Clone)]
pub struct TableExtractor {
    timeout: Duration,
}

impl TableExtractor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Locator that matches once the detail section has rendered.
    pub fn anchor_locator() -> Locator {
        Locator::xpath(format!(
            "//*[contains(text(),{})]",
            xpath_literal(DETAIL_MARKER)
        ))
    }

    /// Wait for the detail section of the focused page, then parse it.
    pub async fn extract<D>(&self, driver: &mut D, provenance: &Provenance) -> Result<RecordSet>
    where
        D: PageAutomation + ?Sized,
    {
        match driver.wait_for(&Self::anchor_locator(), self.timeout).await {
            Ok(()) => {}
            Err(MusterError::Timeout { waited, .. }) => {
                return Err(MusterError::ExtractionFailure {
                    muster_roll: provenance.muster_roll_label.clone(),
                    reason: format!(
                        "'{}' section did not appear within {}s",
                        DETAIL_MARKER,
                        waited.as_secs()
                    ),
                });
            }
            Err(e) => return Err(e),
        }

        let markup = driver.page_html().await?;
        let records = Self::parse(&HtmlSnapshot::parse(&markup), provenance)?;
        info!(
            "📋 Muster roll {}: {} record(s)",
            provenance.muster_roll_label,
            records.len()
        );
        Ok(records)
    }

    /// Header-keyed records from the first table after the detail caption.
    ///
    /// The first row is the header. All-empty rows are dropped, short rows
    /// are padded with empty cells to the header's width.
    pub fn parse<S: TableSource>(source: &S, provenance: &Provenance) -> Result<RecordSet> {
        let failure = |reason: &str| MusterError::ExtractionFailure {
            muster_roll: provenance.muster_roll_label.clone(),
            reason: reason.to_string(),
        };

        let anchor = source
            .find_anchor(DETAIL_MARKER)
            .ok_or_else(|| failure("detail section not found"))?;
        let table = source
            .following_table(anchor)
            .ok_or_else(|| failure("no table follows the detail section"))?;

        let mut rows = source.rows(table).into_iter();
        let Some(header_row) = rows.next() else {
            debug!("muster roll {}: table has no rows", provenance.muster_roll_label);
            return Ok(RecordSet::new());
        };
        let header = source.cell_texts(header_row, CellKind::Header);
        let conflicts = header_conflicts(&header);
        if !conflicts.is_empty() {
            warn!(
                "muster roll {}: header column(s) {:?} repeat or clash with provenance; later values win",
                provenance.muster_roll_label, conflicts
            );
        }

        let mut records = RecordSet::new();
        for row in rows {
            let mut cells = source.cell_texts(row, CellKind::Data);
            if cells.iter().all(|c| c.is_empty()) {
                continue;
            }
            if cells.len() < header.len() {
                cells.resize(header.len(), String::new());
            }
            let mut record: FieldRecord = header.iter().cloned().zip(cells).collect();
            provenance.stamp(&mut record);
            records.push(record);
        }
        Ok(records)
    }
}
