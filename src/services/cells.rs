// src/services/cells.rs

//! Table cell normalization.
//!
//! The grade tables are not always well formed: some rows carry bare text
//! (usually a stray grade digit) between their `<td>` elements. Such text must
//! end up as a cell of its own, in its source position, or the grade is
//! silently lost.
//!
//! Two steps make that happen:
//! - [`StrayTextRescue`] runs on the raw markup and wraps bare row text in
//!   `<td data-stray>` elements. An HTML5 tree builder would otherwise move
//!   that text in front of the table (foster parenting) before we ever see
//!   the row.
//! - [`row_cells`] turns the children of a parsed row into [`Cell`]s. Rescued
//!   cells whose decoded text is blank (`&#160;` padding and the like) are
//!   dropped there, since only the parsed tree knows what an entity decodes to.

use std::borrow::Cow;

use regex::{Captures, Regex};
use scraper::{ElementRef, Node};

use crate::error::Result;

/// One text-bearing position in a table row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cell {
    /// Trimmed text content
    pub text: String,
    /// Class names of the source element (empty for synthetic cells)
    pub classes: Vec<String>,
}

impl Cell {
    /// A cell made from bare row text.
    pub fn synthetic(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            classes: Vec::new(),
        }
    }

    /// A cell read from a `<td>` element.
    pub fn from_element(element: ElementRef<'_>) -> Self {
        Self {
            text: element_text(element),
            classes: element.value().classes().map(str::to_string).collect(),
        }
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }
}

/// Text of an element: every text fragment trimmed, then concatenated.
pub fn element_text(element: ElementRef<'_>) -> String {
    element.text().map(str::trim).collect()
}

/// Marker attribute on cells created by [`StrayTextRescue`].
pub const STRAY_ATTR: &str = "data-stray";

/// Ordered cells of a table row.
///
/// `<td>` children pass through; rescued cells and bare text children become
/// synthetic cells when their trimmed text is non-empty. Other children are
/// ignored.
///
/// On a document parsed by scraper, bare text children of a row are only ever
/// whitespace: the tree builder foster-parents everything else out of the
/// table. Stray grades reach this function only through [`StrayTextRescue`].
pub fn row_cells(row: ElementRef<'_>) -> Vec<Cell> {
    row.children()
        .filter_map(|child| match child.value() {
            Node::Text(text) => {
                let text = text.trim();
                (!text.is_empty()).then(|| Cell::synthetic(text))
            }
            Node::Element(element) if element.name() == "td" => {
                let element_ref = ElementRef::wrap(child)?;
                if element.attr(STRAY_ATTR).is_some() {
                    let text = element_text(element_ref);
                    (!text.is_empty()).then(|| Cell::synthetic(text))
                } else {
                    Some(Cell::from_element(element_ref))
                }
            }
            _ => None,
        })
        .collect()
}

/// Markup pass that wraps bare text inside table rows into `<td>` cells.
#[derive(Debug, Clone)]
pub struct StrayTextRescue {
    pattern: Regex,
}

impl StrayTextRescue {
    pub fn new() -> Result<Self> {
        let pattern = Regex::new(r"(?i)(</td\s*>|<tr\b[^>]*>)([^<]+)(<td\b|</tr\s*>)")?;
        Ok(Self { pattern })
    }

    /// Wrap every non-blank text run between row/cell tags into a marked
    /// cell. Runs made only of entities are wrapped too; [`row_cells`] drops
    /// them once they are decoded.
    pub fn apply<'a>(&self, html: &'a str) -> Cow<'a, str> {
        self.pattern.replace_all(html, |caps: &Captures<'_>| {
            let text = caps[2].trim();
            if text.is_empty() {
                caps[0].to_string()
            } else {
                format!("{}<td {STRAY_ATTR}>{}</td>{}", &caps[1], text, &caps[3])
            }
        })
    }
}
