// src/services/semester.rs

//! Grading-period table parsing.
//!
//! Row layout of a period table (after cell normalization):
//!
//! ```text
//! | subject | test | test | grade ... grade | grades average |
//! ```
//!
//! with any number of `final_average` cells mixed in. The two leading values
//! are class tests (the portal sometimes echoes a test score into both), the
//! last value is the printed average of the regular grades in between.

use std::collections::BTreeMap;

use scraper::{ElementRef, Selector};

use crate::error::Result;
use crate::models::PeriodRecord;
use crate::services::cells::{Cell, row_cells};
use crate::services::parse_selector;
use crate::utils::parse_locale_decimal;

/// Class of cells holding a final period average.
pub const FINAL_AVERAGE_CLASS: &str = "final_average";

/// Number of leading value cells that hold class tests.
const TEST_SLOTS: usize = 2;

/// Parser for one grading-period table.
#[derive(Debug, Clone)]
pub struct SemesterTableParser {
    rows: Selector,
}

impl SemesterTableParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            rows: parse_selector("tbody tr")?,
        })
    }

    /// Parse a period table into subject → record. A missing table is empty.
    pub fn parse(&self, table: Option<ElementRef<'_>>) -> BTreeMap<String, PeriodRecord> {
        let Some(table) = table else {
            return BTreeMap::new();
        };

        table
            .select(&self.rows)
            .filter_map(|row| parse_row(&row_cells(row)))
            .collect()
    }
}

/// Parse the cells of one period row.
///
/// Returns `None` for rows without cells or without a subject name.
pub fn parse_row(cells: &[Cell]) -> Option<(String, PeriodRecord)> {
    let (first, rest) = cells.split_first()?;
    let subject = first.text.trim();
    if subject.is_empty() {
        return None;
    }

    let mut finals = Vec::new();
    let mut values = Vec::new();
    for cell in rest {
        if cell.has_class(FINAL_AVERAGE_CLASS) {
            finals.extend(parse_locale_decimal(&cell.text));
        } else {
            values.push(cell.text.trim());
        }
    }

    let mut tests: Vec<String> = Vec::new();
    for value in values.iter().take(TEST_SLOTS) {
        let token = value.split_once(',').map_or(*value, |(head, _)| head).trim();
        if token.is_empty() {
            continue;
        }
        if tests.last().map(String::as_str) != Some(token) {
            tests.push(token.to_string());
        }
    }

    let grades = values
        .get(TEST_SLOTS..values.len().saturating_sub(1))
        .unwrap_or_default()
        .iter()
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
        .collect();

    let record = PeriodRecord {
        tests,
        grades,
        grades_average: values.last().and_then(|v| parse_locale_decimal(v)),
        average: finals.first().copied(),
    };
    Some((subject.to_string(), record))
}
