//! Service layer for the grade notifier.
//!
//! This module contains the business logic for:
//! - Row cell normalization (`StrayTextRescue`, `row_cells`)
//! - Grading-period tables (`SemesterTableParser`)
//! - Full report pages (`ReportParser`)
//! - Portal access (`PortalClient`, `FuxnotenClient`)
//! - Message delivery (`Notifier`, `DiscordNotifier`, `LogNotifier`)

mod cells;
mod notifier;
mod portal;
mod report;
mod semester;

use scraper::Selector;

use crate::error::{AppError, Result};

pub use cells::{Cell, StrayTextRescue, element_text, row_cells};
pub use notifier::{DiscordNotifier, LogNotifier, Notifier};
pub use portal::{FuxnotenClient, PortalClient, extract_hidden_inputs};
pub use report::ReportParser;
pub use semester::{FINAL_AVERAGE_CLASS, SemesterTableParser, parse_row};

/// Parse a CSS selector string.
pub(crate) fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}
