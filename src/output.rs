//! Result types returned by an export run.
//!
//! A run never loses information about partial failure: every page ends up
//! as a [`PageOutcome`] whether it converted or not, sections aggregate
//! those into [`SectionSummary`], and the whole run returns an
//! [`ExportSummary`]. All of it serialises to JSON for the CLI's `--json`
//! mode.

use crate::error::PageError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Terminal state of a single page conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageOutcome {
    pub title: String,
    /// Where the Markdown landed; `None` when the page failed.
    pub markdown_path: Option<PathBuf>,
    /// Images successfully downloaded for this page.
    pub images: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<PageError>,
}

impl PageOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// One failed page, reduced to what the summary report needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageFailure {
    pub title: String,
    pub detail: String,
}

/// Aggregate result for one section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionSummary {
    pub section: String,
    pub total_pages: usize,
    pub converted: usize,
    pub failed: usize,
    pub failures: Vec<PageFailure>,
}

/// Aggregate result for the whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSummary {
    pub sections: Vec<SectionSummary>,
    pub total_pages: usize,
    pub converted: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

impl ExportSummary {
    /// True when every page of every section converted.
    pub fn fully_successful(&self) -> bool {
        self.failed == 0
    }
}
