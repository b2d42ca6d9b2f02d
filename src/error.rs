//! Error types for the onenote2md library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ExportError`] — **Fatal**: the export cannot proceed at all
//!   (credential acquisition failed, notebook not found, retries exhausted
//!   on a top-level listing). Returned as `Err(ExportError)` from
//!   [`crate::export::export`].
//!
//! * [`PageError`] — **Non-fatal**: a single page failed (content fetch,
//!   conversion, file write) but all other pages are fine. Stored inside
//!   [`crate::output::PageOutcome`] so callers can inspect partial success
//!   rather than losing the whole section to one bad page.
//!
//! Image failures sit one level below [`PageError`] and never surface as a
//! typed error at all: the fetcher logs a warning and the page continues
//! without that image.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the onenote2md library.
///
/// Page-level failures use [`PageError`] and are stored in
/// [`crate::output::PageOutcome`] rather than propagated here.
#[derive(Debug, Error)]
pub enum ExportError {
    // ── Auth errors ───────────────────────────────────────────────────────
    /// The interactive OAuth flow did not yield an access token.
    #[error("Authentication failed: {detail}")]
    AuthFailed { detail: String },

    /// The loopback redirect listener could not be started or read.
    #[error("Failed to run the local OAuth redirect listener on port {port}: {detail}")]
    RedirectListener { port: u16, detail: String },

    // ── Lookup errors ─────────────────────────────────────────────────────
    /// No notebook with the requested display name exists.
    #[error("Notebook '{name}' not found")]
    NotebookNotFound { name: String },

    /// The notebook exists but contains no sections at all.
    #[error("No sections found in notebook '{notebook}'")]
    NoSections { notebook: String },

    /// A section was named on the command line but is absent.
    #[error("Section '{name}' not found in notebook '{notebook}'")]
    SectionNotFound { notebook: String, name: String },

    // ── Request errors ────────────────────────────────────────────────────
    /// A request kept failing transiently until the retry budget ran out.
    #[error("Request to '{url}' failed after {attempts} attempts: {detail}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        detail: String,
    },

    /// The API answered with a non-retryable, non-success status.
    #[error("Request to '{url}' returned HTTP {status}")]
    ApiStatus { url: String, status: u16 },

    /// Transport-level failure (DNS, TLS, connection refused).
    #[error("Request to '{url}' failed: {detail}")]
    ApiTransport { url: String, detail: String },

    /// The API returned a body that does not match the expected shape.
    #[error("Unexpected response from '{url}': {detail}")]
    ApiResponse { url: String, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create a directory or write a file under the output root.
    #[error("Failed to write '{path}': {source}")]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
///
/// Stored in [`crate::output::PageOutcome`] when a page fails. The overall
/// export continues; failed pages are listed in the section summary.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Fetching the page's HTML body failed (after request-layer retries).
    #[error("'{title}': content fetch failed: {detail}")]
    ContentFetch { title: String, detail: String },

    /// Normalization or Markdown rendering failed.
    #[error("'{title}': conversion failed: {detail}")]
    Convert { title: String, detail: String },

    /// The Markdown file could not be written.
    #[error("'{title}': write to '{path}' failed: {detail}")]
    Write {
        title: String,
        path: PathBuf,
        detail: String,
    },
}

impl PageError {
    /// The title of the page this error belongs to.
    pub fn title(&self) -> &str {
        match self {
            PageError::ContentFetch { title, .. }
            | PageError::Convert { title, .. }
            | PageError::Write { title, .. } => title,
        }
    }
}
