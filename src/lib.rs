//! # onenote2md
//!
//! Export OneNote notebooks to Markdown through the Microsoft Graph API.
//!
//! ## Why this crate?
//!
//! OneNote's export options are HTML-shaped and lossy in the wrong
//! direction: generated alt text, bold styling buried in span styles,
//! pasted links wrapped in redundant anchors, and images locked behind
//! authenticated Graph URLs. This crate pulls a notebook through the
//! Graph API, rebuilds the section page hierarchy from the flat listing,
//! rewrites each page's HTML into something a Markdown converter can do
//! justice to, and downloads every image next to the produced files.
//!
//! ## Pipeline Overview
//!
//! ```text
//! notebook
//!  │
//!  ├─ 1. Auth     interactive browser sign-in (Notes.Read, PKCE)
//!  ├─ 2. Listing  notebooks → sections → paginated flat page list
//!  ├─ 3. Tree     fold (level, order) records into a page forest
//!  ├─ 4. Convert  per page: fetch HTML, normalize, download images,
//!  │              render Markdown — 5 pages in flight at a time
//!  └─ 5. Output   {section}/{title}.md (+ {title}/ for nested pages),
//!                 one shared {section}/images/ store
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use onenote2md::{export, ExportConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExportConfig::builder("My Notebook")
//!         .output_dir("./output")
//!         .build()?;
//!     let summary = export(&config).await?;
//!     eprintln!(
//!         "{}/{} pages converted",
//!         summary.converted, summary.total_pages
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `onenote2md` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! onenote2md = { version = "0.3", default-features = false }
//! ```
//!
//! ## Partial failure
//!
//! A page that cannot be fetched or converted is recorded in the summary
//! and skipped; an image that cannot be downloaded is logged and skipped
//! while its page continues. Only run-level problems — failed sign-in,
//! unknown notebook, exhausted retries on a listing — abort the export.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod auth;
pub mod config;
pub mod error;
pub mod export;
pub mod graph;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod sanitize;
pub mod tree;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use auth::{InteractiveAuth, StaticToken, TokenSource, DEFAULT_CLIENT_ID};
pub use config::{ExportConfig, ExportConfigBuilder};
pub use error::{ExportError, PageError};
pub use export::{export, export_with_client};
pub use graph::{GraphClient, Notebook, Section};
pub use output::{ExportSummary, PageFailure, PageOutcome, SectionSummary};
pub use progress::{ExportProgress, NoopProgress, ProgressCallback};
pub use tree::{build_page_tree, PageNode, RawPage};
