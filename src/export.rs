//! Export orchestration: notebook lookup, task planning, worker pool.
//!
//! ## Failure model
//!
//! Errors split along the boundary described in [`crate::error`]: anything
//! that makes the whole run meaningless (no token, notebook missing,
//! listing retries exhausted) propagates out of [`export`] as
//! `Err(ExportError)`; anything scoped to one page is caught at the task
//! boundary and recorded in that page's [`PageOutcome`], so a section with
//! one broken page still produces every other file.
//!
//! ## Concurrency
//!
//! Tasks fan out over `futures::stream::buffer_unordered` with the
//! configured width (default 5). Workers are independent: they share only
//! the output tree and the section image store, and every path they write
//! is unique by construction (sanitized title paths for Markdown, hashed
//! counter names for images), so no locking is involved. Directory
//! creation uses `create_dir_all`, which is a no-op when the directory
//! already exists. A task runs to completion once dispatched; there is no
//! per-page timeout beyond the request-layer retry ceiling.

use crate::auth::{InteractiveAuth, TokenSource};
use crate::config::ExportConfig;
use crate::error::{ExportError, PageError};
use crate::graph::{GraphClient, Section};
use crate::output::{ExportSummary, PageFailure, PageOutcome, SectionSummary};
use crate::pipeline::images::ImageFetcher;
use crate::pipeline::{markdown, normalize};
use crate::progress::{NoopProgress, ProgressCallback};
use crate::sanitize::sanitize_title;
use crate::tree::{build_page_tree, count_pages, PageNode};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Export a notebook (or one of its sections) to Markdown.
///
/// This is the primary entry point for the library. Credentials are
/// acquired interactively through the system browser on first use.
///
/// # Returns
/// `Ok(ExportSummary)` even when some pages failed — check
/// [`ExportSummary::fully_successful`].
///
/// # Errors
/// Returns `Err(ExportError)` only for fatal errors: failed sign-in,
/// unknown notebook or section, exhausted retries on a listing call.
pub async fn export(config: &ExportConfig) -> Result<ExportSummary, ExportError> {
    let tokens: Arc<dyn TokenSource> = Arc::new(InteractiveAuth::new(config.client_id.clone()));
    let client = GraphClient::new(
        tokens,
        config.max_retries,
        config.retry_backoff_ms,
        config.page_batch_size,
    )?;
    export_with_client(&client, config).await
}

/// Like [`export`], with a caller-supplied [`GraphClient`].
///
/// Lets tests point the export at a mock server, and callers with an
/// existing token skip the interactive flow entirely.
pub async fn export_with_client(
    client: &GraphClient,
    config: &ExportConfig,
) -> Result<ExportSummary, ExportError> {
    let started = Instant::now();
    let progress: ProgressCallback = config
        .progress
        .clone()
        .unwrap_or_else(|| Arc::new(NoopProgress));

    tokio::fs::create_dir_all(&config.output_dir)
        .await
        .map_err(|e| ExportError::OutputWrite {
            path: config.output_dir.clone(),
            source: e,
        })?;

    info!("Looking for notebook '{}'", config.notebook);
    let notebook = client
        .list_notebooks()
        .await?
        .into_iter()
        .find(|n| n.display_name == config.notebook)
        .ok_or_else(|| ExportError::NotebookNotFound {
            name: config.notebook.clone(),
        })?;

    let mut sections = client.list_sections(&notebook.id).await?;
    if sections.is_empty() {
        return Err(ExportError::NoSections {
            notebook: config.notebook.clone(),
        });
    }
    if let Some(wanted) = &config.section {
        sections.retain(|s| &s.display_name == wanted);
        if sections.is_empty() {
            return Err(ExportError::SectionNotFound {
                notebook: config.notebook.clone(),
                name: wanted.clone(),
            });
        }
    }
    info!("Exporting {} section(s)", sections.len());

    let mut summaries = Vec::with_capacity(sections.len());
    for section in &sections {
        summaries.push(export_section(client, config, section, &progress).await?);
    }

    let summary = ExportSummary {
        total_pages: summaries.iter().map(|s| s.total_pages).sum(),
        converted: summaries.iter().map(|s| s.converted).sum(),
        failed: summaries.iter().map(|s| s.failed).sum(),
        sections: summaries,
        duration_ms: started.elapsed().as_millis() as u64,
    };
    info!(
        "Export complete: {}/{} pages in {}ms",
        summary.converted, summary.total_pages, summary.duration_ms
    );
    Ok(summary)
}

/// Convert every page of one section.
async fn export_section(
    client: &GraphClient,
    config: &ExportConfig,
    section: &Section,
    progress: &ProgressCallback,
) -> Result<SectionSummary, ExportError> {
    let section_dir = config.output_dir.join(sanitize_title(&section.display_name));
    let images_dir = section_dir.join("images");
    tokio::fs::create_dir_all(&images_dir)
        .await
        .map_err(|e| ExportError::OutputWrite {
            path: images_dir.clone(),
            source: e,
        })?;

    let listing = client.list_pages(&section.id).await?;
    let roots = build_page_tree(listing);
    let total_pages = count_pages(&roots);
    progress.on_section_start(&section.display_name, total_pages);
    progress.on_tree(&section.display_name, &roots);

    let tasks = plan_tasks(roots, &section_dir);
    debug!(
        section = %section.display_name,
        tasks = tasks.len(),
        "dispatching page conversions"
    );

    let images_dir = images_dir.as_path();
    let outcomes: Vec<PageOutcome> = stream::iter(tasks.into_iter().map(|task| {
        let progress = Arc::clone(progress);
        async move {
            progress.on_page_start(&task.title);
            let outcome = convert_page(client, images_dir, task).await;
            match (&outcome.error, &outcome.markdown_path) {
                (None, Some(path)) => {
                    progress.on_page_complete(&outcome.title, path, outcome.images)
                }
                _ => {
                    if let Some(error) = &outcome.error {
                        progress.on_page_error(&outcome.title, error.to_string());
                    }
                }
            }
            outcome
        }
    }))
    .buffer_unordered(config.concurrency)
    .collect()
    .await;

    let converted = outcomes.iter().filter(|o| o.is_success()).count();
    let failures: Vec<PageFailure> = outcomes
        .iter()
        .filter_map(|o| {
            o.error.as_ref().map(|e| PageFailure {
                title: o.title.clone(),
                detail: e.to_string(),
            })
        })
        .collect();
    progress.on_section_complete(&section.display_name, converted, failures.len());

    Ok(SectionSummary {
        section: section.display_name.clone(),
        total_pages,
        converted,
        failed: failures.len(),
        failures,
    })
}

// ── Task planning ────────────────────────────────────────────────────────

/// One unit of work for the pool: a page with its assigned output paths.
#[derive(Debug, Clone)]
pub struct PageTask {
    pub id: String,
    pub title: String,
    /// Where this page's Markdown file goes.
    pub markdown_path: PathBuf,
    /// Directory this page owns (top-level pages with children only).
    pub page_dir: Option<PathBuf>,
    /// Child pages write their Markdown one level below the section dir,
    /// so their image references need a `../` prefix.
    pub is_child: bool,
}

/// Flatten the forest into tasks, pre-order, threading each child's
/// assigned parent directory down.
///
/// Layout rules: a top-level page writes `{section}/{title}.md` and, when
/// it has children, owns `{section}/{title}/`. Children — and all deeper
/// descendants — write into that directory, so grandchildren sit beside
/// their parents rather than nesting further (the directory depth stays
/// at one regardless of page depth).
pub fn plan_tasks(roots: Vec<PageNode>, section_dir: &Path) -> Vec<PageTask> {
    let mut tasks = Vec::new();
    for root in roots {
        collect(root, None, section_dir, &mut tasks);
    }
    tasks
}

fn collect(
    page: PageNode,
    parent_dir: Option<PathBuf>,
    section_dir: &Path,
    out: &mut Vec<PageTask>,
) {
    let slug = sanitize_title(&page.title);
    let has_children = !page.children.is_empty();

    let (markdown_path, page_dir, is_child, child_parent) = match parent_dir {
        Some(dir) => (dir.join(format!("{slug}.md")), None, true, dir),
        None => {
            let own_dir = section_dir.join(&slug);
            (
                section_dir.join(format!("{slug}.md")),
                has_children.then(|| own_dir.clone()),
                false,
                own_dir,
            )
        }
    };

    out.push(PageTask {
        id: page.id,
        title: page.title,
        markdown_path,
        page_dir,
        is_child,
    });

    for child in page.children {
        collect(child, Some(child_parent.clone()), section_dir, out);
    }
}

// ── Worker ───────────────────────────────────────────────────────────────

/// Convert one page. Always returns an outcome; failures are captured in
/// `outcome.error` so a bad page never takes a sibling down with it.
async fn convert_page(client: &GraphClient, images_dir: &Path, task: PageTask) -> PageOutcome {
    let title = task.title.clone();
    match convert_page_inner(client, images_dir, &task).await {
        Ok(images) => PageOutcome {
            title,
            markdown_path: Some(task.markdown_path),
            images,
            error: None,
        },
        Err(error) => PageOutcome {
            title,
            markdown_path: None,
            images: 0,
            error: Some(error),
        },
    }
}

async fn convert_page_inner(
    client: &GraphClient,
    images_dir: &Path,
    task: &PageTask,
) -> Result<usize, PageError> {
    let content_fetch = |detail: String| PageError::ContentFetch {
        title: task.title.clone(),
        detail,
    };
    let convert = |detail: String| PageError::Convert {
        title: task.title.clone(),
        detail,
    };
    let write = |detail: String| PageError::Write {
        title: task.title.clone(),
        path: task.markdown_path.clone(),
        detail,
    };

    let html = client
        .page_content(&task.id)
        .await
        .map_err(|e| content_fetch(e.to_string()))?;

    let (prepared, sources) = normalize::prepare(&html).map_err(|e| convert(e.to_string()))?;

    let mut fetcher = ImageFetcher::new(client, images_dir, &task.title, task.is_child);
    let mut resolved: Vec<Option<String>> = Vec::with_capacity(sources.len());
    for source in &sources {
        match source {
            Some(source) => resolved.push(fetcher.fetch(source).await),
            None => resolved.push(None),
        }
    }
    let images = resolved.iter().flatten().count();

    let final_html =
        normalize::apply_images(&prepared, &resolved).map_err(|e| convert(e.to_string()))?;
    let body = markdown::render(&final_html).map_err(|e| convert(e.to_string()))?;

    if let Some(dir) = &task.page_dir {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| write(e.to_string()))?;
    }
    if let Some(parent) = task.markdown_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| write(e.to_string()))?;
    }

    let document = format!("# {}\n\n{}\n", task.title, body);
    tokio::fs::write(&task.markdown_path, document)
        .await
        .map_err(|e| write(e.to_string()))?;

    debug!("converted '{}' -> {}", task.title, task.markdown_path.display());
    Ok(images)
}
