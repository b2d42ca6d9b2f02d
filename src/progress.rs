//! Progress-callback trait for per-page export events.
//!
//! Inject an [`Arc<dyn ExportProgress>`] via
//! [`crate::config::ExportConfigBuilder::progress`] to receive real-time
//! events as the worker pool processes pages. The callback approach keeps
//! the library free of any opinion about presentation: the bundled CLI
//! renders a progress bar, a host application could forward events to a
//! channel or a log sink instead.
//!
//! # Thread safety
//!
//! Pages are processed concurrently, so `on_page_start`,
//! `on_page_complete` and `on_page_error` may be called from interleaved
//! tasks in any order. Implementations must protect shared mutable state
//! (`Mutex`, atomics). All methods have default no-op implementations so
//! callers only override what they care about.

use crate::tree::PageNode;
use std::path::Path;
use std::sync::Arc;

/// Called by the export pipeline as sections and pages are processed.
pub trait ExportProgress: Send + Sync {
    /// A section's listing has been fetched and its tree rebuilt;
    /// `total_pages` counts every page in the section, nested included.
    fn on_section_start(&self, section: &str, total_pages: usize) {
        let _ = (section, total_pages);
    }

    /// The reconstructed page forest, for callers that want to render the
    /// hierarchy before conversion begins.
    fn on_tree(&self, section: &str, roots: &[PageNode]) {
        let _ = (section, roots);
    }

    /// A worker picked up a page.
    fn on_page_start(&self, title: &str) {
        let _ = title;
    }

    /// A page converted and its Markdown file is on disk.
    fn on_page_complete(&self, title: &str, path: &Path, images: usize) {
        let _ = (title, path, images);
    }

    /// A page failed; the batch continues without it.
    fn on_page_error(&self, title: &str, error: String) {
        let _ = (title, error);
    }

    /// All of a section's pages reached a terminal state.
    fn on_section_complete(&self, section: &str, converted: usize, failed: usize) {
        let _ = (section, converted, failed);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgress;

impl ExportProgress for NoopProgress {}

/// Convenience alias matching the type stored in [`crate::config::ExportConfig`].
pub type ProgressCallback = Arc<dyn ExportProgress>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        completes: AtomicUsize,
        errors: AtomicUsize,
    }

    impl ExportProgress for Counting {
        fn on_page_complete(&self, _title: &str, _path: &Path, _images: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_error(&self, _title: &str, _error: String) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_does_not_panic() {
        let cb = NoopProgress;
        cb.on_section_start("s", 3);
        cb.on_tree("s", &[]);
        cb.on_page_start("p");
        cb.on_page_complete("p", Path::new("out/p.md"), 1);
        cb.on_page_error("q", "boom".to_string());
        cb.on_section_complete("s", 2, 1);
    }

    #[test]
    fn callbacks_count_events() {
        let cb = Counting {
            completes: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
        };
        cb.on_page_complete("a", Path::new("a.md"), 0);
        cb.on_page_complete("b", Path::new("b.md"), 2);
        cb.on_page_error("c", "bad".to_string());
        assert_eq!(cb.completes.load(Ordering::SeqCst), 2);
        assert_eq!(cb.errors.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn arc_dyn_callback_moves_into_spawn() {
        let cb: Arc<dyn ExportProgress> = Arc::new(NoopProgress);
        tokio::spawn(async move {
            cb.on_page_error("p", "owned string keeps the future Send".to_string());
        })
        .await
        .expect("spawn must succeed");
    }
}
