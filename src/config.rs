//! Configuration for an export run.
//!
//! All behaviour is controlled through [`ExportConfig`], built via its
//! [`ExportConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share across workers and to see at a glance why two runs
//! behaved differently.

use crate::auth::DEFAULT_CLIENT_ID;
use crate::error::ExportError;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;

/// Configuration for [`crate::export::export`].
///
/// # Example
/// ```rust
/// use onenote2md::ExportConfig;
///
/// let config = ExportConfig::builder("My Notebook")
///     .section("Work")
///     .output_dir("./export")
///     .concurrency(8)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExportConfig {
    /// Display name of the notebook to export. Required.
    pub notebook: String,

    /// Restrict the export to one section; `None` exports all sections.
    pub section: Option<String>,

    /// Root of the produced tree. Default: `./output`.
    pub output_dir: PathBuf,

    /// Azure application (client) id used for the interactive sign-in.
    /// Defaults to the shared public registration.
    pub client_id: String,

    /// Number of pages converted concurrently. Default: 5.
    ///
    /// Page conversion is network-bound (content fetch + image bytes), so
    /// a handful of in-flight pages cuts wall-clock time substantially.
    /// Graph throttles aggressively beyond that; raise with care.
    pub concurrency: usize,

    /// Attempts per API request before giving up. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubling per attempt.
    /// Default: 2000 (2 s → 4 s between the three default attempts).
    pub retry_backoff_ms: u64,

    /// Pages requested per listing batch (`$top`). Default: 100.
    pub page_batch_size: usize,

    /// Optional progress callback; `None` means no events.
    pub progress: Option<ProgressCallback>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            notebook: String::new(),
            section: None,
            output_dir: PathBuf::from("./output"),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            concurrency: 5,
            max_retries: 3,
            retry_backoff_ms: 2000,
            page_batch_size: 100,
            progress: None,
        }
    }
}

impl fmt::Debug for ExportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportConfig")
            .field("notebook", &self.notebook)
            .field("section", &self.section)
            .field("output_dir", &self.output_dir)
            .field("client_id", &self.client_id)
            .field("concurrency", &self.concurrency)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("page_batch_size", &self.page_batch_size)
            .field("progress", &self.progress.as_ref().map(|_| "<dyn ExportProgress>"))
            .finish()
    }
}

impl ExportConfig {
    /// Create a builder for the given notebook display name.
    pub fn builder(notebook: impl Into<String>) -> ExportConfigBuilder {
        ExportConfigBuilder {
            config: ExportConfig {
                notebook: notebook.into(),
                ..ExportConfig::default()
            },
        }
    }
}

/// Builder for [`ExportConfig`].
#[derive(Debug)]
pub struct ExportConfigBuilder {
    config: ExportConfig,
}

impl ExportConfigBuilder {
    pub fn section(mut self, section: impl Into<String>) -> Self {
        self.config.section = Some(section.into());
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.config.client_id = id.into();
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.max(1);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn page_batch_size(mut self, n: usize) -> Self {
        self.config.page_batch_size = n.max(1);
        self
    }

    pub fn progress(mut self, callback: ProgressCallback) -> Self {
        self.config.progress = Some(callback);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExportConfig, ExportError> {
        let c = &self.config;
        if c.notebook.trim().is_empty() {
            return Err(ExportError::InvalidConfig(
                "Notebook name must not be empty".into(),
            ));
        }
        if c.client_id.trim().is_empty() {
            return Err(ExportError::InvalidConfig(
                "Client id must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = ExportConfig::builder("Notes").build().expect("valid");
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_backoff_ms, 2000);
        assert_eq!(config.page_batch_size, 100);
        assert_eq!(config.output_dir, PathBuf::from("./output"));
        assert_eq!(config.client_id, DEFAULT_CLIENT_ID);
        assert!(config.section.is_none());
    }

    #[test]
    fn empty_notebook_is_rejected() {
        let err = ExportConfig::builder("   ").build().expect_err("invalid");
        assert!(matches!(err, ExportError::InvalidConfig(_)));
    }

    #[test]
    fn concurrency_is_clamped_to_one() {
        let config = ExportConfig::builder("n")
            .concurrency(0)
            .build()
            .expect("valid");
        assert_eq!(config.concurrency, 1);
    }
}
