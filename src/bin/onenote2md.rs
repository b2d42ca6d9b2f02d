//! CLI binary for onenote2md.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExportConfig` and renders progress and the final summary.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use onenote2md::{
    export, ExportConfig, ExportProgress, ExportSummary, PageNode, ProgressCallback,
    DEFAULT_CLIENT_ID,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus per-page log lines.
/// Pages complete out of order (the pool runs five at a time), so every
/// method must tolerate interleaved calls.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Contacting Microsoft Graph…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    /// Switch to the counting style once a section's page total is known.
    fn activate(&self, section: &str, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} pages  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");

        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        self.bar.set_style(style);
        self.bar.set_prefix(format!("Converting {section}"));
    }

    fn print_tree(&self, roots: &[PageNode], depth: usize) {
        for page in roots {
            self.bar
                .println(format!("{}• {}", "  ".repeat(depth), page.title));
            self.print_tree(&page.children, depth + 1);
        }
    }
}

impl ExportProgress for CliProgress {
    fn on_section_start(&self, section: &str, total_pages: usize) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Section '{section}': {total_pages} pages"))
        ));
        self.activate(section, total_pages);
    }

    fn on_tree(&self, _section: &str, roots: &[PageNode]) {
        self.print_tree(roots, 1);
    }

    fn on_page_start(&self, title: &str) {
        self.bar.set_message(title.to_string());
    }

    fn on_page_complete(&self, title: &str, path: &Path, images: usize) {
        let detail = if images > 0 {
            dim(&format!("{images} images"))
        } else {
            String::new()
        };
        self.bar.println(format!(
            "  {} {}  {}  {}",
            green("✓"),
            title,
            dim(&format!("→ {}", path.display())),
            detail,
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, title: &str, error: String) {
        // Truncate very long error messages to keep output tidy.
        let msg = if error.chars().count() > 80 {
            let short: String = error.chars().take(79).collect();
            format!("{short}\u{2026}")
        } else {
            error
        };
        self.bar
            .println(format!("  {} {}  {}", red("✗"), title, red(&msg)));
        self.bar.inc(1);
    }

    fn on_section_complete(&self, section: &str, converted: usize, failed: usize) {
        if failed == 0 {
            self.bar.println(format!(
                "{} {} pages converted in section '{section}'",
                green("✔"),
                bold(&converted.to_string())
            ));
        } else {
            self.bar.println(format!(
                "{} {}/{} pages converted in section '{section}'  ({} failed)",
                cyan("⚠"),
                bold(&converted.to_string()),
                converted + failed,
                red(&failed.to_string()),
            ));
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Export every section of a notebook
  onenote2md download --notebook "My Notebook"

  # One section, custom output directory
  onenote2md download --notebook "My Notebook" --section Work --output-dir ./notes

  # Machine-readable run summary
  onenote2md download --notebook "My Notebook" --json

OUTPUT LAYOUT:
  output/
    Section Name/
      images/               all images of the section, hash-named
      Some Page.md          childless page
      Parent Page.md        page with children
      Parent Page/          its children's Markdown files

AUTHENTICATION:
  The first request opens your browser on the Microsoft sign-in page
  (scope: Notes.Read) and catches the redirect on localhost:8400. The
  token stays in memory only; expired tokens re-trigger the flow.

ENVIRONMENT VARIABLES:
  ONENOTE2MD_OUTPUT_DIR   Default for --output-dir
  ONENOTE2MD_CLIENT_ID    Default for --client-id
"#;

/// Export OneNote notebooks to Markdown via the Microsoft Graph API.
#[derive(Parser, Debug)]
#[command(
    name = "onenote2md",
    version,
    about = "Export OneNote notebooks to Markdown via the Microsoft Graph API",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download and convert OneNote pages to Markdown.
    Download(DownloadArgs),
}

#[derive(clap::Args, Debug)]
struct DownloadArgs {
    /// Display name of the OneNote notebook.
    #[arg(long)]
    notebook: String,

    /// Section to download (all sections when omitted).
    #[arg(long)]
    section: Option<String>,

    /// Output directory for Markdown files.
    #[arg(long, env = "ONENOTE2MD_OUTPUT_DIR", default_value = "./output")]
    output_dir: PathBuf,

    /// Microsoft Graph application (client) id.
    #[arg(long, env = "ONENOTE2MD_CLIENT_ID", default_value = DEFAULT_CLIENT_ID)]
    client_id: String,

    /// Number of pages converted concurrently.
    #[arg(short, long, env = "ONENOTE2MD_CONCURRENCY", default_value_t = 5)]
    concurrency: usize,

    /// Attempts per API request before giving up.
    #[arg(long, env = "ONENOTE2MD_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Print the run summary as JSON instead of human-readable text.
    #[arg(long)]
    json: bool,

    /// Disable the progress bar.
    #[arg(long)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let Command::Download(args) = cli.command;

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar is the user-facing feedback channel; suppress
    // INFO-level library logs while it is active.
    let show_progress = !args.quiet && !args.no_progress && !args.json;
    let filter = if args.verbose {
        "debug"
    } else if args.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress_handle = if show_progress {
        Some(CliProgress::new())
    } else {
        None
    };

    let mut builder = ExportConfig::builder(args.notebook.as_str())
        .output_dir(&args.output_dir)
        .client_id(args.client_id.as_str())
        .concurrency(args.concurrency)
        .max_retries(args.max_retries);
    if let Some(section) = &args.section {
        builder = builder.section(section.as_str());
    }
    if let Some(handle) = &progress_handle {
        let cb: ProgressCallback = Arc::clone(handle) as Arc<dyn ExportProgress>;
        builder = builder.progress(cb);
    }
    let config = builder.build().context("Invalid configuration")?;

    // ── Run export ───────────────────────────────────────────────────────
    let result = export(&config).await;
    if let Some(handle) = &progress_handle {
        handle.bar.finish_and_clear();
    }
    let summary = result.context("Export failed")?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
    } else if !args.quiet {
        print_summary(&summary, &args.output_dir);
    }

    // Per-page failures are reported above but do not fail the command;
    // only run-level errors exit non-zero.
    Ok(())
}

/// Final human-readable summary, after the progress bar is gone.
fn print_summary(summary: &ExportSummary, output_dir: &Path) {
    for section in &summary.sections {
        if section.failures.is_empty() {
            continue;
        }
        eprintln!(
            "{} Failed to process {} page(s) in section '{}':",
            red("❌"),
            section.failures.len(),
            section.section
        );
        for failure in &section.failures {
            eprintln!("  • {}: {}", failure.title, failure.detail);
        }
    }

    let mark = if summary.fully_successful() {
        green("✔")
    } else {
        cyan("⚠")
    };
    eprintln!(
        "{mark}  {}/{} pages  {}ms  →  {}",
        summary.converted,
        summary.total_pages,
        summary.duration_ms,
        bold(&output_dir.display().to_string()),
    );
}
