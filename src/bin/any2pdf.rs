//! CLI binary for edgequake-any2pdf.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig`, runs one batch and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_any2pdf::{
    BatchProgressCallback, BatchReport, BatchScheduler, ConversionConfig, ConversionPipeline,
    DeliveryMode, DirectoryTarget, ProgressCallback, SourceFile,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
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

/// Terminal progress callback: one bar for the whole batch plus a log line
/// per file. Files inside a group finish in any order.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Per-file wall-clock start times, keyed by submission index.
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);

        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading files…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>2}/{len} files  \
             {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Converting");
        self.bar.set_message("");
    }

    fn elapsed(&self, index: usize) -> String {
        let ms = self
            .start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index))
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);
        dim(&format!("{:.1}s", ms as f64 / 1000.0))
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_files: usize, _total_groups: usize) {
        self.activate_bar(total_files);
    }

    fn on_group_start(&self, group: usize, _file_names: &[String]) {
        self.bar.set_message(format!("group {}", group + 1));
    }

    fn on_file_start(&self, index: usize, _total: usize, _file_name: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(index, Instant::now());
        }
    }

    fn on_file_complete(&self, index: usize, total: usize, file_name: &str) {
        self.bar.println(format!(
            "  {} File {:>2}/{:<2}  {}  {}",
            green("✓"),
            index + 1,
            total,
            file_name,
            self.elapsed(index),
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, index: usize, total: usize, error: &str) {
        // Keep only the first line; the rest is a hint for library users.
        let first = error.lines().next().unwrap_or_default();
        let msg = if first.chars().count() > 80 {
            format!("{}\u{2026}", first.chars().take(79).collect::<String>())
        } else {
            first.to_string()
        };

        self.bar.println(format!(
            "  {} File {:>2}/{:<2}  {}  {}",
            red("✗"),
            index + 1,
            total,
            red(&msg),
            self.elapsed(index),
        ));
        self.bar.inc(1);
    }

    fn on_group_delivered(&self, group: usize, delivered: usize) {
        self.bar
            .println(format!("  {}", dim(&format!("group {} handed over {delivered} file(s)", group + 1))));
    }

    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        let failed = total_files.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} files converted successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} files converted  ({} failed)",
                if failed == total_files {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_files,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert a few files into ./out
  any2pdf scan.png photo.jpg logo.svg -o out

  # Host that drops rapid downloads: one file at a time, 1.5 s apart
  any2pdf --serial --delay-ms 1500 *.png -o out

  # HTML pages (build with --features cdp, needs Chrome/Chromium)
  any2pdf report.html invoice.html -o out --settle-ms 500

  # Machine-readable summary
  any2pdf --json *.jpg -o out > summary.json

INPUTS:
  Format   Extensions        Max size   Page
  ──────   ───────────────   ────────   ─────────────────────────────
  PNG      .png              10 MiB     A4, 10 mm margin
  JPEG     .jpg .jpeg        10 MiB     A4, 10 mm margin
  SVG      .svg              15 MiB     A4, 10 mm margin, landscape > 1.2:1
  HTML     .html .htm        10 MiB     sized to content, max 1200x1700 pt

  At most 10 files per run. They are converted in groups of 3; a file that
  fails never stops the others.

ENVIRONMENT VARIABLES:
  ANY2PDF_OUTPUT          Output directory
  ANY2PDF_SERIAL          Deliver one file at a time
  ANY2PDF_DELAY_MS        Pause after each serial delivery
  ANY2PDF_STAGGER_MS      Spacing between staggered deliveries
  ANY2PDF_SETTLE_MS       Extra wait before capturing HTML
  RUST_LOG                Override the log filter
"#;

/// Convert images, SVG drawings and HTML pages to single-page PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "any2pdf",
    version,
    about = "Convert images, SVG drawings and HTML pages to single-page PDFs",
    long_about = "Convert PNG, JPEG, SVG and HTML files to PDFs, one page per file. Images and \
drawings are fitted onto an A4 page; HTML is captured at full width onto a page sized to its \
content. Files are processed in small groups and written out at a configurable pace.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Files to convert (at most 10).
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Directory the PDFs are written to.
    #[arg(short, long, env = "ANY2PDF_OUTPUT", default_value = ".")]
    output: PathBuf,

    /// Deliver files one at a time with a pause after each.
    #[arg(long, env = "ANY2PDF_SERIAL")]
    serial: bool,

    /// Pause after each serial delivery, in milliseconds.
    #[arg(long, env = "ANY2PDF_DELAY_MS", default_value_t = 1000)]
    delay_ms: u64,

    /// Spacing between staggered deliveries, in milliseconds.
    #[arg(long, env = "ANY2PDF_STAGGER_MS", default_value_t = 200)]
    stagger_ms: u64,

    /// Files converted concurrently per group.
    #[arg(long, env = "ANY2PDF_GROUP_SIZE", default_value_t = 3)]
    group_size: usize,

    /// Extra wait before capturing HTML, in milliseconds.
    #[arg(long, env = "ANY2PDF_SETTLE_MS", default_value_t = 1000)]
    settle_ms: u64,

    /// Give up on HTML readiness signals after this many milliseconds.
    #[arg(long, env = "ANY2PDF_READINESS_TIMEOUT_MS")]
    readiness_timeout_ms: Option<u64>,

    /// Print a JSON summary on stdout.
    #[arg(long, env = "ANY2PDF_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "ANY2PDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "ANY2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "ANY2PDF_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar gives all the feedback that matters; keep library
    // logs down to errors while it is shown.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Read inputs ──────────────────────────────────────────────────────
    if cli.inputs.len() > config.max_batch_files {
        anyhow::bail!(
            "{} files given but at most {} can be converted per run",
            cli.inputs.len(),
            config.max_batch_files
        );
    }
    let mut files = Vec::with_capacity(cli.inputs.len());
    for path in &cli.inputs {
        files.push(SourceFile::from_path(path).await?);
    }

    let target = DirectoryTarget::create(&cli.output)
        .await
        .context("Cannot write to output directory")?;

    // ── Run conversion ───────────────────────────────────────────────────
    let pipeline = build_pipeline(&config)?;
    let report = BatchScheduler::new(pipeline)
        .run(files, Arc::new(target))
        .await
        .context("Conversion failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&report.summary())
            .context("Failed to serialise summary")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&report, &cli, show_progress);
    }

    Ok(if report.all_succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let delivery = if cli.serial {
        DeliveryMode::Serialized {
            delay_ms: cli.delay_ms,
        }
    } else {
        DeliveryMode::Staggered {
            stagger_ms: cli.stagger_ms,
        }
    };

    let mut builder = ConversionConfig::builder()
        .group_size(cli.group_size)
        .settle_delay_ms(cli.settle_ms)
        .readiness_timeout_ms(cli.readiness_timeout_ms)
        .delivery(delivery);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Default renderers, plus headless Chrome for HTML when built with `cdp`.
#[cfg(feature = "cdp")]
fn build_pipeline(config: &ConversionConfig) -> Result<ConversionPipeline> {
    use edgequake_any2pdf::cdp::{ChromeScreenshotter, ChromeStaging};
    use edgequake_any2pdf::{FormatTag, MarkupRenderer};

    let staging = ChromeStaging::launch(config.markup_viewport_width)
        .context("Failed to start headless Chrome for HTML inputs")?;
    let markup = MarkupRenderer::new(staging, ChromeScreenshotter, config);
    Ok(ConversionPipeline::new(config.clone()).with_renderer(FormatTag::MarkupHtml, Arc::new(markup)))
}

#[cfg(not(feature = "cdp"))]
fn build_pipeline(config: &ConversionConfig) -> Result<ConversionPipeline> {
    Ok(ConversionPipeline::new(config.clone()))
}

fn print_summary(report: &BatchReport, cli: &Cli, show_progress: bool) {
    let stats = &report.stats;

    // The callback already printed the per-file log when the bar was on.
    if !show_progress {
        for error in report.failures() {
            eprintln!("{} {}", red("✗"), error);
        }
    }

    eprintln!(
        "{}  {}/{} files  {}ms  →  {}",
        if stats.failed == 0 {
            green("✔")
        } else {
            cyan("⚠")
        },
        stats.converted,
        stats.total_files,
        stats.total_duration_ms,
        bold(&cli.output.display().to_string()),
    );
    if stats.delivery_failures > 0 {
        eprintln!(
            "   {} PDF(s) could not be written",
            red(&stats.delivery_failures.to_string())
        );
    }
    for doc in report.documents() {
        eprintln!("   {}", dim(&doc.file_name()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgequake_any2pdf::FullBleed;

    #[test]
    fn help_describes_markup_page_caps() {
        let bleed = FullBleed::default();
        let caps = format!("max {}x{} pt", bleed.max_width, bleed.max_height);
        let html_row = AFTER_HELP
            .lines()
            .find(|l| l.trim_start().starts_with("HTML"))
            .unwrap();
        assert!(html_row.contains("sized to content"), "{html_row}");
        assert!(html_row.contains(&caps), "{html_row}");
        assert!(!html_row.contains("210 mm"));
    }

    #[test]
    fn cli_defaults_match_config_defaults() {
        let cli = Cli::try_parse_from(["any2pdf", "a.png"]).unwrap();
        let config = ConversionConfig::default();
        assert_eq!(cli.group_size, config.group_size);
        assert_eq!(cli.settle_ms, config.settle_delay_ms);
    }
}
