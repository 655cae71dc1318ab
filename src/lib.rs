//! # edgequake-any2pdf
//!
//! Convert images, SVG drawings and HTML documents into single-page PDFs,
//! many files at a time, and hand them over at a pace the host accepts.
//!
//! ## Pipeline Overview
//!
//! ```text
//! files (≤ 10)
//!  │
//!  ├─ 1. Batch     split into groups of 3, groups run one after another
//!  ├─ 2. Validate  declared format, per-format size limit
//!  ├─ 3. Render    PNG/JPEG decode · SVG rasterise · HTML stage + screenshot
//!  ├─ 4. Fit       A4 with 10 mm margin, or full-bleed for HTML
//!  ├─ 5. Assemble  one image on one PDF page (lopdf)
//!  └─ 6. Deliver   staggered, or one at a time with a pause in between
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_any2pdf::{convert_batch_to_dir, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::default();
//!     let report = convert_batch_to_dir(&["scan.png", "logo.svg"], "out", &config).await?;
//!     for error in report.failures() {
//!         eprintln!("{error}");
//!     }
//!     eprintln!("{} of {} converted", report.stats.converted, report.stats.total_files);
//!     Ok(())
//! }
//! ```
//!
//! ## HTML
//!
//! HTML layout is not done here. Implement [`StagingService`] and
//! [`Screenshotter`] for your rendering backend (or enable the `cdp` feature
//! for headless Chrome) and register a [`MarkupRenderer`]:
//!
//! ```rust,ignore
//! let pipeline = ConversionPipeline::new(config.clone())
//!     .with_renderer(FormatTag::MarkupHtml, Arc::new(MarkupRenderer::new(staging, camera, &config)));
//! let report = BatchScheduler::new(pipeline).run(files, target).await?;
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `any2pdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `cdp`   | off     | Headless Chrome staging and screenshots for HTML inputs |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
#[cfg(feature = "cdp")]
pub mod cdp;
pub mod config;
pub mod convert;
pub mod delivery;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::BatchScheduler;
pub use config::{ConversionConfig, ConversionConfigBuilder, DeliveryMode, HostProfile};
pub use convert::{convert_batch, convert_batch_to_dir, ConversionPipeline};
pub use delivery::{DeliveryQueue, DeliveryStats, DeliveryTarget, DirectoryTarget};
pub use error::{Any2PdfError, AssemblyError, DeliveryError, FileError, FileErrorKind, RenderError};
pub use output::{BatchReport, BatchStats, BatchSummary, ConversionResult, ConvertedDocument};
pub use pipeline::assemble::{AssembledDocument, DocumentAssembler, LopdfAssembler};
pub use pipeline::fit::{FixedPage, FullBleed, Orientation, PageGeometry, PageLayout, PageUnit};
pub use pipeline::input::{sniff_format, FormatTag, SourceFile};
pub use pipeline::markup::{
    CaptureRegion, MarkupRenderer, ReadinessSignals, Screenshotter, StagedDocument, StagingService,
};
pub use pipeline::render::{FormatRenderer, RendererRegistry, Surface, SurfaceEncoding};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
