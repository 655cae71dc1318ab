//! Markup inputs: HTML staged off-screen, then captured as a screenshot.
//!
//! Layout is delegated to two collaborators:
//!
//! * a [`StagingService`] loads the document into an isolated surface of a
//!   fixed logical width and exposes its readiness signals and content size;
//! * a [`Screenshotter`] rasterises the staged surface at a device scale.
//!
//! Between staging and capture the renderer awaits, as one concurrent join,
//! the load signal, every embedded image's load-or-error signal and the fonts
//! signal, then sleeps for the settle delay. The staged surface is owned by a
//! guard and torn down on every exit path, cancellation included.

use crate::config::ConversionConfig;
use crate::error::RenderError;
use crate::pipeline::fit::PageLayout;
use crate::pipeline::input::{FormatTag, SourceFile};
use crate::pipeline::render::{check_declared, FormatRenderer, Surface, SurfaceEncoding};
use async_trait::async_trait;
use futures::future::{self, BoxFuture, FutureExt};
use image::RgbImage;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use tracing::{debug, warn};

/// Styling injected into every staged document.
pub const BASELINE_STYLESHEET: &str = concat!(
    "*{box-sizing:border-box}",
    "body{margin:0 auto;padding:20px;",
    "font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,Arial,sans-serif;",
    "line-height:1.5;color:#000;background:#fff;max-width:1200px}",
    "img,svg{max-width:100%;height:auto}",
    "table{width:100%;border-collapse:collapse}",
    "td,th{padding:8px;border:1px solid #ddd}",
    "pre,code{white-space:pre-wrap}",
);

/// Rules applied for the capture itself.
pub const CAPTURE_STYLESHEET: &str = concat!(
    "*{-webkit-font-smoothing:antialiased!important;",
    "text-rendering:optimizeLegibility!important}",
    "img{image-rendering:-webkit-optimize-contrast!important}",
);

static HEAD_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<head(\s[^>]*)?>").unwrap());
static HTML_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<html(\s[^>]*)?>").unwrap());

/// Signals a staged document raises while it loads.
///
/// Each future resolves once; image futures resolve on load *or* error so a
/// broken image never blocks the capture.
pub struct ReadinessSignals {
    pub loaded: BoxFuture<'static, ()>,
    pub images: Vec<BoxFuture<'static, ()>>,
    pub fonts: BoxFuture<'static, ()>,
}

impl ReadinessSignals {
    /// Signals that have all fired already.
    pub fn ready() -> Self {
        Self {
            loaded: future::ready(()).boxed(),
            images: Vec::new(),
            fonts: future::ready(()).boxed(),
        }
    }

    /// Resolve once every signal has fired.
    pub async fn join(self) {
        tokio::join!(self.loaded, future::join_all(self.images), self.fonts);
    }
}

/// A document loaded into an off-screen surface.
#[async_trait]
pub trait StagedDocument: Send + Sync {
    /// Readiness signals of this document. Called once, right after staging.
    fn readiness(&self) -> ReadinessSignals;

    /// Scroll width and height of the laid-out body, in logical units.
    async fn content_size(&self) -> Result<(u32, u32), RenderError>;

    /// Release the surface. Called exactly once.
    fn teardown(&mut self);
}

/// Creates isolated off-screen surfaces for markup.
#[async_trait]
pub trait StagingService: Send + Sync {
    type Staged: StagedDocument + 'static;

    /// Load `html` into a fresh surface `viewport_width` logical units wide.
    async fn stage(&self, html: &str, viewport_width: u32) -> Result<Self::Staged, RenderError>;
}

/// Area of a staged surface to capture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureRegion {
    pub width: u32,
    pub height: u32,
    pub scale: f64,
}

/// Rasterises a staged surface.
#[async_trait]
pub trait Screenshotter<D: StagedDocument>: Send + Sync {
    /// Capture `region` of `staged` onto an opaque white background. The
    /// returned image is `region.width × scale` by `region.height × scale`.
    async fn capture(&self, staged: &D, region: CaptureRegion) -> Result<RgbImage, RenderError>;
}

/// Renderer for [`FormatTag::MarkupHtml`].
pub struct MarkupRenderer<S, C> {
    staging: S,
    screenshotter: C,
    layout: PageLayout,
    viewport_width: u32,
    scale: f64,
    settle_delay: Duration,
    readiness_timeout: Option<Duration>,
    jpeg_quality: u8,
}

impl<S, C> MarkupRenderer<S, C>
where
    S: StagingService,
    C: Screenshotter<S::Staged>,
{
    pub fn new(staging: S, screenshotter: C, config: &ConversionConfig) -> Self {
        Self {
            staging,
            screenshotter,
            layout: PageLayout::FullBleed(config.full_bleed),
            viewport_width: config.markup_viewport_width,
            scale: config.markup_scale,
            settle_delay: config.settle_delay(),
            readiness_timeout: config.readiness_timeout(),
            jpeg_quality: config.jpeg_quality,
        }
    }

    async fn wait_until_settled(&self, signals: ReadinessSignals) -> Result<(), RenderError> {
        match self.readiness_timeout {
            Some(limit) => tokio::time::timeout(limit, signals.join())
                .await
                .map_err(|_| RenderError::DecodeTimeout {
                    stage: "markup readiness",
                    after: limit,
                })?,
            None => signals.join().await,
        }
        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }
        Ok(())
    }
}

#[async_trait]
impl<S, C> FormatRenderer for MarkupRenderer<S, C>
where
    S: StagingService,
    C: Screenshotter<S::Staged>,
{
    fn layout(&self) -> PageLayout {
        self.layout
    }

    async fn render(&self, file: &SourceFile) -> Result<Surface, RenderError> {
        check_declared(file, FormatTag::MarkupHtml)?;

        let html = String::from_utf8_lossy(file.bytes());
        let document = stage_document(&html);

        let staged = self.staging.stage(&document, self.viewport_width).await?;
        let guard = StagingGuard::new(staged, file.name());

        self.wait_until_settled(guard.get().readiness()).await?;

        let (width, height) = guard.get().content_size().await?;
        if width == 0 || height == 0 {
            return Err(RenderError::UnreadableInput(format!(
                "staged document has no content ({width}x{height})"
            )));
        }

        let region = CaptureRegion {
            width,
            height,
            scale: self.scale,
        };
        let pixels = self.screenshotter.capture(guard.get(), region).await?;
        debug!(
            "Captured {} at {}x → {}x{} px",
            file.name(),
            self.scale,
            pixels.width(),
            pixels.height()
        );

        Ok(Surface::new(pixels)?
            .with_scale(self.scale)
            .with_encoding(SurfaceEncoding::Jpeg {
                quality: self.jpeg_quality,
            }))
    }
}

/// Owns a staged document and tears it down when dropped.
struct StagingGuard<D: StagedDocument> {
    doc: D,
    name: String,
}

impl<D: StagedDocument> StagingGuard<D> {
    fn new(doc: D, name: &str) -> Self {
        Self {
            doc,
            name: name.to_string(),
        }
    }

    fn get(&self) -> &D {
        &self.doc
    }
}

impl<D: StagedDocument> Drop for StagingGuard<D> {
    fn drop(&mut self) {
        self.doc.teardown();
        debug!("Tore down staging surface for {}", self.name);
    }
}

/// Wrap user markup so the baseline and capture stylesheets apply.
///
/// The styles go right after `<head>` so the document's own rules still win.
/// Fragments without `<html>`/`<head>` are wrapped in a full document.
pub fn stage_document(html: &str) -> String {
    let style = format!("<style>{BASELINE_STYLESHEET}{CAPTURE_STYLESHEET}</style>");

    if let Some(m) = HEAD_OPEN.find(html) {
        let mut out = String::with_capacity(html.len() + style.len());
        out.push_str(&html[..m.end()]);
        out.push_str(&style);
        out.push_str(&html[m.end()..]);
        return out;
    }
    if let Some(m) = HTML_OPEN.find(html) {
        let mut out = String::with_capacity(html.len() + style.len() + 13);
        out.push_str(&html[..m.end()]);
        out.push_str("<head>");
        out.push_str(&style);
        out.push_str("</head>");
        out.push_str(&html[m.end()..]);
        return out;
    }
    if html.trim().is_empty() {
        warn!("Staging an empty markup document");
    }
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\">{style}</head><body>{html}</body></html>"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Probe {
        staged_html: Mutex<Option<String>>,
        teardowns: AtomicUsize,
    }

    struct FakeStaging {
        probe: Arc<Probe>,
        stall_image: bool,
        size: (u32, u32),
    }

    struct FakeDoc {
        probe: Arc<Probe>,
        stall_image: bool,
        size: (u32, u32),
    }

    #[async_trait]
    impl StagedDocument for FakeDoc {
        fn readiness(&self) -> ReadinessSignals {
            let mut signals = ReadinessSignals::ready();
            signals.images.push(future::ready(()).boxed());
            if self.stall_image {
                signals.images.push(future::pending().boxed());
            }
            signals
        }

        async fn content_size(&self) -> Result<(u32, u32), RenderError> {
            Ok(self.size)
        }

        fn teardown(&mut self) {
            self.probe.teardowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl StagingService for FakeStaging {
        type Staged = FakeDoc;

        async fn stage(&self, html: &str, viewport_width: u32) -> Result<FakeDoc, RenderError> {
            assert_eq!(viewport_width, 1200);
            *self.probe.staged_html.lock().unwrap() = Some(html.to_string());
            Ok(FakeDoc {
                probe: Arc::clone(&self.probe),
                stall_image: self.stall_image,
                size: self.size,
            })
        }
    }

    struct FakeCamera {
        fail: bool,
    }

    #[async_trait]
    impl Screenshotter<FakeDoc> for FakeCamera {
        async fn capture(&self, _staged: &FakeDoc, region: CaptureRegion) -> Result<RgbImage, RenderError> {
            if self.fail {
                return Err(RenderError::UnreadableInput("capture failed".into()));
            }
            let w = (region.width as f64 * region.scale) as u32;
            let h = (region.height as f64 * region.scale) as u32;
            Ok(RgbImage::from_pixel(w, h, Rgb([255, 255, 255])))
        }
    }

    fn renderer(
        probe: &Arc<Probe>,
        stall_image: bool,
        fail: bool,
        config: &ConversionConfig,
    ) -> MarkupRenderer<FakeStaging, FakeCamera> {
        MarkupRenderer::new(
            FakeStaging {
                probe: Arc::clone(probe),
                stall_image,
                size: (1200, 800),
            },
            FakeCamera { fail },
            config,
        )
    }

    fn page() -> SourceFile {
        SourceFile::from_bytes("report.html", b"<html><head><title>t</title></head><body><p>x</p></body></html>".to_vec())
    }

    #[tokio::test(start_paused = true)]
    async fn captures_at_double_density_after_settle() {
        let probe = Arc::new(Probe::default());
        let r = renderer(&probe, false, false, &ConversionConfig::default());

        let start = tokio::time::Instant::now();
        let surface = r.render(&page()).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(1000));

        assert_eq!((surface.width(), surface.height()), (2400, 1600));
        assert_eq!(surface.scale(), 2.0);
        assert_eq!((surface.logical_width(), surface.logical_height()), (1200.0, 800.0));
        assert!(matches!(surface.encoding(), SurfaceEncoding::Jpeg { quality: 100 }));
        assert_eq!(probe.teardowns.load(Ordering::SeqCst), 1);

        let staged = probe.staged_html.lock().unwrap().clone().unwrap();
        assert!(staged.contains("box-sizing:border-box"));
        assert!(staged.contains("<title>t</title>"));
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_runs_when_capture_fails() {
        let probe = Arc::new(Probe::default());
        let r = renderer(&probe, false, true, &ConversionConfig::default());
        let err = r.render(&page()).await.unwrap_err();
        assert!(matches!(err, RenderError::UnreadableInput(_)));
        assert_eq!(probe.teardowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_image_blocks_past_settle_window() {
        let probe = Arc::new(Probe::default());
        let r = renderer(&probe, true, false, &ConversionConfig::default());
        let file = page();
        let outcome = tokio::time::timeout(Duration::from_secs(60), r.render(&file)).await;
        assert!(outcome.is_err(), "render should still be waiting");
        // Dropping the pending render released the surface.
        assert_eq!(probe.teardowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn readiness_timeout_turns_stall_into_error() {
        let probe = Arc::new(Probe::default());
        let config = ConversionConfig::builder()
            .readiness_timeout_ms(Some(5_000))
            .build()
            .unwrap();
        let r = renderer(&probe, true, false, &config);
        let err = r.render(&page()).await.unwrap_err();
        assert!(matches!(err, RenderError::DecodeTimeout { stage: "markup readiness", .. }));
        assert_eq!(probe.teardowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn raster_bytes_named_html_are_rejected_before_staging() {
        let probe = Arc::new(Probe::default());
        let r = renderer(&probe, false, false, &ConversionConfig::default());
        let file = SourceFile::from_bytes("page.html", vec![0xFF, 0xD8, 0xFF, 0xE0, 0, 0]);
        let err = r.render(&file).await.unwrap_err();
        assert!(matches!(err, RenderError::InvalidFormat { .. }));
        assert!(probe.staged_html.lock().unwrap().is_none());
        assert_eq!(probe.teardowns.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn stylesheet_goes_after_head() {
        let doc = stage_document("<HTML><Head lang=\"en\"><style>p{color:red}</style></Head></HTML>");
        let injected = doc.find("box-sizing").unwrap();
        let own = doc.find("color:red").unwrap();
        assert!(injected < own, "{doc}");
    }

    #[test]
    fn html_without_head_gets_one() {
        let doc = stage_document("<html><body>hi</body></html>");
        assert!(doc.starts_with("<html><head><style>"), "{doc}");
    }

    #[test]
    fn fragment_is_wrapped() {
        let doc = stage_document("<h1>Title</h1>");
        assert!(doc.starts_with("<!DOCTYPE html>"));
        assert!(doc.contains("<body><h1>Title</h1></body>"));
        assert!(doc.contains("antialiased"));
    }
}
