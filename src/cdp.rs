//! Headless Chrome backend for HTML inputs (feature `cdp`).
//!
//! Each staged document gets its own tab, loaded from a temporary `.html`
//! file so documents of any size work. The tab's window is resized to the
//! requested viewport width before the document loads. Readiness signals and the content size
//! are read through `Runtime.evaluate`; the capture is a clipped
//! `Page.captureScreenshot` at the requested scale. `headless_chrome` is a
//! blocking API, so every call runs on the blocking pool.

use crate::error::RenderError;
use crate::pipeline::markup::{CaptureRegion, ReadinessSignals, Screenshotter, StagedDocument, StagingService};
use crate::pipeline::raster::flatten_onto_white;
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::Page;
use headless_chrome::types::Bounds;
use headless_chrome::{Browser, LaunchOptions};
use image::{ImageFormat, RgbImage};
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, warn};

/// Tallest viewport the browser window is opened with.
const WINDOW_HEIGHT: u32 = 1700;

const LOAD_SIGNAL: &str = "new Promise(r => document.readyState === 'complete' \
    ? r(true) : window.addEventListener('load', () => r(true), { once: true }))";
const FONTS_SIGNAL: &str = "document.fonts.ready.then(() => true)";
const IMAGE_COUNT: &str = "document.images.length";
const CONTENT_SIZE: &str = "[document.body.scrollWidth, document.body.scrollHeight]";

fn image_signal(index: u64) -> String {
    format!(
        "new Promise(r => {{ const i = document.images[{index}]; \
         if (!i || i.complete) {{ r(true); return; }} \
         i.addEventListener('load', () => r(true), {{ once: true }}); \
         i.addEventListener('error', () => r(true), {{ once: true }}); }})"
    )
}

fn cdp_error(context: &str, e: impl std::fmt::Display) -> RenderError {
    RenderError::UnreadableInput(format!("{context}: {e}"))
}

async fn blocking<T, F>(context: &'static str, f: F) -> Result<T, RenderError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, RenderError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| cdp_error(context, e))?
}

/// Window bounds giving a viewport `width` CSS pixels wide.
fn viewport_bounds(width: u32) -> Bounds {
    Bounds::Normal {
        left: None,
        top: None,
        width: Some(f64::from(width)),
        height: Some(f64::from(WINDOW_HEIGHT)),
    }
}

/// Stages HTML in tabs of one shared headless Chrome process.
#[derive(Clone)]
pub struct ChromeStaging {
    browser: Arc<Browser>,
}

impl ChromeStaging {
    /// Launch headless Chrome with a window `viewport_width` CSS pixels wide.
    ///
    /// This only sets the initial window; [`StagingService::stage`] resizes
    /// each tab to the width it is asked for. Blocks while the browser starts.
    pub fn launch(viewport_width: u32) -> Result<Self, RenderError> {
        let options = LaunchOptions::default_builder()
            .headless(true)
            .window_size(Some((viewport_width, WINDOW_HEIGHT)))
            .build()
            .map_err(|e| cdp_error("launch options", e))?;
        let browser = Browser::new(options).map_err(|e| cdp_error("launching Chrome", e))?;
        debug!("Launched headless Chrome ({}px viewport)", viewport_width);
        Ok(Self {
            browser: Arc::new(browser),
        })
    }
}

/// One document open in its own tab.
pub struct ChromeDocument {
    tab: Arc<Tab>,
    image_count: u64,
    source: Option<tempfile::NamedTempFile>,
}

#[async_trait]
impl StagingService for ChromeStaging {
    type Staged = ChromeDocument;

    async fn stage(&self, html: &str, viewport_width: u32) -> Result<ChromeDocument, RenderError> {
        let browser = Arc::clone(&self.browser);
        let html = html.to_string();
        blocking("staging", move || {
            let mut source = tempfile::Builder::new()
                .prefix("any2pdf-")
                .suffix(".html")
                .tempfile()
                .map_err(|e| cdp_error("staging file", e))?;
            source
                .write_all(html.as_bytes())
                .map_err(|e| cdp_error("staging file", e))?;

            let url = format!("file://{}", source.path().display());
            let tab = browser.new_tab().map_err(|e| cdp_error("opening tab", e))?;
            tab.set_bounds(viewport_bounds(viewport_width))
                .map_err(|e| cdp_error("sizing viewport", e))?;
            tab.navigate_to(&url)
                .and_then(|t| t.wait_until_navigated())
                .map_err(|e| cdp_error("loading document", e))?;

            let image_count = tab
                .evaluate(IMAGE_COUNT, false)
                .map_err(|e| cdp_error("counting images", e))?
                .value
                .and_then(|v| v.as_u64())
                .unwrap_or(0);

            Ok(ChromeDocument {
                tab,
                image_count,
                source: Some(source),
            })
        })
        .await
    }
}

impl ChromeDocument {
    /// Future resolving once `expression` (a promise) settles, either way.
    fn signal(&self, expression: String) -> BoxFuture<'static, ()> {
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || {
            if let Err(e) = tab.evaluate(&expression, true) {
                debug!("Readiness probe failed, treating as fired: {}", e);
            }
        })
        .map(|_| ())
        .boxed()
    }
}

#[async_trait]
impl StagedDocument for ChromeDocument {
    fn readiness(&self) -> ReadinessSignals {
        ReadinessSignals {
            loaded: self.signal(LOAD_SIGNAL.to_string()),
            images: (0..self.image_count).map(|i| self.signal(image_signal(i))).collect(),
            fonts: self.signal(FONTS_SIGNAL.to_string()),
        }
    }

    async fn content_size(&self) -> Result<(u32, u32), RenderError> {
        let tab = Arc::clone(&self.tab);
        blocking("measuring content", move || {
            let value = tab
                .evaluate(CONTENT_SIZE, false)
                .map_err(|e| cdp_error("measuring content", e))?
                .value
                .ok_or_else(|| cdp_error("measuring content", "no value"))?;
            let dims: Vec<u32> = value
                .as_array()
                .map(|a| a.iter().filter_map(|v| v.as_u64()).map(|v| v as u32).collect())
                .unwrap_or_default();
            match dims.as_slice() {
                [w, h] => Ok((*w, *h)),
                _ => Err(cdp_error("measuring content", format!("unexpected value {value}"))),
            }
        })
        .await
    }

    fn teardown(&mut self) {
        if let Err(e) = self.tab.close(false) {
            warn!("Failed to close staging tab: {}", e);
        }
        self.source.take();
    }
}

/// Screenshots staged tabs.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromeScreenshotter;

#[async_trait]
impl Screenshotter<ChromeDocument> for ChromeScreenshotter {
    async fn capture(&self, staged: &ChromeDocument, region: CaptureRegion) -> Result<RgbImage, RenderError> {
        let tab = Arc::clone(&staged.tab);
        blocking("screenshot", move || {
            let clip = Page::Viewport {
                x: 0.0,
                y: 0.0,
                width: region.width as f64,
                height: region.height as f64,
                scale: region.scale,
            };
            let png = tab
                .capture_screenshot(Page::CaptureScreenshotFormatOption::Png, None, Some(clip), true)
                .map_err(|e| cdp_error("screenshot", e))?;
            let image = image::load_from_memory_with_format(&png, ImageFormat::Png)
                .map_err(|e| cdp_error("decoding screenshot", e))?;
            Ok(flatten_onto_white(&image.to_rgba8()))
        })
        .await
    }
}
