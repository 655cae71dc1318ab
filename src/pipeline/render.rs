//! Rendering: turn one [`SourceFile`] into a rasterised [`Surface`].
//!
//! Each supported format has one [`FormatRenderer`]. The pipeline never
//! branches on format itself; it looks the renderer up in a
//! [`RendererRegistry`], so supporting a new format means registering one
//! more entry.
//!
//! Decoding is CPU-bound, so the raster and vector renderers run it inside
//! `spawn_blocking` under a decode timeout. The markup renderer spends its
//! time waiting on external signals instead (see [`super::markup`]).

use crate::config::ConversionConfig;
use crate::error::RenderError;
use crate::pipeline::fit::PageLayout;
use crate::pipeline::input::{FormatTag, SourceFile};
use crate::pipeline::raster::RasterRenderer;
use crate::pipeline::vector::VectorRenderer;
use async_trait::async_trait;
use image::RgbImage;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// How a surface should be embedded in the document.
#[derive(Debug, Clone)]
pub enum SurfaceEncoding {
    /// Lossless (Flate-compressed raw pixels).
    Lossless,
    /// Re-encode as JPEG at the given quality (1–100).
    Jpeg { quality: u8 },
    /// Embed these already-encoded JPEG bytes unchanged.
    Passthrough(Arc<[u8]>),
}

/// A decoded, opaque raster ready for page fitting.
pub struct Surface {
    pixels: RgbImage,
    /// Device pixels per logical unit (2.0 for a HiDPI screenshot).
    scale: f64,
    encoding: SurfaceEncoding,
}

impl Surface {
    /// Wrap decoded pixels at 1:1 scale, embedded losslessly.
    pub fn new(pixels: RgbImage) -> Result<Self, RenderError> {
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(RenderError::UnreadableInput(format!(
                "decoded surface is empty ({}x{})",
                pixels.width(),
                pixels.height()
            )));
        }
        Ok(Self {
            pixels,
            scale: 1.0,
            encoding: SurfaceEncoding::Lossless,
        })
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = if scale > 0.0 { scale } else { 1.0 };
        self
    }

    pub fn with_encoding(mut self, encoding: SurfaceEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Width in logical units (pixels divided by the capture scale).
    pub fn logical_width(&self) -> f64 {
        self.pixels.width() as f64 / self.scale
    }

    /// Height in logical units.
    pub fn logical_height(&self) -> f64 {
        self.pixels.height() as f64 / self.scale
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.pixels.width() as f64 / self.pixels.height() as f64
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn encoding(&self) -> &SurfaceEncoding {
        &self.encoding
    }
}

impl fmt::Debug for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("scale", &self.scale)
            .field("encoding", &self.encoding)
            .finish()
    }
}

/// Converts one input file into a [`Surface`].
#[async_trait]
pub trait FormatRenderer: Send + Sync {
    /// Page layout surfaces from this renderer are fitted with.
    fn layout(&self) -> PageLayout;

    /// Decode or rasterise `file`.
    async fn render(&self, file: &SourceFile) -> Result<Surface, RenderError>;
}

/// Registered mapping from format tag to renderer.
#[derive(Clone, Default)]
pub struct RendererRegistry {
    renderers: HashMap<FormatTag, Arc<dyn FormatRenderer>>,
}

impl RendererRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the renderers that need no external collaborator:
    /// raster (PNG, JPEG) and vector (SVG).
    ///
    /// HTML needs a staging backend; register a
    /// [`crate::pipeline::markup::MarkupRenderer`] for
    /// [`FormatTag::MarkupHtml`] to enable it.
    pub fn with_defaults(config: &ConversionConfig) -> Self {
        let raster: Arc<dyn FormatRenderer> = Arc::new(RasterRenderer::new(config));
        let mut registry = Self::new();
        registry.register(FormatTag::RasterJpeg, Arc::clone(&raster));
        registry.register(FormatTag::RasterPng, raster);
        registry.register(FormatTag::VectorSvg, Arc::new(VectorRenderer::new(config)));
        registry
    }

    /// Register (or replace) the renderer for `format`.
    pub fn register(&mut self, format: FormatTag, renderer: Arc<dyn FormatRenderer>) -> &mut Self {
        self.renderers.insert(format, renderer);
        self
    }

    pub fn get(&self, format: FormatTag) -> Option<Arc<dyn FormatRenderer>> {
        self.renderers.get(&format).cloned()
    }

    pub fn supports(&self, format: FormatTag) -> bool {
        self.renderers.contains_key(&format)
    }
}

impl fmt::Debug for RendererRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut formats: Vec<_> = self.renderers.keys().map(|k| k.label()).collect();
        formats.sort_unstable();
        f.debug_struct("RendererRegistry")
            .field("formats", &formats)
            .finish()
    }
}

/// Reject content whose sniffed format contradicts the declared one.
///
/// Unknown content is let through; the decoder reports it as unreadable.
pub(crate) fn check_declared(file: &SourceFile, declared: FormatTag) -> Result<(), RenderError> {
    match file.sniffed_format() {
        Some(detected) if detected != declared => Err(RenderError::InvalidFormat { declared, detected }),
        _ => Ok(()),
    }
}

/// Run a CPU-bound decode on the blocking pool, bounded by `limit`.
pub(crate) async fn decode_blocking<T, F>(
    stage: &'static str,
    limit: Duration,
    f: F,
) -> Result<T, RenderError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, RenderError> + Send + 'static,
{
    match tokio::time::timeout(limit, tokio::task::spawn_blocking(f)).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => Err(RenderError::UnreadableInput(format!(
            "{stage} task panicked: {join}"
        ))),
        Err(_) => Err(RenderError::DecodeTimeout { stage, after: limit }),
    }
}
