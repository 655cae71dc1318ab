//! Vector inputs: SVG rasterised with `resvg` at its intrinsic size.
//!
//! The tree is parsed by `usvg` (which resolves CSS, `<use>` and text into
//! paths) and painted by `resvg` onto an opaque white pixmap. Documents that
//! declare neither `width`/`height` nor a `viewBox` get the configured default
//! square. Parser and pixmap both live only inside the blocking closure, so
//! they are dropped on every exit path.

use crate::config::ConversionConfig;
use crate::error::RenderError;
use crate::pipeline::fit::PageLayout;
use crate::pipeline::input::{FormatTag, SourceFile};
use crate::pipeline::render::{check_declared, decode_blocking, FormatRenderer, Surface};
use async_trait::async_trait;
use image::RgbImage;
use once_cell::sync::Lazy;
use regex::Regex;
use resvg::tiny_skia;
use resvg::usvg;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Largest pixmap side accepted before rasterising.
const MAX_SIDE_PX: u32 = 16_384;

/// Opening tag of the root `<svg>` element.
static ROOT_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<svg\b[^>]*>").unwrap());

/// A sizing attribute inside a tag; `stroke-width` and the like do not match.
static SIZE_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\s)(?:width|height|viewBox)\s*=").unwrap());

/// System fonts, loaded once per process for `<text>` elements.
static FONTS: Lazy<Arc<usvg::fontdb::Database>> = Lazy::new(|| {
    let mut db = usvg::fontdb::Database::new();
    db.load_system_fonts();
    debug!("Loaded {} font faces for SVG text", db.len());
    Arc::new(db)
});

/// Renderer for [`FormatTag::VectorSvg`].
#[derive(Debug, Clone)]
pub struct VectorRenderer {
    layout: PageLayout,
    default_size: u32,
    decode_timeout: Duration,
}

impl VectorRenderer {
    pub fn new(config: &ConversionConfig) -> Self {
        Self {
            layout: PageLayout::Fixed(config.vector_page),
            default_size: config.vector_default_size,
            decode_timeout: config.decode_timeout(),
        }
    }
}

#[async_trait]
impl FormatRenderer for VectorRenderer {
    fn layout(&self) -> PageLayout {
        self.layout
    }

    async fn render(&self, file: &SourceFile) -> Result<Surface, RenderError> {
        check_declared(file, FormatTag::VectorSvg)?;

        let bytes = file.bytes().to_vec();
        let default_size = self.default_size;
        let surface = decode_blocking("SVG rasterisation", self.decode_timeout, move || {
            rasterise(&bytes, default_size)
        })
        .await?;

        debug!(
            "Rasterised {} → {}x{} px",
            file.name(),
            surface.width(),
            surface.height()
        );
        Ok(surface)
    }
}

fn rasterise(bytes: &[u8], default_size: u32) -> Result<Surface, RenderError> {
    let mut options = usvg::Options {
        fontdb: Arc::clone(&FONTS),
        ..usvg::Options::default()
    };
    if let Some(size) = usvg::Size::from_wh(default_size as f32, default_size as f32) {
        options.default_size = size;
    }

    let tree = usvg::Tree::from_data(bytes, &options)
        .map_err(|e| RenderError::UnreadableInput(format!("SVG parse error: {e}")))?;

    // usvg sizes an undeclared root by its content bounds; stretch that
    // uniformly onto the default square instead.
    let size = tree.size();
    let (width, height, transform) = if declares_size(bytes) {
        (
            size.width().ceil() as u32,
            size.height().ceil() as u32,
            tiny_skia::Transform::default(),
        )
    } else {
        let side = default_size as f32;
        let scale = (side / size.width()).min(side / size.height());
        (default_size, default_size, tiny_skia::Transform::from_scale(scale, scale))
    };
    if width == 0 || height == 0 || width > MAX_SIDE_PX || height > MAX_SIDE_PX {
        return Err(RenderError::UnreadableInput(format!(
            "SVG intrinsic size {}x{} is outside 1..={MAX_SIDE_PX} px",
            size.width(),
            size.height()
        )));
    }

    let mut pixmap = tiny_skia::Pixmap::new(width, height).ok_or_else(|| {
        RenderError::UnreadableInput(format!("cannot allocate {width}x{height} pixmap"))
    })?;
    pixmap.fill(tiny_skia::Color::WHITE);
    resvg::render(&tree, transform, &mut pixmap.as_mut());

    // Every pixel is opaque after the white fill, so premultiplied RGB equals
    // straight RGB and alpha can be dropped.
    let rgb: Vec<u8> = pixmap
        .data()
        .chunks_exact(4)
        .flat_map(|px| [px[0], px[1], px[2]])
        .collect();
    let pixels = RgbImage::from_raw(width, height, rgb).ok_or_else(|| {
        RenderError::UnreadableInput("pixmap buffer size mismatch".into())
    })?;
    Surface::new(pixels)
}

/// Whether the root element carries `width`, `height` or `viewBox`.
fn declares_size(bytes: &[u8]) -> bool {
    let text = String::from_utf8_lossy(bytes);
    ROOT_TAG
        .find(&text)
        .is_some_and(|tag| SIZE_ATTR.is_match(tag.as_str()))
}
