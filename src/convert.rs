//! Per-file conversion and the batch entry points.
//!
//! [`ConversionPipeline::convert`] takes one [`SourceFile`] through
//! validation, rendering, page fitting and assembly. It never returns an
//! error: every per-file problem becomes a [`ConversionResult::Failed`] so a
//! bad file cannot take its siblings down with it.
//!
//! [`convert_batch`] and [`convert_batch_to_dir`] wrap the
//! [`BatchScheduler`] for the common cases.

use crate::batch::BatchScheduler;
use crate::config::ConversionConfig;
use crate::delivery::{DeliveryTarget, DirectoryTarget};
use crate::error::{Any2PdfError, FileError};
use crate::output::{suggested_name, BatchReport, ConversionResult, ConvertedDocument};
use crate::pipeline::assemble::{assemble, DocumentAssembler, LopdfAssembler};
use crate::pipeline::encode::encode_surface;
use crate::pipeline::input::{FormatTag, SourceFile};
use crate::pipeline::render::{FormatRenderer, RendererRegistry};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Converts single files to single-page PDFs.
///
/// Renderer dispatch goes through a [`RendererRegistry`]; assembly goes
/// through a [`DocumentAssembler`]. Both can be replaced, which is how HTML
/// support (a [`crate::pipeline::markup::MarkupRenderer`]) is plugged in.
pub struct ConversionPipeline {
    registry: RendererRegistry,
    assembler: Arc<dyn DocumentAssembler>,
    config: ConversionConfig,
}

impl std::fmt::Debug for ConversionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionPipeline")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}

impl ConversionPipeline {
    /// Pipeline with the default renderers and the `lopdf` assembler.
    pub fn new(config: ConversionConfig) -> Self {
        Self {
            registry: RendererRegistry::with_defaults(&config),
            assembler: Arc::new(LopdfAssembler),
            config,
        }
    }

    pub fn with_registry(mut self, registry: RendererRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_assembler(mut self, assembler: Arc<dyn DocumentAssembler>) -> Self {
        self.assembler = assembler;
        self
    }

    /// Register (or replace) the renderer for one format.
    pub fn with_renderer(mut self, format: FormatTag, renderer: Arc<dyn FormatRenderer>) -> Self {
        self.registry.register(format, renderer);
        self
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    pub fn registry(&self) -> &RendererRegistry {
        &self.registry
    }

    /// Convert one file. Failures are returned as [`ConversionResult::Failed`].
    pub async fn convert(&self, file: SourceFile) -> ConversionResult {
        let start = Instant::now();
        match self.try_convert(&file).await {
            Ok(doc) => {
                info!(
                    "Converted {} → {} ({} bytes, {}ms)",
                    file.name(),
                    doc.file_name(),
                    doc.len(),
                    start.elapsed().as_millis()
                );
                ConversionResult::Converted(doc)
            }
            Err(e) => {
                warn!("{}", e);
                ConversionResult::failed(e)
            }
        }
    }

    async fn try_convert(&self, file: &SourceFile) -> Result<ConvertedDocument, FileError> {
        let format = self.validate(file)?;

        let renderer = self
            .registry
            .get(format)
            .ok_or_else(|| FileError::UnsupportedFormat {
                file: file.name().to_string(),
                extension: file.extension().unwrap_or(format.label()).to_string(),
            })?;

        let surface = renderer
            .render(file)
            .await
            .map_err(|e| e.into_file_error(file.name(), format))?;

        let geometry = renderer
            .layout()
            .fit(surface.logical_width(), surface.logical_height());
        debug!(
            "{}: {:?} page {:.1}x{:.1} {:?}, content {:.1}x{:.1} at ({:.1}, {:.1})",
            file.name(),
            geometry.orientation,
            geometry.page_width,
            geometry.page_height,
            geometry.unit,
            geometry.content_width,
            geometry.content_height,
            geometry.offset_x,
            geometry.offset_y
        );

        let assembler = Arc::clone(&self.assembler);
        let assembled = tokio::task::spawn_blocking(move || {
            let image = encode_surface(&surface)?;
            assemble(assembler.as_ref(), &geometry, &image)
        })
        .await;

        let assembly_failure = |detail: String| FileError::AssemblyFailure {
            file: file.name().to_string(),
            detail: format!("{} conversion failed: {detail}", format.label()),
        };
        let bytes = match assembled {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => return Err(assembly_failure(e.to_string())),
            Err(join) => return Err(assembly_failure(format!("assembly task panicked: {join}"))),
        };

        Ok(ConvertedDocument {
            source_name: file.name().to_string(),
            suggested_file_name: suggested_name(file.name()),
            format,
            geometry,
            bytes: bytes.into(),
        })
    }

    /// Declared format, then size. No renderer runs for a file failing here.
    fn validate(&self, file: &SourceFile) -> Result<FormatTag, FileError> {
        let format = file
            .declared_format()
            .ok_or_else(|| FileError::UnsupportedFormat {
                file: file.name().to_string(),
                extension: file.extension().unwrap_or("").to_string(),
            })?;

        if file.is_empty() {
            return Err(FileError::InvalidFile {
                file: file.name().to_string(),
                detail: "file is empty".into(),
            });
        }
        let limit = self.config.max_bytes(format);
        if file.len() > limit {
            return Err(FileError::InvalidFile {
                file: file.name().to_string(),
                detail: format!(
                    "{} file is {} but at most {} is allowed",
                    format.label(),
                    human_size(file.len()),
                    human_size(limit)
                ),
            });
        }
        Ok(format)
    }
}

fn human_size(bytes: u64) -> String {
    const MIB: f64 = 1024.0 * 1024.0;
    if bytes >= 1024 * 1024 {
        format!("{:.1} MiB", bytes as f64 / MIB)
    } else if bytes >= 1024 {
        format!("{:.1} KiB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} bytes")
    }
}

/// Convert a batch of in-memory files and hand the results to `target`.
///
/// Uses the default renderers (PNG, JPEG, SVG). Build a
/// [`ConversionPipeline`] and a [`BatchScheduler`] directly to add HTML.
///
/// # Errors
/// Returns `Err(Any2PdfError::TooManyFiles)` without converting anything when
/// the batch exceeds `config.max_batch_files`. Per-file failures are in the
/// report.
pub async fn convert_batch(
    files: Vec<SourceFile>,
    config: &ConversionConfig,
    target: Arc<dyn DeliveryTarget>,
) -> Result<BatchReport, Any2PdfError> {
    BatchScheduler::new(ConversionPipeline::new(config.clone()))
        .run(files, target)
        .await
}

/// Read `paths`, convert them and write the PDFs into `out_dir`.
///
/// The file-count limit is checked before any file is read. A path that
/// cannot be read aborts the batch.
pub async fn convert_batch_to_dir(
    paths: &[impl AsRef<Path>],
    out_dir: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<BatchReport, Any2PdfError> {
    if paths.len() > config.max_batch_files {
        return Err(Any2PdfError::TooManyFiles {
            submitted: paths.len(),
            limit: config.max_batch_files,
        });
    }

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        files.push(SourceFile::from_path(path).await?);
    }

    let target = DirectoryTarget::create(out_dir.as_ref()).await?;
    convert_batch(files, config, Arc::new(target)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FileErrorKind, RenderError};
    use crate::pipeline::fit::{Orientation, PageLayout};
    use crate::pipeline::render::Surface;
    use async_trait::async_trait;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRenderer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl FormatRenderer for CountingRenderer {
        fn layout(&self) -> PageLayout {
            PageLayout::Fixed(Default::default())
        }

        async fn render(&self, _file: &SourceFile) -> Result<Surface, RenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Surface::new(RgbImage::from_pixel(20, 10, Rgb([0, 0, 0])))
        }
    }

    fn png(w: u32, h: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([0, 128, 255])))
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[tokio::test]
    async fn png_converts_to_landscape_a4() {
        let pipeline = ConversionPipeline::new(ConversionConfig::default());
        let result = pipeline.convert(SourceFile::from_bytes("wide.png", png(200, 100))).await;
        let doc = result.document().expect("converted");
        assert_eq!(doc.file_name(), "wide_converted.pdf");
        assert_eq!(doc.geometry.orientation, Orientation::Landscape);
        assert_eq!((doc.geometry.page_width, doc.geometry.page_height), (297.0, 210.0));
        assert_eq!((doc.geometry.content_width, doc.geometry.content_height), (190.0, 95.0));
        assert_eq!((doc.geometry.offset_x, doc.geometry.offset_y), (53.5, 57.5));
        assert!(doc.bytes.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn empty_and_oversized_files_never_reach_a_renderer() {
        let renderer = Arc::new(CountingRenderer {
            calls: AtomicUsize::new(0),
        });
        let config = ConversionConfig::builder().raster_max_bytes(16).build().unwrap();
        let pipeline = ConversionPipeline::new(config).with_renderer(FormatTag::RasterPng, renderer.clone());

        let empty = pipeline.convert(SourceFile::from_bytes("empty.png", Vec::new())).await;
        let big = pipeline.convert(SourceFile::from_bytes("big.png", vec![0u8; 17])).await;
        let ok = pipeline.convert(SourceFile::from_bytes("ok.png", vec![0u8; 16])).await;

        assert_eq!(empty.error().unwrap().kind(), FileErrorKind::InvalidFile);
        assert_eq!(big.error().unwrap().kind(), FileErrorKind::InvalidFile);
        assert!(big.error().unwrap().to_string().contains("big.png"));
        assert!(ok.is_success());
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_extension_is_unsupported() {
        let pipeline = ConversionPipeline::new(ConversionConfig::default());
        let result = pipeline.convert(SourceFile::from_bytes("anim.gif", vec![1, 2, 3])).await;
        let err = result.error().unwrap();
        assert_eq!(err.kind(), FileErrorKind::UnsupportedFormat);
        assert_eq!(result.source_name(), "anim.gif");
    }

    #[tokio::test]
    async fn html_without_markup_renderer_is_unsupported() {
        let pipeline = ConversionPipeline::new(ConversionConfig::default());
        let result = pipeline.convert(SourceFile::from_bytes("page.html", b"<p>hi</p>".to_vec())).await;
        assert_eq!(result.error().unwrap().kind(), FileErrorKind::UnsupportedFormat);
    }

    #[tokio::test]
    async fn corrupt_png_is_wrapped_with_format_message() {
        let pipeline = ConversionPipeline::new(ConversionConfig::default());
        let mut bytes = png(8, 8);
        bytes.truncate(24);
        let result = pipeline.convert(SourceFile::from_bytes("bad.png", bytes)).await;
        let err = result.error().unwrap();
        assert_eq!(err.kind(), FileErrorKind::UnreadableInput);
        assert!(err.to_string().starts_with("bad.png: PNG conversion failed"), "{err}");
    }

    #[test]
    fn human_sizes() {
        assert_eq!(human_size(12), "12 bytes");
        assert_eq!(human_size(2048), "2.0 KiB");
        assert_eq!(human_size(15 * 1024 * 1024), "15.0 MiB");
    }
}
