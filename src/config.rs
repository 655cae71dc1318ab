//! Configuration types for batch document-to-PDF conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. One struct holds every knob so a
//! config can be shared across tasks and logged as a whole.

use crate::error::Any2PdfError;
use crate::pipeline::fit::{FixedPage, FullBleed};
use crate::pipeline::input::FormatTag;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

const MIB: u64 = 1024 * 1024;

/// Configuration for a conversion batch.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_any2pdf::{ConversionConfig, HostProfile};
///
/// let config = ConversionConfig::builder()
///     .group_size(2)
///     .host_profile(HostProfile::UnreliableDownloads)
///     .settle_delay_ms(500)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Conversions running concurrently within one group. Default: 3.
    ///
    /// Groups run strictly one after another, so this is also the cap on
    /// in-flight conversions for the whole batch.
    pub group_size: usize,

    /// Largest number of files one batch may carry. Default: 10.
    ///
    /// Larger submissions are rejected before any work starts.
    pub max_batch_files: usize,

    /// Size limit for PNG and JPEG inputs. Default: 10 MiB.
    pub raster_max_bytes: u64,

    /// Size limit for HTML inputs. Default: 10 MiB.
    pub markup_max_bytes: u64,

    /// Size limit for SVG inputs. Default: 15 MiB.
    pub vector_max_bytes: u64,

    /// Paper used for raster inputs. Default: A4, 10 mm margin, landscape
    /// for anything wider than tall.
    pub page: FixedPage,

    /// Paper used for vector inputs. Default: A4, 10 mm margin, landscape
    /// only above a 1.2 aspect ratio.
    pub vector_page: FixedPage,

    /// Caps for markup pages, which are sized to their content. Default:
    /// 1200 × 1700 pt against the A4 aspect.
    pub full_bleed: FullBleed,

    /// Side length used when an SVG declares no intrinsic size. Default: 1000.
    pub vector_default_size: u32,

    /// Width of the off-screen markup viewport in CSS pixels. Default: 1200.
    pub markup_viewport_width: u32,

    /// Device pixel ratio of markup screenshots. Range: 1.0–4.0. Default: 2.0.
    pub markup_scale: f64,

    /// Extra wait after every markup readiness signal fired. Default: 1000 ms.
    ///
    /// Covers late layout work (web fonts swapping in, script-driven DOM
    /// changes) that no signal reports. Set to 0 to rely on the signals alone.
    pub settle_delay_ms: u64,

    /// Upper bound on the markup readiness join. Default: None (wait forever).
    ///
    /// With `None` a resource that never signals stalls its own slot; the
    /// other conversions of its group still complete.
    pub readiness_timeout_ms: Option<u64>,

    /// JPEG quality for markup screenshots. Range: 1–100. Default: 100.
    pub jpeg_quality: u8,

    /// Limit on decoding one raster or vector input. Default: 30 s.
    pub decode_timeout_secs: u64,

    /// How converted documents are handed to the delivery target.
    /// Default: [`DeliveryMode::Staggered`] with a 200 ms stagger.
    pub delivery: DeliveryMode,

    /// Optional progress callback for batch and per-file events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            group_size: 3,
            max_batch_files: 10,
            raster_max_bytes: 10 * MIB,
            markup_max_bytes: 10 * MIB,
            vector_max_bytes: 15 * MIB,
            page: FixedPage::default(),
            vector_page: FixedPage::a4_drawing(),
            full_bleed: FullBleed::default(),
            vector_default_size: 1000,
            markup_viewport_width: 1200,
            markup_scale: 2.0,
            settle_delay_ms: 1000,
            readiness_timeout_ms: None,
            jpeg_quality: 100,
            decode_timeout_secs: 30,
            delivery: DeliveryMode::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("group_size", &self.group_size)
            .field("max_batch_files", &self.max_batch_files)
            .field("raster_max_bytes", &self.raster_max_bytes)
            .field("markup_max_bytes", &self.markup_max_bytes)
            .field("vector_max_bytes", &self.vector_max_bytes)
            .field("page", &self.page)
            .field("vector_page", &self.vector_page)
            .field("full_bleed", &self.full_bleed)
            .field("markup_scale", &self.markup_scale)
            .field("settle_delay_ms", &self.settle_delay_ms)
            .field("readiness_timeout_ms", &self.readiness_timeout_ms)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("delivery", &self.delivery)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Size limit that applies to inputs of `format`.
    pub fn max_bytes(&self, format: FormatTag) -> u64 {
        match format {
            FormatTag::RasterJpeg | FormatTag::RasterPng => self.raster_max_bytes,
            FormatTag::MarkupHtml => self.markup_max_bytes,
            FormatTag::VectorSvg => self.vector_max_bytes,
        }
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn readiness_timeout(&self) -> Option<Duration> {
        self.readiness_timeout_ms.map(Duration::from_millis)
    }

    pub fn decode_timeout(&self) -> Duration {
        Duration::from_secs(self.decode_timeout_secs)
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn group_size(mut self, n: usize) -> Self {
        self.config.group_size = n.max(1);
        self
    }

    pub fn max_batch_files(mut self, n: usize) -> Self {
        self.config.max_batch_files = n.max(1);
        self
    }

    pub fn raster_max_bytes(mut self, bytes: u64) -> Self {
        self.config.raster_max_bytes = bytes;
        self
    }

    pub fn markup_max_bytes(mut self, bytes: u64) -> Self {
        self.config.markup_max_bytes = bytes;
        self
    }

    pub fn vector_max_bytes(mut self, bytes: u64) -> Self {
        self.config.vector_max_bytes = bytes;
        self
    }

    pub fn page(mut self, page: FixedPage) -> Self {
        self.config.page = page;
        self
    }

    pub fn vector_page(mut self, page: FixedPage) -> Self {
        self.config.vector_page = page;
        self
    }

    pub fn full_bleed(mut self, bleed: FullBleed) -> Self {
        self.config.full_bleed = bleed;
        self
    }

    pub fn vector_default_size(mut self, px: u32) -> Self {
        self.config.vector_default_size = px.max(1);
        self
    }

    pub fn markup_viewport_width(mut self, px: u32) -> Self {
        self.config.markup_viewport_width = px.max(1);
        self
    }

    pub fn markup_scale(mut self, scale: f64) -> Self {
        self.config.markup_scale = scale.clamp(1.0, 4.0);
        self
    }

    pub fn settle_delay_ms(mut self, ms: u64) -> Self {
        self.config.settle_delay_ms = ms;
        self
    }

    pub fn readiness_timeout_ms(mut self, ms: Option<u64>) -> Self {
        self.config.readiness_timeout_ms = ms;
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q.clamp(1, 100);
        self
    }

    pub fn decode_timeout_secs(mut self, secs: u64) -> Self {
        self.config.decode_timeout_secs = secs.max(1);
        self
    }

    pub fn delivery(mut self, mode: DeliveryMode) -> Self {
        self.config.delivery = mode;
        self
    }

    /// Pick the delivery mode matching what the host tolerates.
    pub fn host_profile(mut self, profile: HostProfile) -> Self {
        self.config.delivery = profile.delivery_mode();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Any2PdfError> {
        let c = &self.config;
        if c.group_size == 0 {
            return Err(Any2PdfError::InvalidConfig("Group size must be ≥ 1".into()));
        }
        if c.group_size > c.max_batch_files {
            return Err(Any2PdfError::InvalidConfig(format!(
                "Group size ({}) cannot exceed the batch limit ({})",
                c.group_size, c.max_batch_files
            )));
        }
        if c.raster_max_bytes == 0 || c.markup_max_bytes == 0 || c.vector_max_bytes == 0 {
            return Err(Any2PdfError::InvalidConfig(
                "Per-format size limits must be > 0".into(),
            ));
        }
        for page in [&c.page, &c.vector_page] {
            if !(page.width > 2.0 * page.margin && page.height > 2.0 * page.margin) || page.margin < 0.0 {
                return Err(Any2PdfError::InvalidConfig(format!(
                    "Page {}x{} leaves no room inside a {} margin",
                    page.width, page.height, page.margin
                )));
            }
            if !(page.landscape_above > 0.0) {
                return Err(Any2PdfError::InvalidConfig(
                    "Landscape threshold must be > 0".into(),
                ));
            }
        }
        let bleed = &c.full_bleed;
        if !(bleed.max_width > 0.0 && bleed.max_height > 0.0 && bleed.reference_aspect > 0.0) {
            return Err(Any2PdfError::InvalidConfig(
                "Full-bleed caps and reference aspect must be > 0".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How completed documents reach the delivery target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum DeliveryMode {
    /// All documents of a group are released together: the first at once,
    /// each next one `stagger_ms` after the previous.
    Staggered { stagger_ms: u64 },
    /// Documents go through a FIFO drained by one worker, which waits
    /// `delay_ms` after each handoff. Never two deliveries in flight.
    Serialized { delay_ms: u64 },
}

impl Default for DeliveryMode {
    fn default() -> Self {
        DeliveryMode::Staggered { stagger_ms: 200 }
    }
}

impl DeliveryMode {
    pub fn is_serialized(&self) -> bool {
        matches!(self, DeliveryMode::Serialized { .. })
    }
}

/// Whether the host reliably accepts several downloads in quick succession.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HostProfile {
    /// Rapid handoffs are fine (desktop browsers, file systems).
    #[default]
    ReliableDownloads,
    /// Rapid handoffs get dropped or blocked (mobile browsers).
    UnreliableDownloads,
}

impl HostProfile {
    pub fn delivery_mode(&self) -> DeliveryMode {
        match self {
            HostProfile::ReliableDownloads => DeliveryMode::Staggered { stagger_ms: 200 },
            HostProfile::UnreliableDownloads => DeliveryMode::Serialized { delay_ms: 1000 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ConversionConfig::default();
        assert_eq!(c.group_size, 3);
        assert_eq!(c.max_batch_files, 10);
        assert_eq!(c.max_bytes(FormatTag::RasterPng), 10 * MIB);
        assert_eq!(c.max_bytes(FormatTag::MarkupHtml), 10 * MIB);
        assert_eq!(c.max_bytes(FormatTag::VectorSvg), 15 * MIB);
        assert_eq!(c.settle_delay(), Duration::from_millis(1000));
        assert_eq!(c.readiness_timeout(), None);
        assert_eq!(c.delivery, DeliveryMode::Staggered { stagger_ms: 200 });
    }

    #[test]
    fn builder_clamps() {
        let c = ConversionConfig::builder()
            .group_size(0)
            .markup_scale(9.0)
            .jpeg_quality(0)
            .build()
            .unwrap();
        assert_eq!(c.group_size, 1);
        assert_eq!(c.markup_scale, 4.0);
        assert_eq!(c.jpeg_quality, 1);
    }

    #[test]
    fn host_profile_selects_delivery_mode() {
        let c = ConversionConfig::builder()
            .host_profile(HostProfile::UnreliableDownloads)
            .build()
            .unwrap();
        assert_eq!(c.delivery, DeliveryMode::Serialized { delay_ms: 1000 });
        assert!(c.delivery.is_serialized());
    }

    #[test]
    fn group_larger_than_batch_is_rejected() {
        let err = ConversionConfig::builder()
            .group_size(5)
            .max_batch_files(4)
            .build()
            .unwrap_err();
        assert!(matches!(err, Any2PdfError::InvalidConfig(_)));
    }

    #[test]
    fn margin_swallowing_page_is_rejected() {
        let page = FixedPage {
            margin: 120.0,
            ..FixedPage::a4()
        };
        let err = ConversionConfig::builder().page(page).build().unwrap_err();
        assert!(err.to_string().contains("margin"), "got: {err}");
    }

    #[test]
    fn vector_page_is_validated_and_defaults_to_drawing_threshold() {
        let c = ConversionConfig::default();
        assert_eq!(c.page.landscape_above, 1.0);
        assert_eq!(c.vector_page.landscape_above, 1.2);

        let page = FixedPage {
            landscape_above: 0.0,
            ..FixedPage::a4_drawing()
        };
        let err = ConversionConfig::builder().vector_page(page).build().unwrap_err();
        assert!(err.to_string().contains("Landscape"), "got: {err}");
    }

    #[test]
    fn delivery_mode_serialises_tagged() {
        let json = serde_json::to_string(&DeliveryMode::Serialized { delay_ms: 1500 }).unwrap();
        assert_eq!(json, r#"{"mode":"serialized","delay_ms":1500}"#);
    }
}
