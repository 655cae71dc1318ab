//! Raster inputs: PNG and JPEG decoded straight into a [`Surface`].
//!
//! No resampling happens here: the source pixel dimensions reach the page
//! fitter unchanged. PNG alpha is composited onto opaque white because PDF
//! image XObjects carry no transparency in our output. JPEG has no alpha and
//! its original bytes are embedded as-is whenever the colour model allows.

use crate::config::ConversionConfig;
use crate::error::RenderError;
use crate::pipeline::fit::PageLayout;
use crate::pipeline::input::{FormatTag, SourceFile};
use crate::pipeline::render::{check_declared, decode_blocking, FormatRenderer, Surface, SurfaceEncoding};
use async_trait::async_trait;
use image::{ColorType, ImageFormat, RgbImage, RgbaImage};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Renderer for [`FormatTag::RasterPng`] and [`FormatTag::RasterJpeg`].
#[derive(Debug, Clone)]
pub struct RasterRenderer {
    layout: PageLayout,
    decode_timeout: Duration,
}

impl RasterRenderer {
    pub fn new(config: &ConversionConfig) -> Self {
        Self {
            layout: PageLayout::Fixed(config.page),
            decode_timeout: config.decode_timeout(),
        }
    }
}

#[async_trait]
impl FormatRenderer for RasterRenderer {
    fn layout(&self) -> PageLayout {
        self.layout
    }

    async fn render(&self, file: &SourceFile) -> Result<Surface, RenderError> {
        let declared = match file.declared_format() {
            Some(f @ (FormatTag::RasterPng | FormatTag::RasterJpeg)) => f,
            other => {
                return Err(RenderError::UnreadableInput(format!(
                    "raster renderer cannot decode {}",
                    other.map(|f| f.label()).unwrap_or("unknown content")
                )))
            }
        };
        check_declared(file, declared)?;

        let bytes: Arc<[u8]> = Arc::from(file.bytes());
        let surface = decode_blocking("image decode", self.decode_timeout, move || match declared {
            FormatTag::RasterPng => decode_png(&bytes),
            _ => decode_jpeg(bytes),
        })
        .await?;

        debug!(
            "Decoded {} → {}x{} px",
            file.name(),
            surface.width(),
            surface.height()
        );
        Ok(surface)
    }
}

fn decode_png(bytes: &[u8]) -> Result<Surface, RenderError> {
    let image = image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .map_err(|e| RenderError::UnreadableInput(e.to_string()))?;
    Surface::new(flatten_onto_white(&image.to_rgba8()))
}

fn decode_jpeg(bytes: Arc<[u8]>) -> Result<Surface, RenderError> {
    let image = image::load_from_memory_with_format(&bytes, ImageFormat::Jpeg)
        .map_err(|e| RenderError::UnreadableInput(e.to_string()))?;

    // DCTDecode streams are tagged DeviceRGB by the assembler. The decoder
    // reports CMYK as Rgb8 after converting it, so the frame header decides.
    let passthrough = jpeg_components(&bytes) == Some(3) && matches!(image.color(), ColorType::Rgb8);
    let surface = Surface::new(image.to_rgb8())?;
    Ok(if passthrough {
        surface.with_encoding(SurfaceEncoding::Passthrough(bytes))
    } else {
        surface
    })
}

/// Number of colour components declared by a JPEG frame header.
///
/// Walks the marker segments up to the first SOFn. `None` when the stream
/// ends, reaches scan data first, or is not a JPEG at all.
pub(crate) fn jpeg_components(bytes: &[u8]) -> Option<u8> {
    if !bytes.starts_with(&[0xFF, 0xD8]) {
        return None;
    }
    let mut pos = 2;
    loop {
        if *bytes.get(pos)? != 0xFF {
            return None;
        }
        // Fill bytes may pad before the marker code.
        while *bytes.get(pos + 1)? == 0xFF {
            pos += 1;
        }
        let marker = bytes[pos + 1];
        pos += 2;
        match marker {
            0x01 | 0xD0..=0xD7 => continue,
            // SOF0..SOF15, minus DHT (C4), JPG (C8) and DAC (CC).
            0xC0..=0xCF if !matches!(marker, 0xC4 | 0xC8 | 0xCC) => {
                // length(2) precision(1) height(2) width(2) components(1)
                return bytes.get(pos + 7).copied();
            }
            0xDA | 0xD9 => return None,
            _ => {
                let len = u16::from_be_bytes([*bytes.get(pos)?, *bytes.get(pos + 1)?]) as usize;
                if len < 2 {
                    return None;
                }
                pos += len;
            }
        }
    }
}

/// Composite straight-alpha RGBA over an opaque white background.
pub(crate) fn flatten_onto_white(rgba: &RgbaImage) -> RgbImage {
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (src, dst) in rgba.pixels().zip(out.pixels_mut()) {
        let a = src[3] as u32;
        for c in 0..3 {
            dst[c] = ((src[c] as u32 * a + 255 * (255 - a) + 127) / 255) as u8;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, Rgba};
    use std::io::Cursor;

    fn png_bytes(img: RgbaImage) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn jpeg_bytes(img: RgbImage) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
            .unwrap();
        buf
    }

    fn renderer() -> RasterRenderer {
        RasterRenderer::new(&ConversionConfig::default())
    }

    #[test]
    fn flatten_transparent_and_opaque_pixels() {
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
        img.put_pixel(1, 0, Rgba([10, 20, 30, 255]));
        let out = flatten_onto_white(&img);
        assert_eq!(out.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert_eq!(out.get_pixel(1, 0), &Rgb([10, 20, 30]));
    }

    #[test]
    fn flatten_half_transparent_black_is_mid_grey() {
        let img = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 128]));
        let out = flatten_onto_white(&img);
        let v = out.get_pixel(0, 0)[0];
        assert!((126..=128).contains(&v), "got {v}");
    }

    #[tokio::test]
    async fn png_keeps_source_dimensions() {
        let file = SourceFile::from_bytes(
            "shot.png",
            png_bytes(RgbaImage::from_pixel(37, 91, Rgba([0, 0, 255, 0]))),
        );
        let surface = renderer().render(&file).await.unwrap();
        assert_eq!((surface.width(), surface.height()), (37, 91));
        assert_eq!(surface.pixels().get_pixel(5, 5), &Rgb([255, 255, 255]));
        assert!(matches!(surface.encoding(), SurfaceEncoding::Lossless));
    }

    #[tokio::test]
    async fn rgb_jpeg_is_passed_through() {
        let bytes = jpeg_bytes(RgbImage::from_pixel(64, 32, Rgb([200, 10, 10])));
        let file = SourceFile::from_bytes("photo.JPG", bytes.clone());
        let surface = renderer().render(&file).await.unwrap();
        assert_eq!((surface.width(), surface.height()), (64, 32));
        match surface.encoding() {
            SurfaceEncoding::Passthrough(data) => assert_eq!(&data[..], &bytes[..]),
            other => panic!("expected passthrough, got {other:?}"),
        }
    }

    /// Bare SOF0 header declaring four components, as Adobe CMYK files do.
    fn cmyk_frame_header() -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xD8];
        // APP14 "Adobe" segment ahead of the frame.
        bytes.extend([0xFF, 0xEE, 0x00, 0x0E, b'A', b'd', b'o', b'b', b'e', 0, 100, 0, 0, 0, 0, 2]);
        bytes.extend([0xFF, 0xC0, 0x00, 0x14, 8, 0x00, 0x01, 0x00, 0x01, 4]);
        for id in 1..=4 {
            bytes.extend([id, 0x11, 0]);
        }
        bytes.extend([0xFF, 0xD9]);
        bytes
    }

    #[test]
    fn frame_header_component_count() {
        assert_eq!(jpeg_components(&cmyk_frame_header()), Some(4));
        let rgb = jpeg_bytes(RgbImage::from_pixel(8, 8, Rgb([1, 2, 3])));
        assert_eq!(jpeg_components(&rgb), Some(3));
        assert_eq!(jpeg_components(b"\x89PNG"), None);
        assert_eq!(jpeg_components(&[0xFF, 0xD8, 0xFF, 0xC0, 0x00]), None);
    }

    #[tokio::test]
    async fn greyscale_jpeg_is_re_embedded_from_pixels() {
        let mut buf = Vec::new();
        DynamicImage::ImageLuma8(image::GrayImage::from_pixel(8, 8, image::Luma([90])))
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
            .unwrap();
        assert_eq!(jpeg_components(&buf), Some(1));
        let surface = renderer()
            .render(&SourceFile::from_bytes("grey.jpg", buf))
            .await
            .unwrap();
        assert!(!matches!(surface.encoding(), SurfaceEncoding::Passthrough(_)));
    }

    #[tokio::test]
    async fn mismatched_content_is_invalid_format() {
        let bytes = jpeg_bytes(RgbImage::from_pixel(4, 4, Rgb([0, 0, 0])));
        let file = SourceFile::from_bytes("really-a-jpeg.png", bytes);
        let err = renderer().render(&file).await.unwrap_err();
        assert!(matches!(err, RenderError::InvalidFormat { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn truncated_png_is_unreadable() {
        let mut bytes = png_bytes(RgbaImage::from_pixel(16, 16, Rgba([1, 2, 3, 255])));
        bytes.truncate(20);
        let file = SourceFile::from_bytes("broken.png", bytes);
        let err = renderer().render(&file).await.unwrap_err();
        assert!(matches!(err, RenderError::UnreadableInput(_)), "got {err:?}");
    }
}
