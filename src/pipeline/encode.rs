//! Image encoding: [`Surface`] → bytes ready for a PDF image XObject.
//!
//! Three encodings exist, chosen by the renderer that produced the surface:
//! source JPEG bytes passed through untouched, a fresh JPEG (markup
//! screenshots), or raw RGB samples the assembler deflates (PNG and SVG, so
//! flat-colour text and line art stay crisp).

use crate::error::AssemblyError;
use crate::pipeline::render::{Surface, SurfaceEncoding};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use std::sync::Arc;
use tracing::debug;

/// How [`EncodedImage::data`] must be decoded by a PDF reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFilter {
    /// Baseline JPEG (`/DCTDecode`).
    Dct,
    /// Uncompressed 8-bit RGB samples, row-major.
    Raw,
}

/// Encoded pixels plus what a PDF image dictionary needs to describe them.
#[derive(Clone)]
pub struct EncodedImage {
    pub filter: ImageFilter,
    pub width: u32,
    pub height: u32,
    pub data: Arc<[u8]>,
}

impl std::fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodedImage")
            .field("filter", &self.filter)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Encode a surface according to its [`SurfaceEncoding`].
pub fn encode_surface(surface: &Surface) -> Result<EncodedImage, AssemblyError> {
    let (filter, data): (ImageFilter, Arc<[u8]>) = match surface.encoding() {
        SurfaceEncoding::Passthrough(bytes) => (ImageFilter::Dct, Arc::clone(bytes)),
        SurfaceEncoding::Jpeg { quality } => {
            let mut buf = Vec::new();
            let pixels = surface.pixels();
            JpegEncoder::new_with_quality(&mut buf, (*quality).clamp(1, 100))
                .encode(pixels.as_raw(), pixels.width(), pixels.height(), ExtendedColorType::Rgb8)
                .map_err(|e| AssemblyError(format!("JPEG encoding failed: {e}")))?;
            (ImageFilter::Dct, buf.into())
        }
        SurfaceEncoding::Lossless => (ImageFilter::Raw, Arc::from(surface.pixels().as_raw().as_slice())),
    };

    debug!(
        "Encoded {}x{} surface → {:?}, {} bytes",
        surface.width(),
        surface.height(),
        filter,
        data.len()
    );

    Ok(EncodedImage {
        filter,
        width: surface.width(),
        height: surface.height(),
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn surface() -> Surface {
        Surface::new(RgbImage::from_pixel(10, 4, Rgb([255, 0, 0]))).unwrap()
    }

    #[test]
    fn lossless_keeps_raw_samples() {
        let img = encode_surface(&surface()).unwrap();
        assert_eq!(img.filter, ImageFilter::Raw);
        assert_eq!(img.data.len(), 10 * 4 * 3);
        assert_eq!(&img.data[..3], &[255, 0, 0]);
    }

    #[test]
    fn jpeg_surface_is_reencoded() {
        let s = surface().with_encoding(SurfaceEncoding::Jpeg { quality: 100 });
        let img = encode_surface(&s).unwrap();
        assert_eq!(img.filter, ImageFilter::Dct);
        assert_eq!(&img.data[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn passthrough_bytes_are_untouched() {
        let original: Arc<[u8]> = Arc::from(&[0xFF, 0xD8, 0xFF, 0xD9][..]);
        let s = surface().with_encoding(SurfaceEncoding::Passthrough(Arc::clone(&original)));
        let img = encode_surface(&s).unwrap();
        assert!(Arc::ptr_eq(&img.data, &original));
        assert_eq!((img.width, img.height), (10, 4));
    }
}
