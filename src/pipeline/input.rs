//! Input ingestion: source files, declared formats and content sniffing.
//!
//! A [`SourceFile`] is created once at ingestion (CLI argument, library
//! caller) and handed to the pipeline by value, so it is consumed exactly once
//! and never mutated. Its *declared* format comes from the extension (or a
//! MIME hint when the name has none); the *sniffed* format is derived from the
//! leading bytes and is compared against the declaration by the renderers.

use crate::error::Any2PdfError;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::debug;

/// How many leading bytes are inspected when sniffing textual formats.
const SNIFF_WINDOW: usize = 1024;

/// The closed set of formats the pipeline knows how to convert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FormatTag {
    RasterJpeg,
    RasterPng,
    MarkupHtml,
    VectorSvg,
}

impl FormatTag {
    /// Map a file extension (without the dot, any case) to a format.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(FormatTag::RasterJpeg),
            "png" => Some(FormatTag::RasterPng),
            "html" | "htm" => Some(FormatTag::MarkupHtml),
            "svg" => Some(FormatTag::VectorSvg),
            _ => None,
        }
    }

    /// Map a MIME type to a format.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim();
        match essence.to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(FormatTag::RasterJpeg),
            "image/png" => Some(FormatTag::RasterPng),
            "text/html" => Some(FormatTag::MarkupHtml),
            "image/svg+xml" => Some(FormatTag::VectorSvg),
            _ => None,
        }
    }

    /// Short human label used in messages.
    pub fn label(&self) -> &'static str {
        match self {
            FormatTag::RasterJpeg => "JPEG",
            FormatTag::RasterPng => "PNG",
            FormatTag::MarkupHtml => "HTML",
            FormatTag::VectorSvg => "SVG",
        }
    }

    /// MIME type of the format, handed to decoders as a hint.
    pub fn mime(&self) -> &'static str {
        match self {
            FormatTag::RasterJpeg => "image/jpeg",
            FormatTag::RasterPng => "image/png",
            FormatTag::MarkupHtml => "text/html",
            FormatTag::VectorSvg => "image/svg+xml",
        }
    }
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One user-supplied document.
#[derive(Debug, Clone)]
pub struct SourceFile {
    name: String,
    bytes: Vec<u8>,
    mime: Option<String>,
}

impl SourceFile {
    /// Wrap in-memory content under its declared file name.
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
            mime: None,
        }
    }

    /// Attach a MIME hint, used when the name carries no known extension.
    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    /// Read a local file, keeping only its final path component as the name.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, Any2PdfError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Any2PdfError::FileNotFound {
                path: path.to_path_buf(),
            },
            std::io::ErrorKind::PermissionDenied => Any2PdfError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => Any2PdfError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            },
        })?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        debug!("Read {} ({} bytes)", path.display(), bytes.len());
        Ok(Self::from_bytes(name, bytes))
    }

    /// Declared file name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw content.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Byte length of the content.
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Extension of the declared name, if any.
    pub fn extension(&self) -> Option<&str> {
        Path::new(&self.name)
            .extension()
            .and_then(|e| e.to_str())
    }

    /// Format claimed by the extension, falling back to the MIME hint.
    pub fn declared_format(&self) -> Option<FormatTag> {
        self.extension()
            .and_then(FormatTag::from_extension)
            .or_else(|| self.mime.as_deref().and_then(FormatTag::from_mime))
    }

    /// Format detected from the content itself.
    pub fn sniffed_format(&self) -> Option<FormatTag> {
        sniff_format(&self.bytes)
    }
}

/// Detect the format of `bytes` from magic numbers and leading markup.
///
/// Binary formats are recognised by the `image` crate's signature table.
/// Anything textual whose first tag is `<svg` (optionally behind an XML
/// declaration, doctype or comments) is SVG; any other text containing markup
/// is treated as HTML, fragments included.
pub fn sniff_format(bytes: &[u8]) -> Option<FormatTag> {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => return Some(FormatTag::RasterPng),
        Ok(ImageFormat::Jpeg) => return Some(FormatTag::RasterJpeg),
        Ok(_) => return None,
        Err(_) => {}
    }

    let window = &bytes[..bytes.len().min(SNIFF_WINDOW)];
    if window.contains(&0) {
        return None;
    }
    let head = String::from_utf8_lossy(window).to_ascii_lowercase();
    let head = head.trim_start_matches('\u{feff}').trim_start();

    if first_element_is_svg(head) {
        Some(FormatTag::VectorSvg)
    } else if head.contains('<') {
        Some(FormatTag::MarkupHtml)
    } else {
        None
    }
}

/// Skip prolog constructs (`<?…?>`, `<!…>`, comments, whitespace) and check
/// whether the first real element is `<svg`.
fn first_element_is_svg(mut s: &str) -> bool {
    loop {
        s = s.trim_start();
        if let Some(rest) = s.strip_prefix("<!--") {
            match rest.find("-->") {
                Some(end) => s = &rest[end + 3..],
                None => return false,
            }
        } else if s.starts_with("<?") || s.starts_with("<!") {
            match s.find('>') {
                Some(end) => s = &s[end + 1..],
                None => return false,
            }
        } else {
            return s.starts_with("<svg");
        }
    }
}
