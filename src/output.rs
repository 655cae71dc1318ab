//! Output types: converted documents, per-file results and the batch report.

use crate::error::{FileError, FileErrorKind};
use crate::pipeline::fit::PageGeometry;
use crate::pipeline::input::FormatTag;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Suffix appended to the stem of every converted file.
pub const CONVERTED_SUFFIX: &str = "_converted";

static RE_EXTENSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.[^/.]+$").unwrap());

/// Name a converted document after its source: the last extension is
/// dropped and [`CONVERTED_SUFFIX`] appended. `"scan.v2.png"` becomes
/// `"scan.v2_converted"`.
///
/// A name that is nothing but an extension (`".png"`) keeps it as the stem.
pub fn suggested_name(original: &str) -> String {
    let stem = RE_EXTENSION.replace(original, "");
    let stem = if stem.is_empty() { original } else { stem.as_ref() };
    format!("{stem}{CONVERTED_SUFFIX}")
}

/// A finished single-page PDF.
#[derive(Clone)]
pub struct ConvertedDocument {
    /// Name of the file it was converted from.
    pub source_name: String,
    /// Output name without the `.pdf` extension.
    pub suggested_file_name: String,
    pub format: FormatTag,
    pub geometry: PageGeometry,
    pub bytes: Arc<[u8]>,
}

impl ConvertedDocument {
    /// Output file name, `.pdf` included.
    pub fn file_name(&self) -> String {
        format!("{}.pdf", self.suggested_file_name)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for ConvertedDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConvertedDocument")
            .field("source_name", &self.source_name)
            .field("suggested_file_name", &self.suggested_file_name)
            .field("format", &self.format)
            .field("geometry", &self.geometry)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Outcome of converting one file. Immutable once produced.
#[derive(Debug, Clone)]
pub enum ConversionResult {
    Converted(ConvertedDocument),
    Failed {
        original_file_name: String,
        error: FileError,
    },
}

impl ConversionResult {
    pub fn failed(error: FileError) -> Self {
        ConversionResult::Failed {
            original_file_name: error.file_name().to_string(),
            error,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ConversionResult::Converted(_))
    }

    /// Name of the file this result belongs to.
    pub fn source_name(&self) -> &str {
        match self {
            ConversionResult::Converted(doc) => &doc.source_name,
            ConversionResult::Failed {
                original_file_name, ..
            } => original_file_name,
        }
    }

    pub fn document(&self) -> Option<&ConvertedDocument> {
        match self {
            ConversionResult::Converted(doc) => Some(doc),
            ConversionResult::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&FileError> {
        match self {
            ConversionResult::Converted(_) => None,
            ConversionResult::Failed { error, .. } => Some(error),
        }
    }
}

/// Counters for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    pub total_files: usize,
    pub converted: usize,
    pub failed: usize,
    pub groups: usize,
    /// Documents the delivery target accepted.
    pub delivered: usize,
    /// Documents the delivery target rejected or failed to write.
    pub delivery_failures: usize,
    pub total_duration_ms: u64,
}

/// Ordered results of a batch, one slot per submitted file.
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// Same order as the submission, regardless of completion order.
    pub results: Vec<ConversionResult>,
    pub stats: BatchStats,
}

impl BatchReport {
    pub fn documents(&self) -> impl Iterator<Item = &ConvertedDocument> {
        self.results.iter().filter_map(ConversionResult::document)
    }

    pub fn failures(&self) -> impl Iterator<Item = &FileError> {
        self.results.iter().filter_map(ConversionResult::error)
    }

    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(ConversionResult::is_success)
    }

    /// Serialisable view for `--json` output and logs.
    pub fn summary(&self) -> BatchSummary {
        let files = self
            .results
            .iter()
            .enumerate()
            .map(|(index, result)| match result {
                ConversionResult::Converted(doc) => FileSummary {
                    index,
                    file: doc.source_name.clone(),
                    status: FileStatus::Converted,
                    output: Some(doc.file_name()),
                    bytes: Some(doc.len()),
                    page: Some(doc.geometry),
                    error_kind: None,
                    message: None,
                },
                ConversionResult::Failed {
                    original_file_name,
                    error,
                } => FileSummary {
                    index,
                    file: original_file_name.clone(),
                    status: FileStatus::Failed,
                    output: None,
                    bytes: None,
                    page: None,
                    error_kind: Some(error.kind()),
                    message: Some(error.to_string()),
                },
            })
            .collect();
        BatchSummary {
            stats: self.stats.clone(),
            files,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Converted,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileSummary {
    pub index: usize,
    pub file: String,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<PageGeometry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<FileErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub stats: BatchStats,
    pub files: Vec<FileSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::fit::FixedPage;

    #[test]
    fn suggested_names() {
        assert_eq!(suggested_name("photo.jpg"), "photo_converted");
        assert_eq!(suggested_name("scan.v2.PNG"), "scan.v2_converted");
        assert_eq!(suggested_name("README"), "README_converted");
        assert_eq!(suggested_name(".png"), ".png_converted");
        assert_eq!(suggested_name("my page.html"), "my page_converted");
    }

    fn doc() -> ConvertedDocument {
        ConvertedDocument {
            source_name: "a.png".into(),
            suggested_file_name: suggested_name("a.png"),
            format: FormatTag::RasterPng,
            geometry: FixedPage::a4().fit(10.0, 10.0),
            bytes: Arc::from(&b"%PDF-1.5"[..]),
        }
    }

    #[test]
    fn file_name_adds_pdf_extension() {
        assert_eq!(doc().file_name(), "a_converted.pdf");
    }

    #[test]
    fn summary_keeps_order_and_error_kinds() {
        let report = BatchReport {
            results: vec![
                ConversionResult::Converted(doc()),
                ConversionResult::failed(FileError::InvalidFile {
                    file: "empty.jpg".into(),
                    detail: "file is empty".into(),
                }),
            ],
            stats: BatchStats {
                total_files: 2,
                converted: 1,
                failed: 1,
                groups: 1,
                ..Default::default()
            },
        };
        assert!(!report.all_succeeded());
        assert_eq!(report.documents().count(), 1);
        assert_eq!(report.results[1].source_name(), "empty.jpg");

        let json = serde_json::to_value(report.summary()).unwrap();
        assert_eq!(json["files"][0]["output"], "a_converted.pdf");
        assert_eq!(json["files"][1]["status"], "failed");
        assert_eq!(json["files"][1]["error_kind"], "invalid_file");
        assert!(json["files"][1].get("output").is_none());
        assert_eq!(json["stats"]["converted"], 1);
    }
}
