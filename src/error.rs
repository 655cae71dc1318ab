//! Error types for the edgequake-any2pdf library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Any2PdfError`]: **Fatal**: the batch cannot proceed at all (too many
//!   files, unreadable input path, invalid configuration). Returned as
//!   `Err(Any2PdfError)` from the top-level `convert_batch*` functions and no
//!   conversion work is started.
//!
//! * [`FileError`]: **Non-fatal**: a single file failed (bad size, corrupt
//!   image, assembly rejected the surface) but its siblings are fine. Stored
//!   inside [`crate::output::ConversionResult::Failed`] so callers can inspect
//!   partial success rather than losing the whole batch to one bad file.
//!
//! Renderer and collaborator errors ([`RenderError`], [`AssemblyError`],
//! [`DeliveryError`]) never escape the pipeline on their own: they are wrapped
//! into a [`FileError`] scoped to the offending file name.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::pipeline::input::FormatTag;

/// All fatal errors returned by the edgequake-any2pdf library.
///
/// Per-file failures use [`FileError`] and are stored in
/// [`crate::output::BatchReport`] rather than propagated here.
#[derive(Debug, Error)]
pub enum Any2PdfError {
    // ── Batch errors ──────────────────────────────────────────────────────
    /// The submission holds more files than one batch may carry.
    #[error("{submitted} files submitted but a batch holds at most {limit}.\nSplit the files into smaller batches.")]
    TooManyFiles { submitted: usize, limit: usize },

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists but reading it failed.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create the output directory.
    #[error("Failed to prepare output directory '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Serialisable tag naming the class of a [`FileError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileErrorKind {
    InvalidFile,
    UnsupportedFormat,
    UnreadableInput,
    DecodeTimeout,
    InvalidFormat,
    AssemblyFailure,
}

/// A non-fatal error for a single file.
///
/// Every variant carries the original file name so the message can be shown
/// to the user as-is. The batch continues regardless.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum FileError {
    /// Size or extension precondition failed before any rendering.
    #[error("{file}: invalid file: {detail}")]
    InvalidFile { file: String, detail: String },

    /// No renderer is registered for the file's extension.
    #[error("{file}: unsupported file format '{extension}'")]
    UnsupportedFormat { file: String, extension: String },

    /// Content could not be decoded.
    #[error("{file}: {detail}")]
    UnreadableInput { file: String, detail: String },

    /// A render dependency never signalled completion in time.
    #[error("{file}: {detail}")]
    DecodeTimeout { file: String, detail: String },

    /// Sniffed content does not match the declared extension.
    #[error("{file}: {detail}")]
    InvalidFormat { file: String, detail: String },

    /// The document assembler rejected the surface or geometry.
    #[error("{file}: {detail}")]
    AssemblyFailure { file: String, detail: String },
}

impl FileError {
    /// The class of this error.
    pub fn kind(&self) -> FileErrorKind {
        match self {
            FileError::InvalidFile { .. } => FileErrorKind::InvalidFile,
            FileError::UnsupportedFormat { .. } => FileErrorKind::UnsupportedFormat,
            FileError::UnreadableInput { .. } => FileErrorKind::UnreadableInput,
            FileError::DecodeTimeout { .. } => FileErrorKind::DecodeTimeout,
            FileError::InvalidFormat { .. } => FileErrorKind::InvalidFormat,
            FileError::AssemblyFailure { .. } => FileErrorKind::AssemblyFailure,
        }
    }

    /// The original file name this error is scoped to.
    pub fn file_name(&self) -> &str {
        match self {
            FileError::InvalidFile { file, .. }
            | FileError::UnsupportedFormat { file, .. }
            | FileError::UnreadableInput { file, .. }
            | FileError::DecodeTimeout { file, .. }
            | FileError::InvalidFormat { file, .. }
            | FileError::AssemblyFailure { file, .. } => file,
        }
    }
}

/// Failure raised by a [`crate::pipeline::render::FormatRenderer`].
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    /// The bytes could not be decoded into a surface.
    #[error("content could not be decoded: {0}")]
    UnreadableInput(String),

    /// An external dependency did not finish within the allowed time.
    #[error("{stage} did not complete within {}ms", .after.as_millis())]
    DecodeTimeout { stage: &'static str, after: Duration },

    /// The content is of a different format than its extension claims.
    #[error("declared as {declared} but content looks like {detected}")]
    InvalidFormat {
        declared: FormatTag,
        detected: FormatTag,
    },
}

impl RenderError {
    /// Wrap into a [`FileError`] with a format-specific message.
    pub fn into_file_error(self, file: &str, format: FormatTag) -> FileError {
        let file = file.to_string();
        let detail = format!("{} conversion failed: {}", format.label(), self);
        match self {
            RenderError::UnreadableInput(_) => FileError::UnreadableInput { file, detail },
            RenderError::DecodeTimeout { .. } => FileError::DecodeTimeout { file, detail },
            RenderError::InvalidFormat { .. } => FileError::InvalidFormat { file, detail },
        }
    }
}

/// Failure raised by a [`crate::pipeline::assemble::DocumentAssembler`].
#[derive(Debug, Clone, Error)]
#[error("document assembly failed: {0}")]
pub struct AssemblyError(pub String);

/// Failure raised by a [`crate::delivery::DeliveryTarget`].
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Writing the document to its destination failed.
    #[error("Failed to deliver '{name}': {source}")]
    WriteFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// The host rejected the handoff.
    #[error("Delivery of '{name}' rejected: {reason}")]
    Rejected { name: String, reason: String },
}
