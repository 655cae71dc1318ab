//! Pipeline stages for document-to-PDF conversion.
//!
//! Each submodule implements one transformation step, so each can be tested
//! on its own and swapped (e.g. a different staging backend for HTML) without
//! touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ fit ──▶ encode ──▶ assemble
//! (bytes)   (Surface)  (page)  (XObject)  (PDF)
//! ```
//!
//! 1. [`input`]: declared and sniffed format of a [`input::SourceFile`]
//! 2. [`render`]: per-format [`render::FormatRenderer`]s behind a registry:
//!    [`raster`] (PNG/JPEG), [`vector`] (SVG), [`markup`] (HTML)
//! 3. [`fit`]: pure page geometry (orientation, content box, offsets)
//! 4. [`encode`]: JPEG passthrough, JPEG re-encode or raw samples
//! 5. [`assemble`]: single-page PDF through a [`assemble::DocumentAssembler`]

pub mod assemble;
pub mod encode;
pub mod fit;
pub mod input;
pub mod markup;
pub mod raster;
pub mod render;
pub mod vector;
