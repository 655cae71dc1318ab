//! Document assembly: one fitted image → one single-page PDF.
//!
//! The pipeline talks to assembly through two small traits so the container
//! format stays swappable. [`LopdfAssembler`] is the stock implementation; it
//! writes a PDF 1.5 file whose only page draws one image XObject.

use crate::error::AssemblyError;
use crate::pipeline::encode::{EncodedImage, ImageFilter};
use crate::pipeline::fit::{Orientation, PageGeometry, PageUnit};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

/// Creates empty single-page documents.
pub trait DocumentAssembler: Send + Sync {
    /// Start a document with one page of `size` (width, height) in `unit`.
    ///
    /// `size` is reordered to match `orientation` when the two disagree.
    fn create(
        &self,
        orientation: Orientation,
        unit: PageUnit,
        size: (f64, f64),
    ) -> Result<Box<dyn AssembledDocument>, AssemblyError>;
}

/// A document under construction.
pub trait AssembledDocument: Send {
    /// Draw `image` into the box at (`x`, `y`) from the page's top-left
    /// corner, `width` × `height`, all in the document's unit.
    fn place(
        &mut self,
        image: &EncodedImage,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    ) -> Result<(), AssemblyError>;

    /// Serialise the finished document.
    fn output(self: Box<Self>) -> Result<Vec<u8>, AssemblyError>;
}

/// Build the document for one fitted surface.
pub fn assemble(
    assembler: &dyn DocumentAssembler,
    geometry: &PageGeometry,
    image: &EncodedImage,
) -> Result<Vec<u8>, AssemblyError> {
    let mut doc = assembler.create(
        geometry.orientation,
        geometry.unit,
        (geometry.page_width, geometry.page_height),
    )?;
    doc.place(
        image,
        geometry.offset_x,
        geometry.offset_y,
        geometry.content_width,
        geometry.content_height,
    )?;
    doc.output()
}

/// [`DocumentAssembler`] backed by `lopdf`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfAssembler;

impl DocumentAssembler for LopdfAssembler {
    fn create(
        &self,
        orientation: Orientation,
        unit: PageUnit,
        size: (f64, f64),
    ) -> Result<Box<dyn AssembledDocument>, AssemblyError> {
        let (mut width, mut height) = size;
        if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
            return Err(AssemblyError(format!("invalid page size {width}x{height}")));
        }
        let landscape_size = width > height;
        if landscape_size != (orientation == Orientation::Landscape) && width != height {
            std::mem::swap(&mut width, &mut height);
        }

        let scale = unit.to_points();
        Ok(Box::new(LopdfDocument {
            doc: Document::with_version("1.5"),
            page_width_pt: width * scale,
            page_height_pt: height * scale,
            scale,
            xobjects: Dictionary::new(),
            operations: Vec::new(),
        }))
    }
}

struct LopdfDocument {
    doc: Document,
    page_width_pt: f64,
    page_height_pt: f64,
    /// Points per document unit.
    scale: f64,
    xobjects: Dictionary,
    operations: Vec<Operation>,
}

impl LopdfDocument {
    fn image_stream(image: &EncodedImage) -> Result<Stream, AssemblyError> {
        let mut dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => image.width as i64,
            "Height" => image.height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        };
        match image.filter {
            ImageFilter::Dct => {
                dict.set("Filter", "DCTDecode");
                Ok(Stream::new(dict, image.data.to_vec()).with_compression(false))
            }
            ImageFilter::Raw => {
                let expected = image.width as usize * image.height as usize * 3;
                if image.data.len() != expected {
                    return Err(AssemblyError(format!(
                        "raw image holds {} bytes, {}x{} RGB needs {expected}",
                        image.data.len(),
                        image.width,
                        image.height
                    )));
                }
                let mut stream = Stream::new(dict, image.data.to_vec());
                stream
                    .compress()
                    .map_err(|e| AssemblyError(format!("deflate failed: {e}")))?;
                Ok(stream)
            }
        }
    }
}

fn real(v: f64) -> Object {
    Object::Real(v as f32)
}

impl AssembledDocument for LopdfDocument {
    fn place(
        &mut self,
        image: &EncodedImage,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    ) -> Result<(), AssemblyError> {
        if !(width > 0.0 && height > 0.0 && x.is_finite() && y.is_finite()) {
            return Err(AssemblyError(format!(
                "invalid placement {width}x{height} at ({x}, {y})"
            )));
        }

        let stream = Self::image_stream(image)?;
        let id = self.doc.add_object(stream);
        let name = format!("Im{}", self.xobjects.len());
        self.xobjects.set(name.as_bytes().to_vec(), id);

        // PDF space is bottom-up and in points.
        let w = width * self.scale;
        let h = height * self.scale;
        let left = x * self.scale;
        let bottom = self.page_height_pt - y * self.scale - h;
        self.operations.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![real(w), real(0.0), real(0.0), real(h), real(left), real(bottom)],
            ),
            Operation::new("Do", vec![Object::Name(name.into_bytes())]),
            Operation::new("Q", vec![]),
        ]);
        Ok(())
    }

    fn output(self: Box<Self>) -> Result<Vec<u8>, AssemblyError> {
        let LopdfDocument {
            mut doc,
            page_width_pt,
            page_height_pt,
            xobjects,
            operations,
            ..
        } = *self;

        let content = Content { operations }
            .encode()
            .map_err(|e| AssemblyError(format!("content stream: {e}")))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));

        let pages_id: ObjectId = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), real(page_width_pt), real(page_height_pt)],
            "Contents" => content_id,
            "Resources" => dictionary! { "XObject" => xobjects },
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        let info_id = doc.add_object(dictionary! {
            "Producer" => Object::string_literal(concat!("edgequake-any2pdf ", env!("CARGO_PKG_VERSION"))),
        });
        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Info", info_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf)
            .map_err(|e| AssemblyError(format!("serialisation failed: {e}")))?;
        debug!(
            "Assembled {:.1}x{:.1} pt page → {} bytes",
            page_width_pt,
            page_height_pt,
            buf.len()
        );
        Ok(buf)
    }
}
