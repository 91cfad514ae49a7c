//! Output document composition
//!
//! The document is a landscape tabloid PDF. Each captured page gets a title
//! line and its bitmap scaled to the page width minus margins, with the
//! height following the bitmap's aspect ratio and clamped to the space left
//! under the title. Coordinates in this module are millimetres measured from
//! the top-left corner; the conversion to PDF's bottom-left origin happens
//! only when drawing.

use crate::{Bitmap, CapturedPage, Error, Result};
use log::debug;
use printpdf::{
    BuiltinFont, ColorBits, ColorSpace, Image, ImageTransform, ImageXObject, IndirectFontRef, Mm,
    PdfDocument, PdfDocumentReference, PdfLayerIndex, PdfPageIndex, Px,
};
use std::io::{BufWriter, Cursor};

const MM_PER_INCH: f32 = 25.4;
/// Resolution the bitmap is embedded at before scaling
const EMBED_DPI: f32 = 72.0;

/// Fixed page geometry and margins, in millimetres
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
    /// Left edge of the title and image
    pub left: f32,
    /// Baseline of the title
    pub title_top: f32,
    /// Top edge of the image
    pub image_top: f32,
    /// Total horizontal margin taken from the image width
    pub horizontal_margin: f32,
    /// Vertical space reserved for the title and bottom margin
    pub vertical_reserve: f32,
    /// Title font size in points
    pub title_font_size: f32,
}

impl Default for PageGeometry {
    /// Landscape tabloid (11 x 17 in)
    fn default() -> Self {
        Self {
            width: 431.8,
            height: 279.4,
            left: 10.0,
            title_top: 10.0,
            image_top: 20.0,
            horizontal_margin: 20.0,
            vertical_reserve: 30.0,
            title_font_size: 14.0,
        }
    }
}

impl PageGeometry {
    /// Where a bitmap of the given pixel size lands on the page
    pub fn place(&self, pixel_width: u32, pixel_height: u32) -> Placement {
        let width = self.width - self.horizontal_margin;
        let natural = if pixel_width == 0 {
            0.0
        } else {
            width * pixel_height as f32 / pixel_width as f32
        };
        Placement {
            x: self.left,
            y: self.image_top,
            width,
            height: natural.min(self.height - self.vertical_reserve),
        }
    }
}

/// Position and size of an image on a page, top-left origin, millimetres
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// A page that has been written into the document
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedPage {
    pub title: String,
    pub placement: Placement,
}

/// The cumulative output document
///
/// Append-only: pages are added in the order they are placed and the
/// document is serialized exactly once by `finish`.
pub struct ExportDocument {
    doc: PdfDocumentReference,
    first_page: (PdfPageIndex, PdfLayerIndex),
    font: IndirectFontRef,
    geometry: PageGeometry,
    pages: Vec<ComposedPage>,
}

impl std::fmt::Debug for ExportDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportDocument")
            .field("geometry", &self.geometry)
            .field("pages", &self.pages)
            .finish_non_exhaustive()
    }
}

impl ExportDocument {
    pub fn new(title: &str) -> Result<Self> {
        Self::with_geometry(title, PageGeometry::default())
    }

    pub fn with_geometry(title: &str, geometry: PageGeometry) -> Result<Self> {
        let (doc, page, layer) =
            PdfDocument::new(title, Mm(geometry.width), Mm(geometry.height), "Layer 1");
        let font = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| Error::DocumentError(format!("Failed to load title font: {}", e)))?;

        Ok(Self {
            doc,
            first_page: (page, layer),
            font,
            geometry,
            pages: Vec::new(),
        })
    }

    pub fn geometry(&self) -> &PageGeometry {
        &self.geometry
    }

    /// Pages written so far, in document order
    pub fn pages(&self) -> &[ComposedPage] {
        &self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Write a captured page: the first one goes onto the document's initial
    /// page, every later one onto a freshly appended page.
    pub fn append(&mut self, page: CapturedPage) -> Result<()> {
        self.place_image(&page.bitmap, &page.title)
    }

    /// Write `title` and then `bitmap`, scaled to fit, on the next page.
    pub fn place_image(&mut self, bitmap: &Bitmap, title: &str) -> Result<()> {
        let g = self.geometry;
        let image = embed(bitmap)?;

        let (page, layer) = if self.pages.is_empty() {
            self.first_page
        } else {
            self.doc.add_page(Mm(g.width), Mm(g.height), "Layer 1")
        };
        let layer = self.doc.get_page(page).get_layer(layer);

        layer.use_text(
            title,
            g.title_font_size,
            Mm(g.left),
            Mm(g.height - g.title_top),
            &self.font,
        );

        let placement = g.place(bitmap.width, bitmap.height);
        let natural_width = bitmap.width as f32 / EMBED_DPI * MM_PER_INCH;
        let natural_height = bitmap.height as f32 / EMBED_DPI * MM_PER_INCH;
        image.add_to_layer(
            layer,
            ImageTransform {
                translate_x: Some(Mm(placement.x)),
                translate_y: Some(Mm(g.height - placement.y - placement.height)),
                scale_x: Some(placement.width / natural_width),
                scale_y: Some(placement.height / natural_height),
                dpi: Some(EMBED_DPI),
                ..Default::default()
            },
        );

        debug!(
            "page {} '{}': {}x{}px -> {:.1}x{:.1}mm",
            self.pages.len() + 1,
            title,
            bitmap.width,
            bitmap.height,
            placement.width,
            placement.height
        );
        self.pages.push(ComposedPage {
            title: title.to_string(),
            placement,
        });
        Ok(())
    }

    /// Serialize the document
    pub fn finish(self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        {
            let mut writer = BufWriter::new(Cursor::new(&mut buf));
            self.doc
                .save(&mut writer)
                .map_err(|e| Error::DocumentError(format!("Failed to serialize PDF: {}", e)))?;
        }
        Ok(buf)
    }
}

fn embed(bitmap: &Bitmap) -> Result<Image> {
    if bitmap.width == 0 || bitmap.height == 0 {
        return Err(Error::DocumentError("cannot place an empty bitmap".into()));
    }
    let decoded = image::load_from_memory_with_format(&bitmap.png, image::ImageFormat::Png)
        .map_err(|e| Error::DocumentError(format!("Failed to decode bitmap: {}", e)))?;
    let rgb = decoded.to_rgb8();

    Ok(Image::from(ImageXObject {
        width: Px(rgb.width() as usize),
        height: Px(rgb.height() as usize),
        color_space: ColorSpace::Rgb,
        bits_per_component: ColorBits::Bit8,
        interpolate: true,
        image_data: rgb.into_raw(),
        image_filter: None,
        clipping_bbox: None,
        smask: None,
    }))
}
