//! Block painter for the static backend
//!
//! Turns a parsed page into a bitmap in three steps: `layout` stacks the
//! page's headings, paragraphs, chart containers, and panels into boxes,
//! `paint` resolves their backgrounds into paint commands, and `raster`
//! fills an RGBA canvas and encodes it as PNG. There is no font rendering:
//! text is drawn as solid ink cells so captures still show where it sits.

pub mod layout;
pub mod paint;
pub mod raster;

/// An encoded capture of a laid-out page
#[derive(Debug, Clone)]
pub struct Screenshot {
    pub width: u32,
    pub height: u32,
    pub png_data: Vec<u8>,
}
