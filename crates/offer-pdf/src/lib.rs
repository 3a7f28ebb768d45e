//! Binary document plumbing for generated offers
//!
//! Renders laid-out sections into PDF pages and appends them, together with
//! external documents (datasheets, partner documents), to a base document.
//! Built on lopdf.

pub mod error;
pub mod image;
pub mod layout;
pub mod merge;
pub mod render;
pub mod source;

pub use error::PdfError;
pub use image::ChartImage;
pub use layout::{BlockKind, Emission, LayoutBlock, PageGeometry, PT_PER_CM};
pub use merge::{merge_into_base, MergedDocument};
pub use render::{render_emissions, RenderedSection};
pub use source::SourceDocument;

/// Parse PDF bytes and return page count
pub fn get_page_count(bytes: &[u8]) -> Result<u32, PdfError> {
    let doc = source::open_document(bytes)?;
    Ok(doc.get_pages().len() as u32)
}
