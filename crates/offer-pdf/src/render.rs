//! Render an emission stream into PDF pages
//!
//! The renderer honours explicit page breaks and otherwise flows content
//! top to bottom. A block that does not fit the rest of a non-empty page
//! starts a new one; a block taller than a whole page is broken at line
//! (or row) granularity.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};

use crate::error::PdfError;
use crate::image::ChartImage;
use crate::layout::{
    chars_per_line, truncate_chars, BlockKind, Emission, PageGeometry, LEADING, ROW_HEIGHT,
};

/// A freshly rendered, standalone page sequence
#[derive(Debug, Clone)]
pub struct RenderedSection {
    pub bytes: Vec<u8>,
    pub page_count: u32,
}

/// Render `emissions` onto pages of the given geometry
pub fn render_emissions(
    emissions: &[Emission],
    geometry: &PageGeometry,
) -> Result<RenderedSection, PdfError> {
    let mut renderer = Renderer::new(*geometry);

    for emission in emissions {
        match emission {
            Emission::PageBreak => renderer.break_page()?,
            Emission::Spacer(amount) => {
                if renderer.canvas.y + amount > renderer.bottom_limit() {
                    renderer.break_page()?;
                } else {
                    renderer.canvas.y += amount;
                }
            }
            Emission::Block(block) => {
                if renderer.canvas.has_content && renderer.remaining() < block.height {
                    renderer.next_page()?;
                }
                match &block.kind {
                    BlockKind::Paragraph {
                        lines,
                        font_size,
                        bold,
                    } => renderer.draw_paragraph(lines, *font_size, *bold)?,
                    BlockKind::Table {
                        title,
                        rows,
                        header,
                        font_size,
                    } => renderer.draw_table(title.as_deref(), rows, *header, *font_size)?,
                    BlockKind::Image {
                        image,
                        width,
                        height,
                    } => renderer.draw_image(image, *width, *height)?,
                }
            }
        }
    }

    renderer.finish()
}

#[derive(Default)]
struct PageCanvas {
    operations: Vec<Operation>,
    images: Vec<(String, ObjectId)>,
    /// Distance from the top edge of the page
    y: f64,
    has_content: bool,
}

struct Renderer {
    doc: Document,
    geometry: PageGeometry,
    pages_id: ObjectId,
    fonts_id: ObjectId,
    page_ids: Vec<ObjectId>,
    canvas: PageCanvas,
    image_count: usize,
}

impl Renderer {
    fn new(geometry: PageGeometry) -> Self {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();

        let regular_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let bold_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica-Bold",
            "Encoding" => "WinAnsiEncoding",
        });
        let fonts_id = doc.add_object(dictionary! {
            "F1" => Object::Reference(regular_id),
            "F2" => Object::Reference(bold_id),
        });

        Self {
            doc,
            geometry,
            pages_id,
            fonts_id,
            page_ids: Vec::new(),
            canvas: PageCanvas {
                y: geometry.top_margin,
                ..PageCanvas::default()
            },
            image_count: 0,
        }
    }

    fn bottom_limit(&self) -> f64 {
        self.geometry.height - self.geometry.bottom_margin
    }

    fn remaining(&self) -> f64 {
        (self.bottom_limit() - self.canvas.y).max(0.0)
    }

    fn left(&self) -> f64 {
        self.geometry.side_margin
    }

    /// Convert a top-based distance into PDF user space
    fn pdf_y(&self, y_from_top: f64) -> f64 {
        self.geometry.height - y_from_top
    }

    /// Start a new page when `needed` does not fit on a page that already has content
    fn ensure_space(&mut self, needed: f64) -> Result<(), PdfError> {
        if self.canvas.has_content && self.remaining() < needed {
            self.next_page()?;
        }
        Ok(())
    }

    /// Flush the current page if it has content, otherwise rewind to its top
    fn break_page(&mut self) -> Result<(), PdfError> {
        if self.canvas.has_content {
            self.next_page()
        } else {
            self.canvas.y = self.geometry.top_margin;
            Ok(())
        }
    }

    fn next_page(&mut self) -> Result<(), PdfError> {
        let canvas = std::mem::replace(
            &mut self.canvas,
            PageCanvas {
                y: self.geometry.top_margin,
                ..PageCanvas::default()
            },
        );

        let content = Content {
            operations: canvas.operations,
        };
        let encoded = content.encode().map_err(|e| {
            PdfError::OperationError(format!("Failed to encode page content: {}", e))
        })?;
        let content_id = self.doc.add_object(Stream::new(dictionary! {}, encoded));

        let mut xobjects = lopdf::Dictionary::new();
        for (name, id) in canvas.images {
            xobjects.set(name, Object::Reference(id));
        }

        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(self.pages_id),
            "MediaBox" => vec![
                0.into(),
                0.into(),
                Object::Real(self.geometry.width as f32),
                Object::Real(self.geometry.height as f32),
            ],
            "Contents" => Object::Reference(content_id),
            "Resources" => dictionary! {
                "Font" => Object::Reference(self.fonts_id),
                "XObject" => xobjects,
            },
        });
        self.page_ids.push(page_id);
        Ok(())
    }

    fn draw_text_line(
        &mut self,
        text: &str,
        x: f64,
        baseline_from_top: f64,
        font_size: f64,
        bold: bool,
    ) {
        let font: &[u8] = if bold { b"F2" } else { b"F1" };
        let y = self.pdf_y(baseline_from_top);
        self.canvas.operations.extend([
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![Object::Name(font.to_vec()), Object::Real(font_size as f32)],
            ),
            Operation::new("Td", vec![Object::Real(x as f32), Object::Real(y as f32)]),
            Operation::new(
                "Tj",
                vec![Object::String(encode_win_ansi(text), StringFormat::Literal)],
            ),
            Operation::new("ET", vec![]),
        ]);
        self.canvas.has_content = true;
    }

    fn draw_paragraph(
        &mut self,
        lines: &[String],
        font_size: f64,
        bold: bool,
    ) -> Result<(), PdfError> {
        let line_height = font_size * LEADING;
        for line in lines {
            self.ensure_space(line_height)?;
            let baseline = self.canvas.y + font_size;
            let x = self.left();
            self.draw_text_line(line, x, baseline, font_size, bold);
            self.canvas.y += line_height;
        }
        Ok(())
    }

    fn draw_table(
        &mut self,
        title: Option<&str>,
        rows: &[Vec<String>],
        header: bool,
        font_size: f64,
    ) -> Result<(), PdfError> {
        if let Some(title) = title {
            let title_size = font_size + 2.0;
            let title_height = title_size * LEADING;
            self.ensure_space(title_height)?;
            let baseline = self.canvas.y + title_size;
            let x = self.left();
            self.draw_text_line(title, x, baseline, title_size, true);
            self.canvas.y += title_height;
        }

        let columns = rows.iter().map(Vec::len).max().unwrap_or(0).max(1);
        let col_width = self.geometry.content_width() / columns as f64;
        let max_chars = chars_per_line(font_size, (col_width - 4.0).max(1.0));
        let row_height = font_size * ROW_HEIGHT;

        for (index, row) in rows.iter().enumerate() {
            self.ensure_space(row_height)?;
            let is_header = header && index == 0;
            let baseline = self.canvas.y + font_size * 1.2;
            for (col, cell) in row.iter().enumerate() {
                let x = self.left() + col as f64 * col_width + 2.0;
                let text = truncate_chars(cell, max_chars);
                self.draw_text_line(&text, x, baseline, font_size, is_header);
            }
            self.canvas.y += row_height;

            if is_header {
                let rule_y = self.pdf_y(self.canvas.y) as f32;
                let left = self.left() as f32;
                let right = (self.left() + self.geometry.content_width()) as f32;
                self.canvas.operations.extend([
                    Operation::new("w", vec![Object::Real(0.5)]),
                    Operation::new("m", vec![Object::Real(left), Object::Real(rule_y)]),
                    Operation::new("l", vec![Object::Real(right), Object::Real(rule_y)]),
                    Operation::new("S", vec![]),
                ]);
            }
        }
        Ok(())
    }

    fn draw_image(&mut self, image: &ChartImage, width: f64, height: f64) -> Result<(), PdfError> {
        self.image_count += 1;
        let name = format!("Im{}", self.image_count);

        let stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => image.width_px as i64,
                "Height" => image.height_px as i64,
                "ColorSpace" => Object::Name(image.color_space.pdf_name().to_vec()),
                "BitsPerComponent" => 8,
                "Filter" => Object::Name(image.filter.pdf_name().to_vec()),
            },
            image.data.clone(),
        )
        .with_compression(false);
        let image_id = self.doc.add_object(stream);

        let x = self.left();
        let y = self.pdf_y(self.canvas.y + height);
        self.canvas.operations.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    Object::Real(width as f32),
                    0.into(),
                    0.into(),
                    Object::Real(height as f32),
                    Object::Real(x as f32),
                    Object::Real(y as f32),
                ],
            ),
            Operation::new("Do", vec![Object::Name(name.as_bytes().to_vec())]),
            Operation::new("Q", vec![]),
        ]);
        self.canvas.images.push((name, image_id));
        self.canvas.has_content = true;
        self.canvas.y += height;
        Ok(())
    }

    fn finish(mut self) -> Result<RenderedSection, PdfError> {
        if self.canvas.has_content {
            self.next_page()?;
        }
        if self.page_ids.is_empty() {
            return Err(PdfError::OperationError("Nothing to render".into()));
        }

        let kids: Vec<Object> = self.page_ids.iter().map(|&id| Object::Reference(id)).collect();
        let page_count = self.page_ids.len() as u32;
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => page_count as i64,
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(self.pages_id),
        });
        self.doc.trailer.set("Root", Object::Reference(catalog_id));
        self.doc.compress();

        let mut bytes = Vec::new();
        self.doc
            .save_to(&mut bytes)
            .map_err(|e| PdfError::OperationError(format!("Failed to save section: {}", e)))?;

        Ok(RenderedSection { bytes, page_count })
    }
}

/// Map text onto WinAnsiEncoding; unmappable characters become '?'
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '€' => 0x80,
            '‚' => 0x82,
            '„' => 0x84,
            '…' => 0x85,
            '–' => 0x96,
            '—' => 0x97,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            c if (c as u32) < 0x80 || (0xA0..=0xFF).contains(&(c as u32)) => c as u32 as u8,
            _ => b'?',
        })
        .collect()
}
