//! Layout primitives
//!
//! Blocks carry their estimated height, computed once at construction from
//! the content width they will be rendered at. The estimate uses an average
//! Helvetica glyph width, which is good enough for greedy page breaking.

use std::sync::Arc;

use crate::image::ChartImage;

/// Points per centimetre
pub const PT_PER_CM: f64 = 72.0 / 2.54;

/// Average Helvetica advance as a fraction of the font size
const AVG_GLYPH_WIDTH: f64 = 0.5;

/// Line height as a multiple of the font size
pub const LEADING: f64 = 1.25;

/// Table row height as a multiple of the font size
pub const ROW_HEIGHT: f64 = 1.6;

/// Page size and margins in PDF points
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PageGeometry {
    pub width: f64,
    pub height: f64,
    pub top_margin: f64,
    pub bottom_margin: f64,
    pub side_margin: f64,
}

impl PageGeometry {
    pub fn a4() -> Self {
        Self {
            width: 595.28,
            height: 841.89,
            top_margin: 2.0 * PT_PER_CM,
            bottom_margin: 3.0 * PT_PER_CM,
            side_margin: 2.0 * PT_PER_CM,
        }
    }

    pub fn letter() -> Self {
        Self {
            width: 612.0,
            height: 792.0,
            ..Self::a4()
        }
    }

    pub fn content_width(&self) -> f64 {
        (self.width - 2.0 * self.side_margin).max(0.0)
    }

    /// Vertical space a fresh page offers to content
    pub fn usable_height(&self) -> f64 {
        (self.height - self.top_margin - self.bottom_margin).max(0.0)
    }
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self::a4()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
    Paragraph {
        lines: Vec<String>,
        font_size: f64,
        bold: bool,
    },
    /// First row is rendered bold when `header` is set
    Table {
        title: Option<String>,
        rows: Vec<Vec<String>>,
        header: bool,
        font_size: f64,
    },
    Image {
        image: Arc<ChartImage>,
        width: f64,
        height: f64,
    },
}

/// An opaque renderable unit with an estimated height.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutBlock {
    pub kind: BlockKind,
    pub height: f64,
}

impl LayoutBlock {
    pub fn paragraph(text: &str, font_size: f64, content_width: f64) -> Self {
        Self::text(text, font_size, false, content_width)
    }

    pub fn heading(text: &str, font_size: f64, content_width: f64) -> Self {
        Self::text(text, font_size, true, content_width)
    }

    fn text(text: &str, font_size: f64, bold: bool, content_width: f64) -> Self {
        let lines = wrap_text(text, font_size, content_width);
        let height = lines.len() as f64 * font_size * LEADING;
        Self {
            kind: BlockKind::Paragraph {
                lines,
                font_size,
                bold,
            },
            height,
        }
    }

    pub fn table(
        title: Option<&str>,
        rows: Vec<Vec<String>>,
        header: bool,
        font_size: f64,
    ) -> Self {
        let title_height = if title.is_some() {
            (font_size + 2.0) * LEADING
        } else {
            0.0
        };
        let height = title_height + rows.len() as f64 * font_size * ROW_HEIGHT;
        Self {
            kind: BlockKind::Table {
                title: title.map(str::to_string),
                rows,
                header,
                font_size,
            },
            height,
        }
    }

    /// An image at its native aspect ratio, scaled down to `max_width` if wider
    pub fn image(image: Arc<ChartImage>, display_width: f64, max_width: f64) -> Self {
        let width = display_width.min(max_width).max(1.0);
        let height = width * image.aspect_ratio();
        Self {
            kind: BlockKind::Image {
                image,
                width,
                height,
            },
            height,
        }
    }

    /// Short human-readable label used in protection logs
    pub fn describe(&self) -> String {
        match &self.kind {
            BlockKind::Paragraph { lines, .. } => {
                let first = lines.first().map(String::as_str).unwrap_or_default();
                format!("paragraph '{}'", truncate_chars(first, 40))
            }
            BlockKind::Table { title, rows, .. } => match title {
                Some(t) => format!("table '{}' ({} rows)", truncate_chars(t, 40), rows.len()),
                None => format!("table ({} rows)", rows.len()),
            },
            BlockKind::Image { width, height, .. } => {
                format!("image {:.0}x{:.0}pt", width, height)
            }
        }
    }
}

/// Output of the page protection logic, consumed in order by the renderer
#[derive(Debug, Clone, PartialEq)]
pub enum Emission {
    Block(LayoutBlock),
    Spacer(f64),
    PageBreak,
}

/// Maximum number of characters of the given size that fit into `width`
pub fn chars_per_line(font_size: f64, width: f64) -> usize {
    let glyph = (font_size * AVG_GLYPH_WIDTH).max(0.1);
    ((width / glyph).floor() as usize).max(1)
}

/// Greedy word wrap. Words longer than a line are hard-split.
pub fn wrap_text(text: &str, font_size: f64, width: f64) -> Vec<String> {
    let max_chars = chars_per_line(font_size, width);
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let mut current = String::new();
        let mut current_len = 0usize;

        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > max_chars {
                if current_len > 0 {
                    lines.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                let rest = word.split_off(max_chars);
                lines.push(word.into_iter().collect());
                word = rest;
            }
            let needed = if current_len == 0 {
                word.len()
            } else {
                current_len + 1 + word.len()
            };
            if needed > max_chars {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current.extend(word.iter());
            current_len += word.len();
        }

        lines.push(current);
    }

    lines
}

pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}
