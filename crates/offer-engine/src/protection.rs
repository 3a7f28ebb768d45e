//! Page-break protection for visually atomic groups
//!
//! The manager mirrors the renderer's vertical cursor with a greedy height
//! estimate. A protected group is placed where it is if it fits, otherwise
//! it is pushed to a fresh page. A group taller than a whole page still
//! starts on a fresh page and is then allowed to overflow; that is the only
//! case where a group may split, and it is recorded as an overflow warning.
//!
//! Overflowing text continues line by line on the following pages. Images
//! are never split: a block that does not fit moves to the next page, and an
//! image taller than the usable height is drawn whole on a page of its own.

use offer_pdf::{BlockKind, Emission, LayoutBlock, PageGeometry};
use offer_types::{ProtectionAction, ProtectionLogEntry};
use tracing::{debug, warn};

/// Space left on the current page above the bottom margin
pub fn estimate_remaining_space(
    current_page_cursor: f64,
    page_height: f64,
    min_bottom_margin: f64,
) -> f64 {
    (page_height - min_bottom_margin - current_page_cursor).max(0.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeState {
    Accumulating,
    /// A group did not fit; a page break is about to be emitted
    FlushPending,
}

/// Blocks that must render on the same page
#[derive(Debug, Clone, PartialEq)]
pub struct ProtectedGroup {
    pub blocks: Vec<LayoutBlock>,
    pub total_height: f64,
    pub strict: bool,
    pub description: String,
}

impl ProtectedGroup {
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[derive(Debug, Clone)]
pub struct PageProtectionManager {
    geometry: PageGeometry,
    block_spacing: f64,
    /// Distance of the next free line from the page top
    cursor: f64,
    page_number: u32,
    page_has_content: bool,
    state: ComposeState,
    log: Vec<ProtectionLogEntry>,
}

impl PageProtectionManager {
    pub fn new(geometry: PageGeometry, block_spacing: f64) -> Self {
        Self {
            geometry,
            block_spacing,
            cursor: geometry.top_margin,
            page_number: 1,
            page_has_content: false,
            state: ComposeState::Accumulating,
            log: Vec::new(),
        }
    }

    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    pub fn state(&self) -> ComposeState {
        self.state
    }

    pub fn log(&self) -> &[ProtectionLogEntry] {
        &self.log
    }

    pub fn into_log(self) -> Vec<ProtectionLogEntry> {
        self.log
    }

    pub fn remaining_space(&self) -> f64 {
        estimate_remaining_space(self.cursor, self.geometry.height, self.geometry.bottom_margin)
    }

    /// Sum of block heights plus the fixed spacing between consecutive blocks
    pub fn wrap_group(&self, blocks: Vec<LayoutBlock>, strict: bool) -> ProtectedGroup {
        let content: f64 = blocks.iter().map(|b| b.height).sum();
        let gaps = blocks.len().saturating_sub(1) as f64 * self.block_spacing;
        let description = match blocks.first() {
            Some(first) if blocks.len() > 1 => {
                format!("{} (+{} blocks)", first.describe(), blocks.len() - 1)
            }
            Some(first) => first.describe(),
            None => "empty group".to_string(),
        };
        ProtectedGroup {
            blocks,
            total_height: content + gaps,
            strict,
            description,
        }
    }

    pub fn place(&mut self, group: ProtectedGroup) -> Vec<Emission> {
        let mut emissions = Vec::new();
        if group.blocks.is_empty() {
            return emissions;
        }

        let usable = self.geometry.usable_height();

        if group.total_height <= self.remaining_space() {
            self.record(ProtectionAction::Placed, &group.description);
        } else if group.total_height <= usable {
            self.transition(ComposeState::FlushPending);
            self.break_page(&mut emissions, &group.description);
            self.transition(ComposeState::Accumulating);
            self.record(ProtectionAction::Placed, &group.description);
        } else {
            self.transition(ComposeState::FlushPending);
            self.break_page(&mut emissions, &group.description);
            self.transition(ComposeState::Accumulating);
            if group.strict {
                warn!(
                    group = %group.description,
                    height = group.total_height,
                    usable,
                    "Protected group exceeds a full page and will overflow"
                );
            } else {
                debug!(group = %group.description, "Non-strict group overflows a full page");
            }
            self.record(ProtectionAction::OverflowWarning, &group.description);
        }

        self.emit_blocks(&mut emissions, group);
        emissions
    }

    /// Emit a spacer, or a page break when the space left after it would be
    /// less than `min_space_for_next`
    pub fn add_spacing(&mut self, amount: f64, min_space_for_next: f64) -> Vec<Emission> {
        let mut emissions = Vec::new();
        let remaining = self.remaining_space();
        if amount >= remaining || remaining - amount < min_space_for_next {
            self.break_page(&mut emissions, "spacing");
        } else {
            self.cursor += amount;
            emissions.push(Emission::Spacer(amount));
        }
        emissions
    }

    /// Force the following content onto a new page
    pub fn new_page(&mut self) -> Vec<Emission> {
        let mut emissions = Vec::new();
        self.break_page(&mut emissions, "explicit");
        emissions
    }

    /// Advance the cursor the way the renderer lays the blocks out
    fn emit_blocks(&mut self, emissions: &mut Vec<Emission>, group: ProtectedGroup) {
        let count = group.blocks.len();
        for (index, block) in group.blocks.into_iter().enumerate() {
            if self.page_has_content && self.remaining_space() < block.height {
                self.page_number += 1;
                self.cursor = self.geometry.top_margin;
            }
            match block.kind {
                // Drawn whole, even past the bottom margin
                BlockKind::Image { .. } => self.cursor += block.height,
                BlockKind::Paragraph { .. } | BlockKind::Table { .. } => self.flow(block.height),
            }
            self.page_has_content = true;
            emissions.push(Emission::Block(block));

            if index + 1 < count {
                self.advance_spacer(self.block_spacing);
                emissions.push(Emission::Spacer(self.block_spacing));
            }
        }
    }

    /// Text continues line by line on the following pages
    fn flow(&mut self, height: f64) {
        self.cursor += height;
        let usable = self.geometry.usable_height();
        let bottom = self.geometry.height - self.geometry.bottom_margin;
        let mut spill = self.cursor - bottom;
        while spill > 0.0 && usable > 0.0 {
            self.page_number += 1;
            if spill <= usable {
                self.cursor = self.geometry.top_margin + spill;
                break;
            }
            spill -= usable;
            self.cursor = bottom;
        }
    }

    /// A spacer that does not fit ends the page
    fn advance_spacer(&mut self, amount: f64) {
        let bottom = self.geometry.height - self.geometry.bottom_margin;
        if self.cursor + amount > bottom {
            if self.page_has_content {
                self.page_number += 1;
            }
            self.cursor = self.geometry.top_margin;
            self.page_has_content = false;
        } else {
            self.cursor += amount;
        }
    }

    /// Start a new page unless the current one is still empty
    fn break_page(&mut self, emissions: &mut Vec<Emission>, description: &str) {
        if self.page_has_content {
            emissions.push(Emission::PageBreak);
            self.page_number += 1;
            self.record(ProtectionAction::PageBreak, description);
        }
        self.cursor = self.geometry.top_margin;
        self.page_has_content = false;
    }

    fn transition(&mut self, next: ComposeState) {
        if self.state != next {
            debug!(
                from = ?self.state,
                to = ?next,
                page = self.page_number,
                "Compose state change"
            );
            self.state = next;
        }
    }

    fn record(&mut self, action: ProtectionAction, description: &str) {
        self.log.push(ProtectionLogEntry {
            page_number: self.page_number,
            action,
            group_description: description.to_string(),
        });
    }
}
