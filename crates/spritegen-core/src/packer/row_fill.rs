use super::Packer;
use crate::model::Rect;

/// Fills rows left to right inside a fixed bin width; rows stack downwards and are as tall
/// as their tallest member.
#[derive(Debug, Clone)]
pub struct RowFillPacker {
    bin_width: u32,
    x: u32,
    y: u32,
    row_height: u32,
    width: u32,
    height: u32,
}

impl RowFillPacker {
    pub fn new(bin_width: u32) -> Self {
        Self {
            bin_width,
            x: 0,
            y: 0,
            row_height: 0,
            width: 0,
            height: 0,
        }
    }

    pub fn bin_width(&self) -> u32 {
        self.bin_width
    }

    /// Width still free in the current row.
    pub fn remaining(&self) -> u32 {
        self.bin_width.saturating_sub(self.x)
    }

    /// Closes the current row; the next placement starts at the left edge below it.
    pub fn new_row(&mut self) {
        self.y += self.row_height;
        self.x = 0;
        self.row_height = 0;
    }

    /// Places `rect` at the cursor whether or not it fits the remaining width.
    pub fn force_pack(&mut self, rect: &Rect) -> Rect {
        let placed = Rect::new(self.x, self.y, rect.w, rect.h);
        self.x += rect.w;
        self.row_height = self.row_height.max(rect.h);
        self.width = self.width.max(placed.right());
        self.height = self.height.max(placed.bottom());
        placed
    }

    /// Bounding size of everything placed so far.
    pub fn extent(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Packer for RowFillPacker {
    fn can_pack(&self, rect: &Rect) -> bool {
        rect.w <= self.remaining()
    }

    fn pack(&mut self, rect: &Rect) -> Option<Rect> {
        if !self.can_pack(rect) {
            return None;
        }
        Some(self.force_pack(rect))
    }
}
