use crate::error::{Result, SpriteError};
use crate::model::{Rect, SpriteElement};
use std::cmp::Ordering;
use tracing::instrument;

pub mod row_fill;

pub use row_fill::RowFillPacker;

/// A packer places rectangles into a bin.
///
/// Implementations must ensure no overlaps. `pack` returns `None` if the
/// rectangle does not fit at the packer's current position.
pub trait Packer {
    fn can_pack(&self, rect: &Rect) -> bool;
    fn pack(&mut self, rect: &Rect) -> Option<Rect>;
}

/// Orders by aspect ratio closest to 1:1 first (min side / max side, descending),
/// then larger area first, then name ascending. Zero-sized rectangles rank last.
pub fn squareness_cmp(a: &SpriteElement, b: &SpriteElement) -> Ordering {
    let (an, ad) = ratio(&a.rect);
    let (bn, bd) = ratio(&b.rect);
    // an/ad vs bn/bd without floats; descending
    (bn * ad)
        .cmp(&(an * bd))
        .then_with(|| area(&b.rect).cmp(&area(&a.rect)))
        .then_with(|| a.name.cmp(&b.name))
}

fn ratio(r: &Rect) -> (u64, u64) {
    let (lo, hi) = (r.w.min(r.h) as u64, r.w.max(r.h) as u64);
    if hi == 0 { (0, 1) } else { (lo, hi) }
}

fn area(r: &Rect) -> u64 {
    (r.w as u64) * (r.h as u64)
}

pub fn sort_by_squareness(elements: &mut [SpriteElement]) {
    elements.sort_by(squareness_cmp);
}

#[instrument(skip_all, fields(count = elements.len()))]
/// Assigns every element's rectangle and returns the canvas extent `(width, height)`.
///
/// Elements are reordered: on return `elements` is in placement order.
/// The bin width is the widest element, so a fresh row always accepts its first candidate.
pub fn layout_elements(elements: &mut Vec<SpriteElement>) -> Result<(u32, u32)> {
    if elements.is_empty() {
        return Err(SpriteError::Empty);
    }
    sort_by_squareness(elements);
    let bin_width = elements.iter().map(|e| e.rect.w).max().unwrap_or(0);

    let mut packer = RowFillPacker::new(bin_width);
    let mut pending: Vec<SpriteElement> = std::mem::take(elements);
    let mut positioned: Vec<SpriteElement> = Vec::with_capacity(pending.len());

    while !pending.is_empty() {
        let idx = match pending.iter().position(|e| packer.can_pack(&e.rect)) {
            Some(i) => i,
            None => {
                packer.new_row();
                0
            }
        };
        let mut e = pending.remove(idx);
        e.rect = packer.force_pack(&e.rect);
        positioned.push(e);
    }

    *elements = positioned;
    Ok(packer.extent())
}

/// Canvas extent of already positioned elements.
pub fn extent(elements: &[SpriteElement]) -> (u32, u32) {
    elements.iter().fold((0, 0), |(w, h), e| {
        (w.max(e.rect.right()), h.max(e.rect.bottom()))
    })
}
