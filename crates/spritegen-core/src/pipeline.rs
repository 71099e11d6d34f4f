use crate::compositing::{compose, encode_png};
use crate::error::Result;
use crate::intake::load_elements;
use crate::io::FileReader;
use crate::model::{ImageDescriptor, SheetStats, SpriteElement};
use crate::packer::layout_elements;
use crate::stylesheet;
use std::time::Instant;
use tracing::{debug, instrument};

/// Encoded composite and the positioned elements it was drawn from.
pub struct SpriteSheet {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Elements in placement order.
    pub elements: Vec<SpriteElement>,
}

impl SpriteSheet {
    pub fn stats(&self) -> SheetStats {
        SheetStats::compute(&self.elements, self.width, self.height)
    }

    pub fn stylesheet(&self, url: &str, fingerprint: &str) -> String {
        stylesheet::emit(&self.elements, url, fingerprint)
    }
}

#[instrument(skip_all, fields(count = elements.len()))]
/// Lays out `elements`, draws them and encodes the composite as PNG.
pub fn build_sprite(mut elements: Vec<SpriteElement>) -> Result<SpriteSheet> {
    let start = Instant::now();
    let (width, height) = layout_elements(&mut elements)?;
    let canvas = compose(&elements, width, height);
    let png = encode_png(&canvas)?;
    debug!(
        width,
        height,
        bytes = png.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "sprite composed"
    );
    Ok(SpriteSheet {
        png,
        width,
        height,
        elements,
    })
}

/// Intake followed by `build_sprite`.
pub fn build_from_descriptors(
    descriptors: &[ImageDescriptor],
    reader: &dyn FileReader,
    border_width: u32,
) -> Result<SpriteSheet> {
    let elements = load_elements(descriptors, reader, border_width)?;
    build_sprite(elements)
}
