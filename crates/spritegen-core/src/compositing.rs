use crate::error::Result;
use crate::model::SpriteElement;
use image::{ImageFormat, RgbaImage};
use std::io::Cursor;

/// Blit `src` into `canvas` with its top-left at (dx, dy). Pixels falling
/// outside the canvas are dropped.
pub fn blit_rgba(src: &RgbaImage, canvas: &mut RgbaImage, dx: u32, dy: u32) {
    let (cw, ch) = canvas.dimensions();
    let (sw, sh) = src.dimensions();
    for yy in 0..sh {
        if dy + yy >= ch {
            break;
        }
        for xx in 0..sw {
            if dx + xx >= cw {
                break;
            }
            canvas.put_pixel(dx + xx, dy + yy, *src.get_pixel(xx, yy));
        }
    }
}

/// Draws every positioned element onto a transparent `width x height` canvas.
/// Content goes at the element's slot origin shifted by its border.
pub fn compose(elements: &[SpriteElement], width: u32, height: u32) -> RgbaImage {
    let mut canvas = RgbaImage::new(width, height);
    for e in elements {
        let (dx, dy) = e.content_origin();
        blit_rgba(&e.image, &mut canvas, dx, dy);
    }
    canvas
}

/// Lossless PNG encoding of `canvas`.
pub fn encode_png(canvas: &RgbaImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    canvas.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn blit_clips_to_canvas() {
        let src = RgbaImage::from_pixel(4, 4, Rgba([9, 9, 9, 255]));
        let mut canvas = RgbaImage::new(6, 6);
        blit_rgba(&src, &mut canvas, 4, 4);
        assert_eq!(*canvas.get_pixel(5, 5), Rgba([9, 9, 9, 255]));
        assert_eq!(*canvas.get_pixel(3, 3), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn png_round_trip_is_lossless() {
        let mut canvas = RgbaImage::new(3, 2);
        canvas.put_pixel(1, 1, Rgba([10, 20, 30, 40]));
        let bytes = encode_png(&canvas).unwrap();
        let back = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(back, canvas);
    }
}
