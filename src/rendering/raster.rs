/// Rasterizer: paint commands onto an RGBA canvas, encoded as PNG

use super::layout::CHAR_WIDTH;
use super::paint::{PaintCommand, Rgba};
use crate::rendering::Screenshot;
use crate::{Error, Result};
use image::{imageops::FilterType, ImageFormat, Rgba as Pixel, RgbaImage};
use std::io::Cursor;

/// Ink block drawn for each visible character at scale 1
const GLYPH_WIDTH: u32 = 6;
const GLYPH_HEIGHT: u32 = 7;

fn blend(dst: &mut Pixel<u8>, src: Rgba) {
    let a = src.3 as u32;
    if a == 255 {
        *dst = Pixel([src.0, src.1, src.2, 255]);
        return;
    }
    let mix = |s: u8, d: u8| ((s as u32 * a + d as u32 * (255 - a)) / 255) as u8;
    *dst = Pixel([mix(src.0, dst[0]), mix(src.1, dst[1]), mix(src.2, dst[2]), 255]);
}

fn fill_rect(canvas: &mut RgbaImage, x: i32, y: i32, width: u32, height: u32, rgba: Rgba) {
    if rgba.3 == 0 {
        return;
    }
    let x0 = x.max(0) as u32;
    let y0 = y.max(0) as u32;
    let x1 = (x as i64 + width as i64).clamp(0, canvas.width() as i64) as u32;
    let y1 = (y as i64 + height as i64).clamp(0, canvas.height() as i64) as u32;
    for py in y0..y1 {
        for px in x0..x1 {
            blend(canvas.get_pixel_mut(px, py), rgba);
        }
    }
}

fn draw_text(canvas: &mut RgbaImage, x: i32, y: i32, text: &str, scale: u32, rgba: Rgba) {
    let scale = scale.max(1);
    for (i, ch) in text.chars().enumerate() {
        if ch.is_whitespace() {
            continue;
        }
        let cx = x + (i as u32 * CHAR_WIDTH * scale) as i32;
        fill_rect(canvas, cx, y, GLYPH_WIDTH * scale, GLYPH_HEIGHT * scale, rgba);
    }
}

/// Execute `cmds` on a `width`x`height` canvas and encode the result.
/// A `scale` other than 1.0 resamples the finished canvas.
pub fn rasterize(cmds: &[PaintCommand], width: u32, height: u32, scale: f64) -> Result<Screenshot> {
    if width == 0 || height == 0 {
        return Err(Error::SessionError(format!("cannot rasterize an empty {}x{} surface", width, height)));
    }
    let mut canvas = RgbaImage::from_pixel(width, height, Pixel([255, 255, 255, 255]));
    for cmd in cmds {
        match cmd {
            PaintCommand::SolidRect { x, y, width, height, rgba } => {
                fill_rect(&mut canvas, *x, *y, *width, *height, *rgba)
            }
            PaintCommand::Text { x, y, text, scale, rgba } => {
                draw_text(&mut canvas, *x, *y, text, *scale, *rgba)
            }
        }
    }

    if scale > 0.0 && (scale - 1.0).abs() > f64::EPSILON {
        let w = ((width as f64) * scale).round().max(1.0) as u32;
        let h = ((height as f64) * scale).round().max(1.0) as u32;
        canvas = image::imageops::resize(&canvas, w, h, FilterType::Triangle);
    }

    let (width, height) = canvas.dimensions();
    let mut png_data = Vec::new();
    canvas
        .write_to(&mut Cursor::new(&mut png_data), ImageFormat::Png)
        .map_err(|e| Error::SessionError(format!("PNG encoding failed: {}", e)))?;
    Ok(Screenshot { width, height, png_data })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(shot: &Screenshot) -> RgbaImage {
        image::load_from_memory_with_format(&shot.png_data, ImageFormat::Png)
            .unwrap()
            .to_rgba8()
    }

    #[test]
    fn rects_are_clipped_to_the_canvas() {
        let cmds = vec![PaintCommand::SolidRect {
            x: -10,
            y: 5,
            width: 30,
            height: 100,
            rgba: (255, 0, 0, 255),
        }];
        let shot = rasterize(&cmds, 32, 16, 1.0).unwrap();
        let img = decode(&shot);
        assert_eq!((shot.width, shot.height), (32, 16));
        assert_eq!(img.get_pixel(0, 15), &Pixel([255, 0, 0, 255]));
        assert_eq!(img.get_pixel(19, 5), &Pixel([255, 0, 0, 255]));
        assert_eq!(img.get_pixel(20, 5), &Pixel([255, 255, 255, 255]));
        assert_eq!(img.get_pixel(0, 4), &Pixel([255, 255, 255, 255]));
    }

    #[test]
    fn text_leaves_gaps_for_spaces() {
        let cmds = vec![PaintCommand::Text {
            x: 0,
            y: 0,
            text: "a b".into(),
            scale: 1,
            rgba: (0, 0, 0, 255),
        }];
        let img = decode(&rasterize(&cmds, 24, 8, 1.0).unwrap());
        assert_eq!(img.get_pixel(0, 0), &Pixel([0, 0, 0, 255]));
        assert_eq!(img.get_pixel(9, 0), &Pixel([255, 255, 255, 255]));
        assert_eq!(img.get_pixel(16, 0), &Pixel([0, 0, 0, 255]));
    }

    #[test]
    fn scale_resamples_the_output() {
        let shot = rasterize(&[], 20, 10, 2.0).unwrap();
        assert_eq!((shot.width, shot.height), (40, 20));
    }

    #[test]
    fn empty_surface_is_an_error() {
        assert!(rasterize(&[], 0, 10, 1.0).is_err());
    }
}
