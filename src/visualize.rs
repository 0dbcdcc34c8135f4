//! Draws detected instances onto a copy of the input image.
//!
//! Each class gets a fixed color from a small palette keyed by class id, so
//! runs over the same vocabulary render consistently. Captions use a 5x7
//! bitmap font; nothing here depends on the model or the config layer.

use std::path::Path;

use geo_types::coord;
use image::{imageops, DynamicImage, Rgb, RgbImage};

use crate::error::Result;
use crate::Instance;

const PALETTE: [[u8; 3]; 8] = [
    [230, 25, 75],
    [60, 180, 75],
    [0, 130, 200],
    [245, 130, 48],
    [145, 30, 180],
    [70, 240, 240],
    [240, 50, 230],
    [210, 180, 60],
];

const CAPTION_HEIGHT: i32 = 12;
const GLYPH_ADVANCE: i32 = 6;

#[derive(Debug, Clone)]
pub struct Visualizer {
    /// Render scale applied to the output canvas; 1.0 keeps input dimensions.
    pub scale: f32,
    pub box_thickness: u32,
}

impl Default for Visualizer {
    fn default() -> Self {
        Self {
            scale: 1.0,
            box_thickness: 3,
        }
    }
}

impl Visualizer {
    /// Overlay all instances (boxes, then captions) on a copy of `img`.
    pub fn annotate(&self, img: &DynamicImage, instances: &[Instance]) -> RgbImage {
        let mut canvas = if (self.scale - 1.0).abs() > f32::EPSILON {
            let width = ((img.width() as f32 * self.scale).round() as u32).max(1);
            let height = ((img.height() as f32 * self.scale).round() as u32).max(1);
            img.resize_exact(width, height, imageops::FilterType::Triangle)
                .to_rgb8()
        } else {
            img.to_rgb8()
        };

        let scaled: Vec<Instance> = instances
            .iter()
            .map(|inst| self.scale_into(inst, canvas.width(), canvas.height()))
            .collect();

        for inst in &scaled {
            draw_box(
                &mut canvas,
                inst.bbox.min().x as u32,
                inst.bbox.min().y as u32,
                inst.bbox.max().x as u32,
                inst.bbox.max().y as u32,
                self.box_thickness,
                class_color(inst.class_id),
            );
        }

        // captions in a second pass so neighboring boxes never paint over text
        for inst in &scaled {
            let caption = format!("{} {:.0}%", inst.label, inst.score * 100.0);
            let x = inst.bbox.min().x as i32;
            let y = (inst.bbox.min().y as i32 - CAPTION_HEIGHT).max(0);
            let text_width = caption.chars().count() as i32 * GLYPH_ADVANCE;
            fill_rect(&mut canvas, x, y, x + text_width, y + 8, Rgb([0, 0, 0]));
            draw_text(&mut canvas, x + 1, y + 1, &caption, class_color(inst.class_id));
        }

        canvas
    }

    fn scale_into(&self, inst: &Instance, width: u32, height: u32) -> Instance {
        let mut inst = inst.clone();
        let (min, max) = (inst.bbox.min(), inst.bbox.max());
        inst.bbox.set_min(coord! { x: min.x * self.scale, y: min.y * self.scale });
        inst.bbox.set_max(coord! { x: max.x * self.scale, y: max.y * self.scale });
        inst.clamp_to(width, height);
        inst
    }
}

/// Save the annotated image, format chosen by the output extension. An
/// unwritable directory or unknown extension surfaces as the encoder error.
pub fn write_image(img: &RgbImage, path: &Path) -> Result<()> {
    img.save(path)?;
    tracing::info!(path = %path.display(), "annotated image written");
    Ok(())
}

fn class_color(class_id: i64) -> Rgb<u8> {
    Rgb(PALETTE[class_id.rem_euclid(PALETTE.len() as i64) as usize])
}

fn draw_box(
    image: &mut RgbImage,
    x1: u32,
    y1: u32,
    x2: u32,
    y2: u32,
    thickness: u32,
    color: Rgb<u8>,
) {
    for dy in 0..thickness {
        let y1_thick = y1.saturating_add(dy);
        let y2_thick = y2.saturating_sub(dy);

        for x in x1..=x2.min(image.width().saturating_sub(1)) {
            if y1_thick < image.height() {
                image.put_pixel(x, y1_thick, color);
            }
            if y2_thick < image.height() {
                image.put_pixel(x, y2_thick, color);
            }
        }
    }

    for dx in 0..thickness {
        let x1_thick = x1.saturating_add(dx);
        let x2_thick = x2.saturating_sub(dx);

        for y in y1..=y2.min(image.height().saturating_sub(1)) {
            if x1_thick < image.width() {
                image.put_pixel(x1_thick, y, color);
            }
            if x2_thick < image.width() {
                image.put_pixel(x2_thick, y, color);
            }
        }
    }
}

fn fill_rect(image: &mut RgbImage, left: i32, top: i32, right: i32, bottom: i32, color: Rgb<u8>) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    let left = left.clamp(0, width.saturating_sub(1));
    let right = right.clamp(0, width.saturating_sub(1));
    let top = top.clamp(0, height.saturating_sub(1));
    let bottom = bottom.clamp(0, height.saturating_sub(1));

    for y in top..=bottom {
        for x in left..=right {
            *image.get_pixel_mut(x as u32, y as u32) = color;
        }
    }
}

fn draw_text(image: &mut RgbImage, mut x: i32, y: i32, text: &str, color: Rgb<u8>) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    for ch in text.chars().flat_map(|c| c.to_uppercase()) {
        if let Some(glyph) = glyph_bits(ch) {
            for (row, pattern) in glyph.iter().enumerate() {
                let py = y + row as i32;
                if py < 0 || py >= height {
                    continue;
                }
                for col in 0..5 {
                    if (pattern >> (4 - col)) & 1 == 1 {
                        let px = x + col as i32;
                        if px >= 0 && px < width {
                            *image.get_pixel_mut(px as u32, py as u32) = color;
                        }
                    }
                }
            }
        }
        x += GLYPH_ADVANCE;
    }
}

#[rustfmt::skip]
fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    match ch {
        'A' => Some([0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001]),
        'B' => Some([0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110]),
        'C' => Some([0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110]),
        'D' => Some([0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110]),
        'E' => Some([0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b11111]),
        'F' => Some([0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b10000]),
        'G' => Some([0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111]),
        'H' => Some([0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001]),
        'I' => Some([0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110]),
        'J' => Some([0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100]),
        'K' => Some([0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001]),
        'L' => Some([0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111]),
        'M' => Some([0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001]),
        'N' => Some([0b10001, 0b11001, 0b10101, 0b10101, 0b10011, 0b10001, 0b10001]),
        'O' => Some([0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110]),
        'P' => Some([0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000]),
        'Q' => Some([0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101]),
        'R' => Some([0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001]),
        'S' => Some([0b01111, 0b10000, 0b01110, 0b00001, 0b00001, 0b10001, 0b01110]),
        'T' => Some([0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100]),
        'U' => Some([0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110]),
        'V' => Some([0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100]),
        'W' => Some([0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b11011, 0b10001]),
        'X' => Some([0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001]),
        'Y' => Some([0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100]),
        'Z' => Some([0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111]),
        '0' => Some([0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110]),
        '1' => Some([0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110]),
        '2' => Some([0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111]),
        '3' => Some([0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110]),
        '4' => Some([0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010]),
        '5' => Some([0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110]),
        '6' => Some([0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110]),
        '7' => Some([0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000]),
        '8' => Some([0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110]),
        '9' => Some([0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100]),
        '%' => Some([0b10001, 0b10010, 0b00100, 0b01000, 0b10010, 0b10001, 0b00000]),
        '-' => Some([0b00000, 0b00000, 0b00000, 0b11111, 0b00000, 0b00000, 0b00000]),
        '.' => Some([0, 0, 0, 0, 0, 0b00110, 0b00110]),
        ' ' => Some([0, 0, 0, 0, 0, 0, 0]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([255, 255, 255])))
    }

    #[test]
    fn annotate_preserves_input_dimensions() {
        let img = blank(200, 300);
        let instances = vec![Instance::new(20.0, 40.0, 120.0, 140.0, 0, "text", 0.91, "dit")];
        let out = Visualizer::default().annotate(&img, &instances);
        assert_eq!(out.dimensions(), (200, 300));
    }

    #[test]
    fn annotate_draws_onto_the_canvas() {
        let img = blank(200, 300);
        let instances = vec![Instance::new(20.0, 40.0, 120.0, 140.0, 0, "text", 0.91, "dit")];
        let out = Visualizer::default().annotate(&img, &instances);
        // top edge of the box takes the class color
        assert_eq!(*out.get_pixel(50, 40), class_color(0));
        // caption background above the box is black
        assert_eq!(*out.get_pixel(21, 30), Rgb([0, 0, 0]));
    }

    #[test]
    fn scale_resizes_the_canvas() {
        let img = blank(100, 100);
        let viz = Visualizer {
            scale: 2.0,
            ..Visualizer::default()
        };
        let out = viz.annotate(&img, &[]);
        assert_eq!(out.dimensions(), (200, 200));
    }

    #[test]
    fn out_of_bounds_boxes_are_clamped() {
        let img = blank(100, 100);
        let instances = vec![
            Instance::new(-50.0, -50.0, 400.0, 400.0, 3, "table", 0.99, "dit"),
            Instance::new(90.0, 0.0, 150.0, 10.0, 1, "title", 0.85, "dit"),
        ];
        // must not panic on any pixel write
        let out = Visualizer::default().annotate(&img, &instances);
        assert_eq!(out.dimensions(), (100, 100));
    }

    #[cfg(feature = "png")]
    #[test]
    fn written_image_is_decodable_with_input_dimensions() {
        let img = blank(64, 48);
        let instances = vec![Instance::new(5.0, 5.0, 30.0, 20.0, 2, "list", 0.88, "dit")];
        let out = Visualizer::default().annotate(&img, &instances);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page_annotated.png");
        write_image(&out, &path).unwrap();

        let reloaded = image::open(&path).unwrap();
        assert_eq!((reloaded.width(), reloaded.height()), (64, 48));
    }

    #[test]
    fn distinct_classes_get_distinct_colors() {
        let colors: Vec<_> = (0..5).map(class_color).collect();
        for (i, a) in colors.iter().enumerate() {
            for b in colors.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }
}
