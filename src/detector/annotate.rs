use super::types::Detection;
use crate::error::DetectorError;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use rusttype::{Font, Scale};
use tracing::{debug, warn};

const LABEL_FONT_SIZE: f32 = 16.0;
const BOX_THICKNESS: i32 = 2;

/// Palette cycled per label so each class keeps a stable colour
const PALETTE: [[u8; 3]; 6] = [
    [255, 56, 56],
    [255, 157, 151],
    [255, 112, 31],
    [72, 249, 10],
    [0, 194, 255],
    [207, 210, 49],
];

/// Draws detection boxes (and labels, when a font is available) and encodes
/// the result as JPEG.
pub struct Annotator {
    font: Option<Font<'static>>,
    jpeg_quality: u8,
}

impl Annotator {
    pub fn new(font_path: Option<&str>, jpeg_quality: u8) -> Self {
        let font = font_path.and_then(|path| match std::fs::read(path) {
            Ok(data) => {
                let font = Font::try_from_vec(data);
                if font.is_none() {
                    warn!("Failed to parse font file '{}', labels disabled", path);
                }
                font
            }
            Err(e) => {
                warn!("Failed to read font file '{}': {}, labels disabled", path, e);
                None
            }
        });

        Self {
            font,
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Draw every detection onto `image` and return the JPEG bytes
    pub fn render(&self, mut image: RgbImage, detections: &[Detection]) -> Result<Vec<u8>, DetectorError> {
        for detection in detections {
            self.draw_detection(&mut image, detection);
        }
        self.encode(&image)
    }

    pub fn encode(&self, image: &RgbImage) -> Result<Vec<u8>, DetectorError> {
        let mut output = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut output, self.jpeg_quality);
        encoder
            .encode_image(image)
            .map_err(|e| DetectorError::Encode {
                details: e.to_string(),
            })?;
        Ok(output)
    }

    fn draw_detection(&self, image: &mut RgbImage, detection: &Detection) {
        let (img_w, img_h) = image.dimensions();
        if img_w == 0 || img_h == 0 {
            return;
        }

        let bbox = detection.bbox();
        let x1 = (bbox.x.max(0.0) as i32).min(img_w as i32 - 1);
        let y1 = (bbox.y.max(0.0) as i32).min(img_h as i32 - 1);
        let x2 = ((bbox.x + bbox.width) as i32).clamp(x1 + 1, img_w as i32);
        let y2 = ((bbox.y + bbox.height) as i32).clamp(y1 + 1, img_h as i32);
        let color = Rgb(color_for(detection.label()));

        for inset in 0..BOX_THICKNESS {
            let w = x2 - x1 - 2 * inset;
            let h = y2 - y1 - 2 * inset;
            if w <= 0 || h <= 0 {
                break;
            }
            draw_hollow_rect_mut(
                image,
                Rect::at(x1 + inset, y1 + inset).of_size(w as u32, h as u32),
                color,
            );
        }

        if let Some(font) = &self.font {
            let text = format!("{} {:.2}", detection.label(), detection.confidence());
            let scale = Scale::uniform(LABEL_FONT_SIZE);
            let (text_w, text_h) = text_size(scale, font, &text);
            let text_w = text_w.max(1) + 4;
            let text_h = text_h.max(1) + 4;
            let label_y = if y1 >= text_h { y1 - text_h } else { y1 };

            draw_filled_rect_mut(
                image,
                Rect::at(x1, label_y).of_size(text_w as u32, text_h as u32),
                color,
            );
            draw_text_mut(
                image,
                Rgb([255, 255, 255]),
                x1 + 2,
                label_y + 2,
                scale,
                font,
                &text,
            );
        }

        debug!(
            "Annotated {} ({:.2}) at [{}, {}, {}, {}]",
            detection.label(),
            detection.confidence(),
            x1,
            y1,
            x2,
            y2
        );
    }
}

fn color_for(label: &str) -> [u8; 3] {
    let hash = label
        .bytes()
        .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
    PALETTE[hash % PALETTE.len()]
}
