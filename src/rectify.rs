//! Perspective rectification of a detected quadrilateral.
//!
//! The output is tuned for a digit classifier trained on light strokes over a
//! dark background: the region is straightened, reduced to gray, pushed
//! towards black and white by a strong contrast boost, then inverted.

use image::{GrayImage, Luma, Rgba, RgbaImage};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use imageproc::map::map_colors;
use tracing::{debug, warn};

use crate::config::RectifierConfig;
use crate::models::{Image, PixelBounds, Quadrilateral, RectifiedImage};

/// Integer crop rectangle `(x, y, width, height)`, at least one pixel each way
fn crop_rect(bounds: &PixelBounds, width: u32, height: u32) -> (u32, u32, u32, u32) {
    let x0 = (bounds.min_x.floor().max(0.0) as u32).min(width - 1);
    let y0 = (bounds.min_y.floor().max(0.0) as u32).min(height - 1);
    let x1 = (bounds.max_x.ceil() as u32).clamp(x0 + 1, width);
    let y1 = (bounds.max_y.ceil() as u32).clamp(y0 + 1, height);
    (x0, y0, x1 - x0, y1 - y0)
}

/// Desaturate, scale contrast around mid-gray, then invert
fn tone(pixel: Rgba<u8>, contrast: f32) -> Luma<u8> {
    let [r, g, b, _] = pixel.0;
    let luma = (0.2126 * r as f32 + 0.7152 * g as f32 + 0.0722 * b as f32) / 255.0;
    let contrasted = ((luma - 0.5) * contrast + 0.5).clamp(0.0, 1.0);
    Luma([((1.0 - contrasted) * 255.0).round() as u8])
}

#[derive(Debug, Clone, Default)]
pub struct PerspectiveRectifier {
    config: RectifierConfig,
}

impl PerspectiveRectifier {
    pub fn new(config: RectifierConfig) -> Self {
        Self { config }
    }

    /// Straighten `quad` out of `image`. Never fails for a quad inside the image.
    pub fn rectify(&self, image: &Image, quad: &Quadrilateral) -> RectifiedImage {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return RectifiedImage {
                image: GrayImage::new(0, 0),
                quad: *quad,
            };
        }

        let bounds = quad.pixel_bounds(width, height);
        let (x, y, crop_w, crop_h) = crop_rect(&bounds, width, height);
        let cropped = image.pixels().crop_imm(x, y, crop_w, crop_h).to_rgba8();

        let [tl, tr, bl, br] = quad
            .to_pixels(width, height)
            .map(|p| (p.x - x as f32, p.y - y as f32));
        let (cw, ch) = (crop_w as f32, crop_h as f32);
        let target = [(0.0, 0.0), (cw, 0.0), (0.0, ch), (cw, ch)];

        let straightened = match Projection::from_control_points([tl, tr, bl, br], target) {
            Some(projection) => {
                let mut out = RgbaImage::new(crop_w, crop_h);
                warp_into(
                    &cropped,
                    &projection,
                    Interpolation::Bilinear,
                    Rgba([255, 255, 255, 255]),
                    &mut out,
                );
                out
            }
            None => {
                warn!(quad = ?quad, "Degenerate quadrilateral, using unwarped crop");
                cropped
            }
        };

        let contrast = self.config.contrast;
        let toned = map_colors(&straightened, |p| tone(p, contrast));
        debug!(
            x,
            y,
            width = crop_w,
            height = crop_h,
            contrast,
            "Rectified region"
        );

        RectifiedImage {
            image: toned,
            quad: *quad,
        }
    }
}
