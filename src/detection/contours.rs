use image::{DynamicImage, GrayImage};
use imageproc::contours::{BorderType, find_contours};
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometry::{approximate_polygon_dp, arc_length};
use imageproc::point::Point as PixelPoint;
use tracing::debug;

use super::RectangleDetector;
use crate::config::DetectorConfig;
use crate::error::DetectionError;
use crate::models::{Image, Point, Quadrilateral};

/// Grayscale, blur, then Canny edges
pub fn edge_map(img: &DynamicImage, config: &DetectorConfig) -> GrayImage {
    let gray = img.to_luma8();
    let blurred = gaussian_blur_f32(&gray, config.blur_sigma);
    canny(&blurred, config.canny_low, config.canny_high)
}

/// Finds convex four-sided outlines in the edge map.
///
/// Candidates come back largest first.
#[derive(Debug, Clone, Default)]
pub struct ContourRectangleDetector {
    config: DetectorConfig,
}

impl ContourRectangleDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    /// Quads in pixel coordinates, paired with their area
    fn pixel_quads(&self, edges: &GrayImage) -> Vec<([PixelPoint<f32>; 4], f64)> {
        let image_area = edges.width() as f64 * edges.height() as f64;
        let min_area = image_area * self.config.min_area_ratio;
        let contours = find_contours::<i32>(edges);

        let mut quads = Vec::new();
        for contour in contours {
            if !matches!(contour.border_type, BorderType::Outer) || contour.points.len() < 4 {
                continue;
            }

            let perimeter = arc_length(&contour.points, true);
            let epsilon = perimeter * self.config.approx_epsilon_ratio;
            let mut polygon = approximate_polygon_dp(&contour.points, epsilon, true);
            if polygon.len() > 1 && polygon.first() == polygon.last() {
                polygon.pop();
            }
            if polygon.len() != 4 {
                continue;
            }

            let corners =
                [0, 1, 2, 3].map(|i| PixelPoint::new(polygon[i].x as f32, polygon[i].y as f32));
            let area = shoelace_area(&corners);
            if area < min_area || !is_convex(&corners) {
                continue;
            }
            quads.push((corners, area));
        }

        quads.sort_by(|a, b| b.1.total_cmp(&a.1));
        quads
    }
}

impl RectangleDetector for ContourRectangleDetector {
    fn detect(&self, image: &Image) -> Result<Vec<Quadrilateral>, DetectionError> {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Ok(Vec::new());
        }

        let edges = edge_map(image.pixels(), &self.config);
        let quads = self.pixel_quads(&edges);
        debug!(quads = quads.len(), "Quadrilateral contours found");

        Ok(quads
            .into_iter()
            .map(|(corners, _)| normalize(order_corners(corners), width, height))
            .collect())
    }

    fn name(&self) -> &str {
        "Contour Rectangle Detection"
    }
}

/// Label a quad given in boundary order as top-left, top-right, bottom-left, bottom-right.
///
/// The cyclic order is kept and made clockwise on screen (y down), then
/// rotated to start at the top-left-most vertex (smallest x + y, ties go to
/// the smaller y). Every input vertex appears exactly once in the output.
fn order_corners(points: [PixelPoint<f32>; 4]) -> [PixelPoint<f32>; 4] {
    let mut ring = points;
    if signed_area(&ring) < 0.0 {
        ring.reverse();
    }

    let start = (0..4)
        .min_by(|&a, &b| {
            let key = |p: &PixelPoint<f32>| (p.x + p.y, p.y);
            let (ka, kb) = (key(&ring[a]), key(&ring[b]));
            ka.0.total_cmp(&kb.0).then(ka.1.total_cmp(&kb.1))
        })
        .unwrap_or(0);
    ring.rotate_left(start);

    let [top_left, top_right, bottom_right, bottom_left] = ring;
    [top_left, top_right, bottom_left, bottom_right]
}

fn normalize(corners: [PixelPoint<f32>; 4], width: u32, height: u32) -> Quadrilateral {
    let (w, h) = (width as f32, height as f32);
    let [tl, tr, bl, br] = corners.map(|p| Point::new(p.x / w, p.y / h));
    Quadrilateral::new(tl, tr, bl, br)
}

/// Shoelace area, positive when the boundary runs clockwise on screen
fn signed_area(points: &[PixelPoint<f32>]) -> f64 {
    let n = points.len();
    let twice: f64 = (0..n)
        .map(|i| {
            let (a, b) = (points[i], points[(i + 1) % n]);
            a.x as f64 * b.y as f64 - b.x as f64 * a.y as f64
        })
        .sum();
    twice / 2.0
}

/// Polygon area, vertices in boundary order
fn shoelace_area(points: &[PixelPoint<f32>]) -> f64 {
    signed_area(points).abs()
}

/// All turns go the same way; vertices in boundary order
fn is_convex(points: &[PixelPoint<f32>]) -> bool {
    let n = points.len();
    let mut sign = 0.0f32;
    for i in 0..n {
        let (a, b, c) = (points[i], points[(i + 1) % n], points[(i + 2) % n]);
        let cross = (b.x - a.x) * (c.y - b.y) - (b.y - a.y) * (c.x - b.x);
        if cross == 0.0 {
            continue;
        }
        if sign == 0.0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return false;
        }
    }
    sign != 0.0
}
