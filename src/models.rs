use image::DynamicImage;
use image::metadata::Orientation as ExifOrientation;
use std::sync::Arc;

use crate::error::ClassificationError;

/// How raw sensor data maps to displayed pixels (EXIF values 1..=8)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    #[default]
    Up,
    UpMirrored,
    Down,
    DownMirrored,
    LeftMirrored,
    Right,
    RightMirrored,
    Left,
}

impl Orientation {
    /// Parse an EXIF orientation value; anything outside 1..=8 is `None`
    pub fn from_exif(value: u8) -> Option<Self> {
        match value {
            1 => Some(Orientation::Up),
            2 => Some(Orientation::UpMirrored),
            3 => Some(Orientation::Down),
            4 => Some(Orientation::DownMirrored),
            5 => Some(Orientation::LeftMirrored),
            6 => Some(Orientation::Right),
            7 => Some(Orientation::RightMirrored),
            8 => Some(Orientation::Left),
            _ => None,
        }
    }

    pub fn to_exif(self) -> u8 {
        match self {
            Orientation::Up => 1,
            Orientation::UpMirrored => 2,
            Orientation::Down => 3,
            Orientation::DownMirrored => 4,
            Orientation::LeftMirrored => 5,
            Orientation::Right => 6,
            Orientation::RightMirrored => 7,
            Orientation::Left => 8,
        }
    }

    /// Whether normalizing this orientation swaps width and height
    pub fn swaps_dimensions(self) -> bool {
        matches!(
            self,
            Orientation::LeftMirrored
                | Orientation::Right
                | Orientation::RightMirrored
                | Orientation::Left
        )
    }
}

impl From<ExifOrientation> for Orientation {
    fn from(value: ExifOrientation) -> Self {
        match value {
            ExifOrientation::NoTransforms => Orientation::Up,
            ExifOrientation::FlipHorizontal => Orientation::UpMirrored,
            ExifOrientation::Rotate180 => Orientation::Down,
            ExifOrientation::FlipVertical => Orientation::DownMirrored,
            ExifOrientation::Rotate90FlipH => Orientation::LeftMirrored,
            ExifOrientation::Rotate90 => Orientation::Right,
            ExifOrientation::Rotate270FlipH => Orientation::RightMirrored,
            ExifOrientation::Rotate270 => Orientation::Left,
        }
    }
}

impl From<Orientation> for ExifOrientation {
    fn from(value: Orientation) -> Self {
        match value {
            Orientation::Up => ExifOrientation::NoTransforms,
            Orientation::UpMirrored => ExifOrientation::FlipHorizontal,
            Orientation::Down => ExifOrientation::Rotate180,
            Orientation::DownMirrored => ExifOrientation::FlipVertical,
            Orientation::LeftMirrored => ExifOrientation::Rotate90FlipH,
            Orientation::Right => ExifOrientation::Rotate90,
            Orientation::RightMirrored => ExifOrientation::Rotate270FlipH,
            Orientation::Left => ExifOrientation::Rotate270,
        }
    }
}

/// An acquired image, already rotated into "up" pixel space.
///
/// Pixels are shared through an `Arc` so the image can be handed to worker
/// threads and kept for display without copying.
#[derive(Debug, Clone)]
pub struct Image {
    pixels: Arc<DynamicImage>,
    source_orientation: Orientation,
}

impl Image {
    /// Wrap pixels that are already upright
    pub fn new(pixels: DynamicImage) -> Self {
        Self {
            pixels: Arc::new(pixels),
            source_orientation: Orientation::Up,
        }
    }

    /// Fold the orientation tag into the pixels
    pub fn from_oriented(mut pixels: DynamicImage, orientation: Orientation) -> Self {
        pixels.apply_orientation(orientation.into());
        Self {
            pixels: Arc::new(pixels),
            source_orientation: orientation,
        }
    }

    pub fn pixels(&self) -> &DynamicImage {
        &self.pixels
    }

    /// Orientation the source reported before normalization
    pub fn source_orientation(&self) -> Orientation {
        self.source_orientation
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Axis-aligned box in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelBounds {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl PixelBounds {
    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }

    /// Inclusive containment in `[0, width] x [0, height]`
    pub fn is_within(&self, width: u32, height: u32) -> bool {
        let finite = self.min_x.is_finite()
            && self.min_y.is_finite()
            && self.max_x.is_finite()
            && self.max_y.is_finite();
        finite
            && self.min_x >= 0.0
            && self.min_y >= 0.0
            && self.max_x <= width as f32
            && self.max_y <= height as f32
    }
}

/// Four corners normalized to `[0,1] x [0,1]`, origin top-left, y down
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quadrilateral {
    pub top_left: Point,
    pub top_right: Point,
    pub bottom_left: Point,
    pub bottom_right: Point,
}

impl Quadrilateral {
    pub fn new(top_left: Point, top_right: Point, bottom_left: Point, bottom_right: Point) -> Self {
        Self {
            top_left,
            top_right,
            bottom_left,
            bottom_right,
        }
    }

    /// Axis-aligned quad from normalized min/max coordinates
    pub fn from_rect(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        Self::new(
            Point::new(min_x, min_y),
            Point::new(max_x, min_y),
            Point::new(min_x, max_y),
            Point::new(max_x, max_y),
        )
    }

    pub fn corners(&self) -> [Point; 4] {
        [
            self.top_left,
            self.top_right,
            self.bottom_left,
            self.bottom_right,
        ]
    }

    /// Corners scaled to pixel space, same order as `corners`
    pub fn to_pixels(&self, width: u32, height: u32) -> [Point; 4] {
        let (w, h) = (width as f32, height as f32);
        self.corners().map(|p| Point::new(p.x * w, p.y * h))
    }

    pub fn pixel_bounds(&self, width: u32, height: u32) -> PixelBounds {
        let pts = self.to_pixels(width, height);
        let mut bounds = PixelBounds {
            min_x: f32::INFINITY,
            min_y: f32::INFINITY,
            max_x: f32::NEG_INFINITY,
            max_y: f32::NEG_INFINITY,
        };
        for p in pts {
            // NaN propagates so the bounds check rejects it
            if !p.is_finite() {
                return PixelBounds {
                    min_x: f32::NAN,
                    min_y: f32::NAN,
                    max_x: f32::NAN,
                    max_y: f32::NAN,
                };
            }
            bounds.min_x = bounds.min_x.min(p.x);
            bounds.min_y = bounds.min_y.min(p.y);
            bounds.max_x = bounds.max_x.max(p.x);
            bounds.max_y = bounds.max_y.max(p.y);
        }
        bounds
    }

    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.pixel_bounds(width, height).is_within(width, height)
    }
}

/// Output of the rectifier: light strokes on a dark background
#[derive(Debug, Clone)]
pub struct RectifiedImage {
    pub image: image::GrayImage,
    pub quad: Quadrilateral,
}

impl RectifiedImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label: String,
    pub confidence: f32,
}

impl Classification {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// Non-empty list of classifications, highest confidence first
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    ranked: Vec<Classification>,
}

impl ClassificationResult {
    /// Sort candidates by descending confidence.
    ///
    /// An empty list is `EmptyResult`; a confidence that is NaN or outside
    /// `[0, 1]` is rejected as an inference failure.
    pub fn from_candidates(
        mut candidates: Vec<Classification>,
    ) -> Result<Self, ClassificationError> {
        if candidates.is_empty() {
            return Err(ClassificationError::EmptyResult);
        }
        if let Some(bad) = candidates
            .iter()
            .find(|c| !(0.0..=1.0).contains(&c.confidence))
        {
            return Err(ClassificationError::Inference(format!(
                "confidence {} for label {:?} is outside [0, 1]",
                bad.confidence, bad.label
            )));
        }
        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        Ok(Self { ranked: candidates })
    }

    /// Pair labels with scores index by index, then rank
    pub fn from_scores(labels: &[String], scores: &[f32]) -> Result<Self, ClassificationError> {
        let candidates = labels
            .iter()
            .zip(scores)
            .map(|(label, score)| Classification::new(label.clone(), *score))
            .collect();
        Self::from_candidates(candidates)
    }

    pub fn top(&self) -> &Classification {
        // Non-empty by construction
        &self.ranked[0]
    }

    pub fn ranked(&self) -> &[Classification] {
        &self.ranked
    }

    pub fn len(&self) -> usize {
        self.ranked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }
}
