pub mod contours;

use tracing::{debug, warn};

use crate::error::DetectionError;
use crate::models::{Image, Quadrilateral};

pub use contours::ContourRectangleDetector;

/// Something that can find rectangular regions in an image.
///
/// Implementations may return any number of candidates in their own order of
/// preference; `detect_rectangle` decides which one the pipeline uses.
pub trait RectangleDetector: Send + Sync {
    fn detect(&self, image: &Image) -> Result<Vec<Quadrilateral>, DetectionError>;

    /// Human-readable name (used in logs)
    fn name(&self) -> &str;
}

/// Result of running detection on one image. None of these are errors.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionOutcome {
    Found(Quadrilateral),
    NoCandidate,
    /// The first candidate does not fit inside the image
    OutOfBounds(Quadrilateral),
}

impl DetectionOutcome {
    pub fn quad(&self) -> Option<&Quadrilateral> {
        match self {
            DetectionOutcome::Found(quad) => Some(quad),
            _ => None,
        }
    }
}

/// Run the detector and keep its first candidate, provided it lies inside the image.
/// No re-ranking happens here.
pub fn detect_rectangle(
    detector: &dyn RectangleDetector,
    image: &Image,
) -> Result<DetectionOutcome, DetectionError> {
    let candidates = detector.detect(image)?;
    debug!(
        detector = detector.name(),
        candidates = candidates.len(),
        "Rectangle detection finished"
    );

    let Some(first) = candidates.into_iter().next() else {
        return Ok(DetectionOutcome::NoCandidate);
    };

    if !first.fits_within(image.width(), image.height()) {
        warn!(
            quad = ?first,
            width = image.width(),
            height = image.height(),
            "Invalid detected rectangle"
        );
        return Ok(DetectionOutcome::OutOfBounds(first));
    }

    Ok(DetectionOutcome::Found(first))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Point;
    use image::DynamicImage;

    struct Fixed(Vec<Quadrilateral>);

    impl RectangleDetector for Fixed {
        fn detect(&self, _image: &Image) -> Result<Vec<Quadrilateral>, DetectionError> {
            Ok(self.0.clone())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn blank() -> Image {
        Image::new(DynamicImage::new_luma8(64, 48))
    }

    #[test]
    fn first_candidate_wins_without_reranking() {
        let small = Quadrilateral::from_rect(0.4, 0.4, 0.5, 0.5);
        let large = Quadrilateral::from_rect(0.1, 0.1, 0.9, 0.9);
        let outcome = detect_rectangle(&Fixed(vec![small, large]), &blank()).unwrap();
        assert_eq!(outcome, DetectionOutcome::Found(small));
    }

    #[test]
    fn no_candidates_is_not_an_error() {
        let outcome = detect_rectangle(&Fixed(vec![]), &blank()).unwrap();
        assert_eq!(outcome, DetectionOutcome::NoCandidate);
        assert!(outcome.quad().is_none());
    }

    #[test]
    fn out_of_bounds_first_candidate_is_rejected() {
        let mut quad = Quadrilateral::from_rect(0.1, 0.1, 0.9, 0.9);
        quad.top_left = Point::new(0.1, -0.2);
        let fallback = Quadrilateral::from_rect(0.2, 0.2, 0.8, 0.8);
        let outcome = detect_rectangle(&Fixed(vec![quad, fallback]), &blank()).unwrap();
        assert_eq!(outcome, DetectionOutcome::OutOfBounds(quad));
    }

    #[test]
    fn backend_errors_propagate() {
        struct Broken;
        impl RectangleDetector for Broken {
            fn detect(&self, _image: &Image) -> Result<Vec<Quadrilateral>, DetectionError> {
                Err(DetectionError::Backend("sensor glitch".to_string()))
            }
            fn name(&self) -> &str {
                "broken"
            }
        }
        assert!(detect_rectangle(&Broken, &blank()).is_err());
    }
}
