use digitscan::classification::Classifier;
use digitscan::detection::RectangleDetector;
use digitscan::error::{AcquisitionError, ClassificationError, DetectionError};
use digitscan::models::{
    Classification, ClassificationResult, Image, Quadrilateral, RectifiedImage,
};
use digitscan::source::{AcquireMode, ImageSource};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_polygon_mut};
use imageproc::point::Point as PixelPoint;
use imageproc::rect::Rect;
use std::collections::VecDeque;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::NamedTempFile;

pub const CARD_IMAGE_SIZE: (u32, u32) = (240, 200);

/// A light index card on a dark table with a hand-drawn looking "7" on it
pub fn digit_card_image() -> DynamicImage {
    let (w, h) = CARD_IMAGE_SIZE;
    let mut img = RgbImage::from_pixel(w, h, Rgb([35, 35, 35]));
    draw_filled_rect_mut(&mut img, Rect::at(60, 40).of_size(120, 120), Rgb([238, 238, 238]));

    // Top bar and the slanted stem of the seven
    draw_filled_rect_mut(&mut img, Rect::at(85, 62).of_size(70, 12), Rgb([15, 15, 15]));
    let stem = [
        PixelPoint::new(143, 74),
        PixelPoint::new(155, 74),
        PixelPoint::new(118, 140),
        PixelPoint::new(106, 140),
    ];
    draw_polygon_mut(&mut img, &stem, Rgb([15, 15, 15]));

    DynamicImage::ImageRgb8(img)
}

/// Evenly lit, featureless frame
pub fn blank_image() -> DynamicImage {
    let (w, h) = CARD_IMAGE_SIZE;
    DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([128, 128, 128])))
}

/// Writes the image to a temp PNG; the file is removed when dropped
pub fn save_png(image: &DynamicImage) -> NamedTempFile {
    let file = tempfile::Builder::new()
        .suffix(".png")
        .tempfile()
        .expect("Failed to create temp image file");
    image
        .save_with_format(file.path(), ImageFormat::Png)
        .expect("Failed to save test image");
    file
}

/// Encode as JPEG and splice in an EXIF block carrying `orientation`
pub fn jpeg_with_orientation(image: &DynamicImage, orientation: u8) -> Vec<u8> {
    let mut jpeg = Vec::new();
    image
        .to_rgb8()
        .write_to(&mut std::io::Cursor::new(&mut jpeg), ImageFormat::Jpeg)
        .expect("Failed to encode JPEG");

    let mut app1 = vec![0xFF, 0xE1, 0x00, 0x22];
    app1.extend_from_slice(b"Exif\0\0");
    // Little-endian TIFF header, first IFD at offset 8
    app1.extend_from_slice(&[0x49, 0x49, 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00]);
    // One entry: Orientation (0x0112), SHORT, count 1
    app1.extend_from_slice(&[0x01, 0x00]);
    app1.extend_from_slice(&[0x12, 0x01, 0x03, 0x00, 0x01, 0x00, 0x00, 0x00]);
    app1.extend_from_slice(&[orientation, 0x00, 0x00, 0x00]);
    app1.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);

    // Right after the SOI marker
    let mut out = jpeg[..2].to_vec();
    out.extend_from_slice(&app1);
    out.extend_from_slice(&jpeg[2..]);
    out
}

/// Shared record of which stage ran, in order
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Events starting with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.events().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

/// Hands out queued acquisition results; an empty queue behaves like a cancelled picker
pub struct ScriptedSource {
    queue: Mutex<VecDeque<Result<Image, AcquisitionError>>>,
    log: EventLog,
}

impl ScriptedSource {
    pub fn new(results: Vec<Result<Image, AcquisitionError>>, log: EventLog) -> Self {
        Self {
            queue: Mutex::new(results.into()),
            log,
        }
    }

    pub fn images(images: Vec<DynamicImage>, log: EventLog) -> Self {
        Self::new(images.into_iter().map(|i| Ok(Image::new(i))).collect(), log)
    }
}

impl ImageSource for ScriptedSource {
    fn acquire(&self, mode: AcquireMode) -> Result<Image, AcquisitionError> {
        self.log.push(format!("acquire:{:?}", mode));
        self.queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(AcquisitionError::UserCancelled))
    }
}

/// Returns the same candidates for every image
pub struct FixedDetector {
    quads: Vec<Quadrilateral>,
    log: EventLog,
}

impl FixedDetector {
    pub fn new(quads: Vec<Quadrilateral>, log: EventLog) -> Self {
        Self { quads, log }
    }
}

impl RectangleDetector for FixedDetector {
    fn detect(&self, _image: &Image) -> Result<Vec<Quadrilateral>, DetectionError> {
        self.log.push("detect");
        Ok(self.quads.clone())
    }

    fn name(&self) -> &str {
        "Fixed Detector"
    }
}

/// Blocks one call (the first by default) until released, other calls return at once
pub struct GatedDetector {
    quads: Vec<Quadrilateral>,
    gated_call: usize,
    calls: AtomicUsize,
    gate: Mutex<Option<Receiver<()>>>,
    log: EventLog,
}

impl GatedDetector {
    pub fn new(quads: Vec<Quadrilateral>, log: EventLog) -> (Self, Sender<()>) {
        Self::on_call(1, quads, log)
    }

    /// Gate the `n`th call, counting from 1
    pub fn on_call(n: usize, quads: Vec<Quadrilateral>, log: EventLog) -> (Self, Sender<()>) {
        let (release, gate) = channel();
        let detector = Self {
            quads,
            gated_call: n,
            calls: AtomicUsize::new(0),
            gate: Mutex::new(Some(gate)),
            log,
        };
        (detector, release)
    }
}

impl RectangleDetector for GatedDetector {
    fn detect(&self, _image: &Image) -> Result<Vec<Quadrilateral>, DetectionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let gate = if call == self.gated_call {
            self.gate.lock().unwrap().take()
        } else {
            None
        };
        if let Some(gate) = gate {
            self.log.push("detect:gated");
            let _ = gate.recv_timeout(Duration::from_secs(5));
        } else {
            self.log.push("detect");
        }
        Ok(self.quads.clone())
    }

    fn name(&self) -> &str {
        "Gated Detector"
    }
}

pub struct FailingDetector;

impl RectangleDetector for FailingDetector {
    fn detect(&self, _image: &Image) -> Result<Vec<Quadrilateral>, DetectionError> {
        Err(DetectionError::Backend("sensor glitch".to_string()))
    }

    fn name(&self) -> &str {
        "Failing Detector"
    }
}

/// Answers every image with the same ranked labels and records what it saw
pub struct FixedClassifier {
    candidates: Vec<(String, f32)>,
    log: EventLog,
}

impl FixedClassifier {
    pub fn new(candidates: &[(&str, f32)], log: EventLog) -> Self {
        Self {
            candidates: candidates
                .iter()
                .map(|(label, confidence)| (label.to_string(), *confidence))
                .collect(),
            log,
        }
    }

    /// The "7" case: strongly seven, a little bit one
    pub fn seven(log: EventLog) -> Self {
        Self::new(&[("7", 0.97), ("1", 0.02), ("9", 0.01)], log)
    }
}

impl Classifier for FixedClassifier {
    fn classify(&self, image: &RectifiedImage) -> Result<ClassificationResult, ClassificationError> {
        self.log
            .push(format!("classify:{}x{}", image.width(), image.height()));
        let candidates = self
            .candidates
            .iter()
            .map(|(label, confidence)| Classification::new(label.clone(), *confidence))
            .collect();
        ClassificationResult::from_candidates(candidates)
    }

    fn name(&self) -> &str {
        "Fixed Classifier"
    }
}

/// Holds the worker thread until released, or gives up after a while
pub struct StalledClassifier {
    gate: Mutex<Receiver<()>>,
}

impl StalledClassifier {
    pub fn new() -> (Self, Sender<()>) {
        let (release, gate) = channel();
        (
            Self {
                gate: Mutex::new(gate),
            },
            release,
        )
    }
}

impl Classifier for StalledClassifier {
    fn classify(&self, _image: &RectifiedImage) -> Result<ClassificationResult, ClassificationError> {
        let _ = self.gate.lock().unwrap().recv_timeout(Duration::from_secs(5));
        ClassificationResult::from_candidates(vec![Classification::new("0", 1.0)])
    }

    fn name(&self) -> &str {
        "Stalled Classifier"
    }
}
