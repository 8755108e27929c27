use std::path::PathBuf;
use std::time::Duration;

/// Parameters for the contour-based rectangle detector
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub blur_sigma: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    /// Douglas-Peucker tolerance as a fraction of the contour perimeter
    pub approx_epsilon_ratio: f64,
    /// Smallest accepted quad area as a fraction of the image area
    pub min_area_ratio: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            blur_sigma: 1.5,
            canny_low: 50.0,
            canny_high: 100.0,
            approx_epsilon_ratio: 0.02,
            min_area_ratio: 0.02,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RectifierConfig {
    /// Contrast scale around mid-gray, applied after full desaturation
    pub contrast: f32,
}

impl Default for RectifierConfig {
    fn default() -> Self {
        Self { contrast: 32.0 }
    }
}

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub model_path: PathBuf,
    /// One label per line; `None` means the digits 0-9
    pub labels_path: Option<PathBuf>,
    pub input_width: u32,
    pub input_height: u32,
}

impl ClassifierConfig {
    /// `$HOME/.cache/digitscan/mnist.rten`, or a relative path when no home is set
    pub fn default_model_path() -> PathBuf {
        std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .map(|home| PathBuf::from(home).join(".cache/digitscan/mnist.rten"))
            .unwrap_or_else(|_| PathBuf::from("mnist.rten"))
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model_path: Self::default_model_path(),
            labels_path: None,
            input_width: 28,
            input_height: 28,
        }
    }
}

/// Everything the pipeline needs besides its pluggable stages
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub detector: DetectorConfig,
    pub rectifier: RectifierConfig,
    pub classifier: ClassifierConfig,
    pub detection_timeout: Duration,
    pub classification_timeout: Duration,
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self {
            detector: DetectorConfig::default(),
            rectifier: RectifierConfig::default(),
            classifier: ClassifierConfig::default(),
            detection_timeout: Duration::from_secs(10),
            classification_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_detector(mut self, detector: DetectorConfig) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_rectifier(mut self, rectifier: RectifierConfig) -> Self {
        self.rectifier = rectifier;
        self
    }

    pub fn with_classifier(mut self, classifier: ClassifierConfig) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_detection_timeout(mut self, timeout: Duration) -> Self {
        self.detection_timeout = timeout;
        self
    }

    pub fn with_classification_timeout(mut self, timeout: Duration) -> Self {
        self.classification_timeout = timeout;
        self
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new()
    }
}
