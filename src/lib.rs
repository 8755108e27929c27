pub mod classification;
pub mod config;
pub mod detection;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod rectify;
pub mod source;

pub use classification::{Classifier, RtenClassifier};
pub use config::{ClassifierConfig, DetectorConfig, PipelineConfig, RectifierConfig};
pub use detection::{ContourRectangleDetector, DetectionOutcome, RectangleDetector};
pub use error::{AcquisitionError, ClassificationError, DetectionError, PipelineError};
pub use models::{
    Classification, ClassificationResult, Image, Orientation, Point, Quadrilateral, RectifiedImage,
};
pub use pipeline::{DisplayState, PipelineController, PipelineState, RunOutcome, RunReport};
pub use rectify::PerspectiveRectifier;
pub use source::{AcquireMode, CommandCamera, DeviceImageSource, ImagePicker, ImageSource, PathPicker};
