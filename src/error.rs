//! Error types for each pipeline stage.
//!
//! Expected real-world outcomes (no rectangle found, user cancelled) are
//! absorbed at their stage boundary. Everything else propagates to the
//! controller, which turns it into status text.

use thiserror::Error;

/// Failure to obtain an image from the camera or the picker
#[derive(Error, Debug)]
pub enum AcquisitionError {
    /// The user dismissed the picker; silent
    #[error("user cancelled image selection")]
    UserCancelled,

    #[error("no capture device available: {reason}")]
    DeviceUnavailable { reason: String },

    #[error("failed to decode image")]
    Decode(#[source] image::ImageError),

    #[error("failed to read image")]
    Io(#[from] std::io::Error),
}

impl From<image::ImageError> for AcquisitionError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::IoError(io) => AcquisitionError::Io(io),
            other => AcquisitionError::Decode(other),
        }
    }
}

/// Failure of the rectangle detector itself. Finding nothing is not an error.
#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("rectangle detector failed: {0}")]
    Backend(String),

    #[error("rectangle detection timed out after {0:?}")]
    Timeout(std::time::Duration),
}

#[derive(Error, Debug)]
pub enum ClassificationError {
    /// The model artifact could not be loaded; the classifier stays disabled
    #[error("failed to load classification model: {reason}")]
    ModelLoadFailure { reason: String },

    #[error("classifier returned no labels")]
    EmptyResult,

    #[error("classification failed: {0}")]
    Inference(String),

    #[error("classification timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Anything that ends a run in the `Failed` state
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error(transparent)]
    Detection(#[from] DetectionError),

    #[error(transparent)]
    Classification(#[from] ClassificationError),

    /// A background stage panicked or was cancelled
    #[error("pipeline worker failed: {0}")]
    Worker(String),
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(err: tokio::task::JoinError) -> Self {
        PipelineError::Worker(err.to_string())
    }
}
