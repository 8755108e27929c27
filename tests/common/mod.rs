mod fixtures;
pub use fixtures::*;

use digitscan::classification::Classifier;
use digitscan::config::PipelineConfig;
use digitscan::detection::RectangleDetector;
use digitscan::error::ClassificationError;
use digitscan::pipeline::PipelineController;
use digitscan::source::ImageSource;
use std::sync::Arc;

/// Wire a controller from test doubles with default settings
pub fn controller(
    source: impl ImageSource + 'static,
    detector: impl RectangleDetector + 'static,
    classifier: impl Classifier + 'static,
) -> Arc<PipelineController> {
    controller_with(
        source,
        Arc::new(detector),
        Ok(Arc::new(classifier) as Arc<dyn Classifier>),
        PipelineConfig::default(),
    )
}

pub fn controller_with(
    source: impl ImageSource + 'static,
    detector: Arc<dyn RectangleDetector>,
    classifier: Result<Arc<dyn Classifier>, ClassificationError>,
    config: PipelineConfig,
) -> Arc<PipelineController> {
    Arc::new(PipelineController::new(
        Box::new(source),
        detector,
        classifier,
        config,
    ))
}
