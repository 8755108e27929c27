//! Pipeline controller: acquisition → detection → rectification → classification.
//!
//! Each user action starts a run with a fresh, monotonically increasing run id.
//! Stages run one after another on the blocking pool, and every update to the
//! shared display state is dropped unless it comes from the latest run.
//! Status lines are also broadcast one by one, so a listener sees every line
//! even when the display state moves on before it looks.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::classification::Classifier;
use crate::config::PipelineConfig;
use crate::detection::{DetectionOutcome, RectangleDetector, detect_rectangle};
use crate::error::{AcquisitionError, ClassificationError, DetectionError, PipelineError};
use crate::models::{Classification, ClassificationResult, Image, Quadrilateral, RectifiedImage};
use crate::rectify::PerspectiveRectifier;
use crate::source::{AcquireMode, ImageSource};

pub const ANALYZING_STATUS: &str = "Analyzing Image…";
pub const NO_DETECTION_STATUS: &str = "No rectangles detected.";

const STATUS_LINE_CAPACITY: usize = 32;

/// Status line for a successful classification
pub fn classification_status(best: &Classification) -> String {
    format!(
        "Classification: \"{}\" Confidence: {}",
        best.label, best.confidence
    )
}

/// Status line for a failed run, including the error's causes
pub fn failure_status(error: &PipelineError) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    format!("Error: {}", message)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    Acquiring,
    Detecting,
    NoDetection,
    Rectifying,
    Classifying,
    Done,
    Failed,
}

impl PipelineState {
    /// The run is over and the controller is waiting for the next action
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            PipelineState::Idle
                | PipelineState::NoDetection
                | PipelineState::Done
                | PipelineState::Failed
        )
    }
}

/// What the user sees: one status line, the acquired image and the rectified image
#[derive(Debug, Clone, Default)]
pub struct DisplayState {
    pub run_id: u64,
    pub state: PipelineState,
    pub status: Option<String>,
    pub image: Option<Image>,
    pub rectified: Option<RectifiedImage>,
    pub result: Option<ClassificationResult>,
}

#[derive(Debug)]
pub enum RunOutcome {
    /// The picker was dismissed; nothing changed
    Cancelled,
    NoDetection,
    Classified(ClassificationResult),
    Failed(PipelineError),
    /// A newer run started before this one finished; its results were discarded
    Superseded,
}

#[derive(Debug)]
pub struct RunReport {
    pub run_id: u64,
    pub outcome: RunOutcome,
}

impl RunReport {
    /// State the run settled in; `None` when it was superseded
    pub fn state(&self) -> Option<PipelineState> {
        match self.outcome {
            RunOutcome::Cancelled => Some(PipelineState::Idle),
            RunOutcome::NoDetection => Some(PipelineState::NoDetection),
            RunOutcome::Classified(_) => Some(PipelineState::Done),
            RunOutcome::Failed(_) => Some(PipelineState::Failed),
            RunOutcome::Superseded => None,
        }
    }
}

pub struct PipelineController {
    source: Box<dyn ImageSource>,
    detector: Arc<dyn RectangleDetector>,
    rectifier: PerspectiveRectifier,
    classifier: Result<Arc<dyn Classifier>, String>,
    config: PipelineConfig,
    latest_run: AtomicU64,
    display: watch::Sender<DisplayState>,
    status_lines: broadcast::Sender<String>,
}

impl PipelineController {
    /// A classifier that failed to load leaves the controller usable, with
    /// classification permanently disabled.
    pub fn new(
        source: Box<dyn ImageSource>,
        detector: Arc<dyn RectangleDetector>,
        classifier: Result<Arc<dyn Classifier>, ClassificationError>,
        config: PipelineConfig,
    ) -> Self {
        let classifier = classifier.map_err(|err| {
            warn!(error = %err, "Classifier unavailable, classification disabled");
            err.to_string()
        });
        let (display, _) = watch::channel(DisplayState::default());
        let (status_lines, _) = broadcast::channel(STATUS_LINE_CAPACITY);
        Self {
            source,
            detector,
            rectifier: PerspectiveRectifier::new(config.rectifier.clone()),
            classifier,
            config,
            latest_run: AtomicU64::new(0),
            display,
            status_lines,
        }
    }

    /// Persistent message when the classifier could not be loaded at startup
    pub fn classifier_status(&self) -> Option<String> {
        self.classifier
            .as_ref()
            .err()
            .map(|reason| format!("Classification disabled: {}", reason))
    }

    pub fn snapshot(&self) -> DisplayState {
        self.display.borrow().clone()
    }

    pub fn state(&self) -> PipelineState {
        self.display.borrow().state
    }

    pub fn status(&self) -> Option<String> {
        self.display.borrow().status.clone()
    }

    /// Latest display state, with change notification
    pub fn subscribe(&self) -> watch::Receiver<DisplayState> {
        self.display.subscribe()
    }

    /// Every status line shown from now on, in order
    pub fn status_lines(&self) -> broadcast::Receiver<String> {
        self.status_lines.subscribe()
    }

    /// Perform one full pipeline run for a user action
    pub async fn run(&self, mode: AcquireMode) -> RunReport {
        let run_id = self.latest_run.fetch_add(1, Ordering::SeqCst) + 1;
        info!(run_id, ?mode, "Starting pipeline run");

        self.publish(run_id, |display| {
            display.run_id = run_id;
            display.state = PipelineState::Acquiring;
        });

        let outcome = self.execute(run_id, mode).await;
        match &outcome {
            RunOutcome::Superseded => debug!(run_id, "Run superseded, results discarded"),
            RunOutcome::Classified(result) => info!(
                run_id,
                label = %result.top().label,
                confidence = result.top().confidence,
                "Run finished"
            ),
            other => debug!(run_id, outcome = ?other, "Run finished"),
        }
        RunReport { run_id, outcome }
    }

    async fn execute(&self, run_id: u64, mode: AcquireMode) -> RunOutcome {
        // Acquisition stays on the caller's task
        let image = match self.source.acquire(mode) {
            Ok(image) => image,
            Err(AcquisitionError::UserCancelled) => {
                debug!(run_id, "Acquisition cancelled by user");
                self.publish(run_id, |display| display.state = PipelineState::Idle);
                return RunOutcome::Cancelled;
            }
            Err(err) => return self.fail(run_id, err.into()),
        };

        let shown = self.publish(run_id, |display| {
            display.state = PipelineState::Detecting;
            display.status = Some(ANALYZING_STATUS.to_string());
            display.image = Some(image.clone());
            display.rectified = None;
            display.result = None;
        });
        if !shown {
            return RunOutcome::Superseded;
        }

        let quad = match self.detect(image.clone()).await {
            Ok(DetectionOutcome::Found(quad)) => quad,
            Ok(DetectionOutcome::NoCandidate) | Ok(DetectionOutcome::OutOfBounds(_)) => {
                let shown = self.publish(run_id, |display| {
                    display.state = PipelineState::NoDetection;
                    display.status = Some(NO_DETECTION_STATUS.to_string());
                });
                return if shown {
                    RunOutcome::NoDetection
                } else {
                    RunOutcome::Superseded
                };
            }
            Err(err) => return self.fail(run_id, err),
        };

        if !self.publish(run_id, |display| display.state = PipelineState::Rectifying) {
            return RunOutcome::Superseded;
        }
        let rectified = match self.rectify(image, quad).await {
            Ok(rectified) => rectified,
            Err(err) => return self.fail(run_id, err),
        };

        let shown = self.publish(run_id, |display| {
            display.state = PipelineState::Classifying;
            display.rectified = Some(rectified.clone());
        });
        if !shown {
            return RunOutcome::Superseded;
        }

        let classifier = match &self.classifier {
            Ok(classifier) => Arc::clone(classifier),
            Err(reason) => {
                let err = ClassificationError::ModelLoadFailure {
                    reason: reason.clone(),
                };
                return self.fail(run_id, err.into());
            }
        };

        match self.classify(classifier, rectified).await {
            Ok(result) => {
                let shown = self.publish(run_id, |display| {
                    display.state = PipelineState::Done;
                    display.status = Some(classification_status(result.top()));
                    display.result = Some(result.clone());
                });
                if shown {
                    RunOutcome::Classified(result)
                } else {
                    RunOutcome::Superseded
                }
            }
            Err(err) => self.fail(run_id, err),
        }
    }

    async fn detect(&self, image: Image) -> Result<DetectionOutcome, PipelineError> {
        let detector = Arc::clone(&self.detector);
        let task = tokio::task::spawn_blocking(move || detect_rectangle(detector.as_ref(), &image));
        let timeout = self.config.detection_timeout;
        match tokio::time::timeout(timeout, task).await {
            Ok(joined) => Ok(joined??),
            Err(_) => Err(DetectionError::Timeout(timeout).into()),
        }
    }

    async fn rectify(
        &self,
        image: Image,
        quad: Quadrilateral,
    ) -> Result<RectifiedImage, PipelineError> {
        let rectifier = self.rectifier.clone();
        let rectified =
            tokio::task::spawn_blocking(move || rectifier.rectify(&image, &quad)).await?;
        Ok(rectified)
    }

    async fn classify(
        &self,
        classifier: Arc<dyn Classifier>,
        rectified: RectifiedImage,
    ) -> Result<ClassificationResult, PipelineError> {
        let task = tokio::task::spawn_blocking(move || classifier.classify(&rectified));
        let timeout = self.config.classification_timeout;
        match tokio::time::timeout(timeout, task).await {
            Ok(joined) => Ok(joined??),
            Err(_) => Err(ClassificationError::Timeout(timeout).into()),
        }
    }

    fn fail(&self, run_id: u64, error: PipelineError) -> RunOutcome {
        warn!(run_id, error = %error, "Pipeline run failed");
        let status = failure_status(&error);
        let shown = self.publish(run_id, |display| {
            display.state = PipelineState::Failed;
            display.status = Some(status);
        });
        if shown {
            RunOutcome::Failed(error)
        } else {
            RunOutcome::Superseded
        }
    }

    /// Apply `update` only while `run_id` is still the latest run
    fn publish(&self, run_id: u64, update: impl FnOnce(&mut DisplayState)) -> bool {
        let mut applied = false;
        self.display.send_if_modified(|display| {
            if self.latest_run.load(Ordering::SeqCst) != run_id {
                return false;
            }
            let previous = display.status.clone();
            update(display);
            if display.status != previous {
                if let Some(line) = &display.status {
                    // No listeners is fine
                    let _ = self.status_lines.send(line.clone());
                }
            }
            applied = true;
            true
        });
        applied
    }
}
