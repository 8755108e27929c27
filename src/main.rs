use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

use digitscan::classification::{Classifier, RtenClassifier};
use digitscan::config::{ClassifierConfig, PipelineConfig, RectifierConfig};
use digitscan::detection::ContourRectangleDetector;
use digitscan::pipeline::{PipelineController, RunOutcome};
use digitscan::source::{AcquireMode, CommandCamera, DeviceImageSource, ImagePicker, PathPicker};

#[derive(Parser)]
#[command(name = "digitscan")]
#[command(about = "Find a card in a photo, straighten it and read the digit on it")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Classification model (.rten)
    #[arg(long, global = true, env = "DIGITSCAN_MODEL", value_name = "FILE")]
    model: Option<PathBuf>,

    /// Labels file, one per line (defaults to the digits 0-9)
    #[arg(long, global = true, env = "DIGITSCAN_LABELS", value_name = "FILE")]
    labels: Option<PathBuf>,

    /// Command that writes one still image to stdout, e.g. "libcamera-still -n -o -"
    #[arg(long, global = true, env = "DIGITSCAN_CAMERA_COMMAND", value_name = "CMD")]
    camera_command: Option<String>,

    /// Save the rectified image to this path
    #[arg(long, global = true, value_name = "PATH")]
    save_rectified: Option<PathBuf>,

    /// Contrast applied to the rectified image
    #[arg(long, global = true, default_value_t = 32.0)]
    contrast: f32,

    #[arg(long, global = true, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    detection_timeout_secs: u64,

    #[arg(long, global = true, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    classification_timeout_secs: u64,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Classify a stored image
    Pick {
        /// Image file; without it a file dialog opens (when built with `dialog`)
        #[arg(value_name = "IMAGE")]
        image: Option<PathBuf>,
    },
    /// Take a photo with the camera command and classify it
    Capture,
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "info" } else { "warn" }));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn build_config(args: &Cli) -> PipelineConfig {
    let mut classifier = ClassifierConfig::default();
    if let Some(model) = &args.model {
        classifier.model_path = model.clone();
    }
    classifier.labels_path = args.labels.clone();

    PipelineConfig::new()
        .with_rectifier(RectifierConfig {
            contrast: args.contrast,
        })
        .with_classifier(classifier)
        .with_detection_timeout(Duration::from_secs(args.detection_timeout_secs))
        .with_classification_timeout(Duration::from_secs(args.classification_timeout_secs))
}

fn choose_picker(image: Option<PathBuf>) -> Box<dyn ImagePicker> {
    if let Some(path) = image {
        return Box::new(PathPicker::new(Some(path)));
    }
    #[cfg(feature = "dialog")]
    {
        Box::new(digitscan::source::DialogPicker)
    }
    #[cfg(not(feature = "dialog"))]
    {
        Box::new(PathPicker::default())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Cli::parse();
    init_tracing(args.verbose);

    let config = build_config(&args);
    let (mode, picker) = match &args.command {
        Command::Pick { image } => (AcquireMode::Pick, choose_picker(image.clone())),
        Command::Capture => (
            AcquireMode::Capture,
            Box::new(PathPicker::default()) as Box<dyn ImagePicker>,
        ),
    };

    let mut source = DeviceImageSource::new(picker);
    if let Some(command_line) = &args.camera_command {
        let camera = CommandCamera::parse(command_line).context("Camera command is empty")?;
        source = source.with_camera(Box::new(camera));
    }

    let classifier =
        RtenClassifier::load(&config.classifier).map(|c| Arc::new(c) as Arc<dyn Classifier>);
    let detector = Arc::new(ContourRectangleDetector::new(config.detector.clone()));
    let controller = PipelineController::new(Box::new(source), detector, classifier, config);

    if let Some(message) = controller.classifier_status() {
        eprintln!("{}", message);
    }

    // Print each status line as the run publishes it
    let mut lines = controller.status_lines();
    let printer = tokio::spawn(async move {
        loop {
            match lines.recv().await {
                Ok(line) => println!("{}", line),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Status lines dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let report = controller.run(mode).await;

    if let Some(path) = &args.save_rectified {
        match controller.snapshot().rectified {
            Some(rectified) => {
                rectified
                    .image
                    .save(path)
                    .with_context(|| format!("Failed to save rectified image to {:?}", path))?;
                info!(path = %path.display(), "Saved rectified image");
            }
            None => info!("No rectified image to save"),
        }
    }

    // Dropping the controller closes the channel; the printer drains and stops
    drop(controller);
    printer.await?;

    let code = match report.outcome {
        RunOutcome::Cancelled => {
            eprintln!("No image selected.");
            ExitCode::SUCCESS
        }
        RunOutcome::Failed(_) => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    };
    Ok(code)
}
