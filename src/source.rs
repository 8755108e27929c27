//! Image acquisition: camera capture and stored-image selection.
//!
//! Every acquired image has its EXIF orientation applied before it leaves
//! this module, so later stages only ever see upright pixel coordinates.

use image::{DynamicImage, ImageDecoder, ImageReader};
use std::io::{BufRead, Cursor, Seek};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info};

use crate::error::AcquisitionError;
use crate::models::{Image, Orientation};

/// The two user actions that start a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireMode {
    Capture,
    Pick,
}

/// Produces the image a pipeline run works on
pub trait ImageSource: Send + Sync {
    fn acquire(&self, mode: AcquireMode) -> Result<Image, AcquisitionError>;
}

/// A live camera
pub trait CaptureDevice: Send + Sync {
    fn capture(&self) -> Result<Image, AcquisitionError>;
}

/// A stored-image chooser. `None` means the user backed out.
pub trait ImagePicker: Send + Sync {
    fn pick(&self) -> Option<PathBuf>;
}

/// Decode an encoded image held in memory, honoring its orientation tag
pub fn decode_image(bytes: &[u8]) -> Result<Image, AcquisitionError> {
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    decode_oriented(reader)
}

/// Load an image file, honoring its orientation tag
pub fn load_image(path: impl AsRef<Path>) -> Result<Image, AcquisitionError> {
    let reader = ImageReader::open(path.as_ref())?.with_guessed_format()?;
    let image = decode_oriented(reader)?;
    debug!(
        path = %path.as_ref().display(),
        width = image.width(),
        height = image.height(),
        "Loaded image"
    );
    Ok(image)
}

fn decode_oriented<R: BufRead + Seek>(reader: ImageReader<R>) -> Result<Image, AcquisitionError> {
    let mut decoder = reader.into_decoder()?;
    // Missing or unreadable metadata means "up"
    let orientation = decoder
        .orientation()
        .map(Orientation::from)
        .unwrap_or_default();
    let pixels = DynamicImage::from_decoder(decoder)?;
    Ok(Image::from_oriented(pixels, orientation))
}

/// Image source built from an optional capture device and a picker
pub struct DeviceImageSource {
    camera: Option<Box<dyn CaptureDevice>>,
    picker: Box<dyn ImagePicker>,
}

impl DeviceImageSource {
    pub fn new(picker: Box<dyn ImagePicker>) -> Self {
        Self {
            camera: None,
            picker,
        }
    }

    pub fn with_camera(mut self, camera: Box<dyn CaptureDevice>) -> Self {
        self.camera = Some(camera);
        self
    }
}

impl ImageSource for DeviceImageSource {
    fn acquire(&self, mode: AcquireMode) -> Result<Image, AcquisitionError> {
        match mode {
            AcquireMode::Capture => {
                let camera = self.camera.as_ref().ok_or_else(|| {
                    AcquisitionError::DeviceUnavailable {
                        reason: "no camera configured".to_string(),
                    }
                })?;
                camera.capture()
            }
            AcquireMode::Pick => {
                let path = self.picker.pick().ok_or(AcquisitionError::UserCancelled)?;
                info!(path = %path.display(), "Image selected");
                load_image(path)
            }
        }
    }
}

/// Runs an external still-capture command and decodes the image it writes to stdout,
/// e.g. `libcamera-still -n -o -` or `fswebcam -q -`.
#[derive(Debug, Clone)]
pub struct CommandCamera {
    program: String,
    args: Vec<String>,
}

impl CommandCamera {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Split a whitespace-separated command line; `None` when it is blank
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }
}

impl CaptureDevice for CommandCamera {
    fn capture(&self) -> Result<Image, AcquisitionError> {
        debug!(program = %self.program, args = ?self.args, "Capturing frame");
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| AcquisitionError::DeviceUnavailable {
                reason: format!("{}: {}", self.program, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AcquisitionError::DeviceUnavailable {
                reason: format!("{} exited with {}: {}", self.program, output.status, stderr.trim()),
            });
        }
        if output.stdout.is_empty() {
            return Err(AcquisitionError::DeviceUnavailable {
                reason: format!("{} produced no image data", self.program),
            });
        }

        decode_image(&output.stdout)
    }
}

/// Picker that always answers with the same path, or cancels when there is none
#[derive(Debug, Clone, Default)]
pub struct PathPicker {
    path: Option<PathBuf>,
}

impl PathPicker {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

impl ImagePicker for PathPicker {
    fn pick(&self) -> Option<PathBuf> {
        self.path.clone()
    }
}

/// Native open-file dialog
#[cfg(feature = "dialog")]
#[derive(Debug, Clone, Default)]
pub struct DialogPicker;

#[cfg(feature = "dialog")]
impl ImagePicker for DialogPicker {
    fn pick(&self) -> Option<PathBuf> {
        rfd::FileDialog::new()
            .set_title("Choose Image")
            .add_filter("Images", &["png", "jpg", "jpeg", "bmp", "gif", "tiff", "webp"])
            .pick_file()
    }
}
