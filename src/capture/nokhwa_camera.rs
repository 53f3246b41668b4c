use super::{CameraBackend, CameraConstraints, CaptureSource, Facing};
use anyhow::{Context, Result};
use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution,
};
use nokhwa::Camera;

pub struct WebcamCapture {
    camera: Camera,
    width: u32,
    height: u32,
}

impl WebcamCapture {
    pub fn open(index: CameraIndex, requested: RequestedFormat) -> Result<Self> {
        tracing::debug!("Opening webcam {:?}", index);

        let mut camera = Camera::new(index, requested)
            .context("Failed to open camera")?;

        camera.open_stream()
            .context("Failed to open camera stream")?;

        let resolution = camera.resolution();

        Ok(Self {
            camera,
            width: resolution.width(),
            height: resolution.height(),
        })
    }
}

impl CaptureSource for WebcamCapture {
    fn capture_frame(&mut self) -> Result<RgbImage> {
        let frame = self
            .camera
            .frame()
            .context("Failed to capture frame")?;

        let decoded = frame.decode_image::<RgbFormat>()
            .context("Failed to decode frame")?;

        Ok(decoded)
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn stop(&mut self) -> Result<()> {
        self.camera
            .stop_stream()
            .context("Failed to stop camera stream")
    }
}

/// Maps facing modes onto device indices; a desktop webcam stack has no
/// notion of "rear" so the user tells us which index is which.
pub struct NokhwaBackend {
    rear_index: u32,
    front_index: u32,
}

impl NokhwaBackend {
    pub fn new(rear_index: u32, front_index: u32) -> Self {
        Self {
            rear_index,
            front_index,
        }
    }

    fn resolve_index(&self, facing: Facing) -> Result<CameraIndex> {
        match facing {
            Facing::Rear => Ok(CameraIndex::Index(self.rear_index)),
            Facing::Front => Ok(CameraIndex::Index(self.front_index)),
            Facing::Any => {
                let cameras = nokhwa::query(ApiBackend::Auto)
                    .context("Failed to enumerate cameras")?;
                cameras
                    .first()
                    .map(|info| info.index().clone())
                    .context("No camera available")
            }
        }
    }
}

impl CameraBackend for NokhwaBackend {
    fn open(&mut self, constraints: &CameraConstraints) -> Result<Box<dyn CaptureSource>> {
        let index = self.resolve_index(constraints.facing)?;

        let format_type = match constraints.resolution {
            Some((width, height)) => RequestedFormatType::Closest(CameraFormat::new(
                Resolution::new(width, height),
                FrameFormat::MJPEG,
                30,
            )),
            None => RequestedFormatType::AbsoluteHighestResolution,
        };
        let requested = RequestedFormat::new::<RgbFormat>(format_type);

        let capture = WebcamCapture::open(index, requested)?;
        Ok(Box::new(capture))
    }
}
