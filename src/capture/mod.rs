mod nokhwa_camera;
#[cfg(test)]
pub mod fake;

pub use nokhwa_camera::NokhwaBackend;

use crate::asset::ImageAsset;
use crate::error::DetectError;
use anyhow::Result;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::fmt;

/// Trait for camera capture sources
pub trait CaptureSource {
    /// Capture a single frame
    fn capture_frame(&mut self) -> Result<RgbImage>;

    /// Get the resolution of captured frames
    fn resolution(&self) -> (u32, u32);

    /// Stop streaming and release the device
    fn stop(&mut self) -> Result<()>;
}

/// Which physical camera a request is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    Rear,
    Front,
    Any,
}

/// One attempt at acquiring a camera stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraConstraints {
    pub facing: Facing,
    /// Preferred resolution; `None` takes whatever the device offers.
    pub resolution: Option<(u32, u32)>,
}

impl CameraConstraints {
    /// Acquisition order: rear at the preferred resolution, rear at any
    /// resolution, front camera, then any camera at all.
    pub fn fallback_ladder(width: u32, height: u32) -> Vec<CameraConstraints> {
        vec![
            CameraConstraints {
                facing: Facing::Rear,
                resolution: Some((width, height)),
            },
            CameraConstraints {
                facing: Facing::Rear,
                resolution: None,
            },
            CameraConstraints {
                facing: Facing::Front,
                resolution: None,
            },
            CameraConstraints {
                facing: Facing::Any,
                resolution: None,
            },
        ]
    }
}

impl fmt::Display for CameraConstraints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.resolution {
            Some((w, h)) => write!(f, "{:?} camera at {}x{}", self.facing, w, h),
            None => write!(f, "{:?} camera", self.facing),
        }
    }
}

/// Opens capture sources for a given set of constraints
pub trait CameraBackend {
    fn open(&mut self, constraints: &CameraConstraints) -> Result<Box<dyn CaptureSource>>;
}

/// Camera session owner: acquires a stream with fallbacks, turns frames into
/// JPEG assets and guarantees the device is released.
pub struct MediaCapture<B: CameraBackend> {
    backend: B,
    ladder: Vec<CameraConstraints>,
    jpeg_quality: u8,
    stream: Option<Box<dyn CaptureSource>>,
}

impl<B: CameraBackend> MediaCapture<B> {
    pub fn new(backend: B, preferred: (u32, u32), jpeg_quality: u8) -> Self {
        Self {
            backend,
            ladder: CameraConstraints::fallback_ladder(preferred.0, preferred.1),
            jpeg_quality: jpeg_quality.clamp(1, 100),
            stream: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    pub fn open(&mut self) -> Result<(), DetectError> {
        if self.is_open() {
            tracing::debug!("Camera already open, keeping current stream");
            return Ok(());
        }

        let mut last_error = None;
        for constraints in &self.ladder {
            tracing::debug!("Requesting {}", constraints);
            match self.backend.open(constraints) {
                Ok(stream) => {
                    let (w, h) = stream.resolution();
                    tracing::info!("Camera stream open ({}, {}x{})", constraints, w, h);
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("{} unavailable: {:#}", constraints, e);
                    last_error = Some(e);
                }
            }
        }

        let reason = last_error
            .map(|e| format!("{:#}", e))
            .unwrap_or_else(|| "no camera available".to_string());
        Err(DetectError::CameraUnavailable(reason))
    }

    /// Grab the current frame as a JPEG asset.
    pub fn capture(&mut self) -> Result<ImageAsset, DetectError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| DetectError::CaptureFailed("no active camera stream".to_string()))?;

        let frame = stream
            .capture_frame()
            .map_err(|e| DetectError::CaptureFailed(format!("{:#}", e)))?;

        if frame.width() == 0 || frame.height() == 0 {
            return Err(DetectError::CaptureFailed("camera returned an empty frame".to_string()));
        }

        let jpeg = encode_jpeg(&frame, self.jpeg_quality)
            .map_err(|e| DetectError::CaptureFailed(format!("{:#}", e)))?;

        tracing::debug!("Captured {}x{} frame ({} bytes)", frame.width(), frame.height(), jpeg.len());
        Ok(ImageAsset::from_capture(jpeg))
    }

    /// Still of the live stream for framing a shot. The stream stays open.
    pub fn preview(&mut self) -> Result<ImageAsset, DetectError> {
        let frame = self.capture()?;
        tracing::debug!("Preview written ({} bytes)", frame.len());
        Ok(frame)
    }

    /// Stop all tracks. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            match stream.stop() {
                Ok(()) => tracing::info!("Camera stream closed"),
                Err(e) => tracing::warn!("Camera did not stop cleanly: {:#}", e),
            }
        }
    }
}

impl<B: CameraBackend> Drop for MediaCapture<B> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Encode an RGB frame as baseline JPEG
pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let _span = tracing::debug_span!("encode_jpeg").entered();

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality).encode_image(frame)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::fake::FakeCamera;
    use super::*;

    #[test]
    fn first_working_constraint_wins() {
        let camera = FakeCamera::failing_first(2);
        let probe = camera.probe();
        let mut capture = MediaCapture::new(camera, (1280, 720), 80);

        capture.open().unwrap();

        assert!(capture.is_open());
        assert_eq!(
            probe.attempts(),
            CameraConstraints::fallback_ladder(1280, 720)[..3].to_vec()
        );
        assert_eq!(probe.live_streams(), 1);
    }

    #[test]
    fn all_attempts_failing_reports_last_device_error() {
        let camera = FakeCamera::failing_first(usize::MAX);
        let probe = camera.probe();
        let mut capture = MediaCapture::new(camera, (1280, 720), 80);

        let err = capture.open().unwrap_err();

        match err {
            DetectError::CameraUnavailable(reason) => assert!(reason.contains("attempt 4")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(probe.attempts().len(), 4);
        assert!(!capture.is_open());
    }

    #[test]
    fn capture_without_stream_fails_cleanly() {
        let mut capture = MediaCapture::new(FakeCamera::working(), (1280, 720), 80);

        let err = capture.capture().unwrap_err();
        assert!(matches!(err, DetectError::CaptureFailed(_)));
    }

    #[test]
    fn capture_produces_jpeg_asset() {
        let mut capture = MediaCapture::new(FakeCamera::working(), (1280, 720), 80);
        capture.open().unwrap();

        let asset = capture.capture().unwrap();

        assert_eq!(asset.media_type(), "image/jpeg");
        assert_eq!(&asset.bytes()[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(asset.bytes()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }

    #[test]
    fn preview_keeps_stream_open() {
        let camera = FakeCamera::working();
        let probe = camera.probe();
        let mut capture = MediaCapture::new(camera, (1280, 720), 80);
        capture.open().unwrap();

        let still = capture.preview().unwrap();

        assert!(capture.is_open());
        assert_eq!(probe.live_streams(), 1);
        let path = still.display_url().unwrap().to_file_path().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn empty_frame_is_a_capture_failure() {
        let mut capture = MediaCapture::new(FakeCamera::with_frame_size(0, 0), (1280, 720), 80);
        capture.open().unwrap();

        assert!(matches!(capture.capture(), Err(DetectError::CaptureFailed(_))));
    }

    #[test]
    fn close_is_idempotent_and_releases_device() {
        let camera = FakeCamera::working();
        let probe = camera.probe();
        let mut capture = MediaCapture::new(camera, (1280, 720), 80);

        capture.open().unwrap();
        capture.close();
        capture.close();

        assert!(!capture.is_open());
        assert_eq!(probe.live_streams(), 0);
    }

    #[test]
    fn dropping_the_adapter_releases_device() {
        let camera = FakeCamera::working();
        let probe = camera.probe();
        {
            let mut capture = MediaCapture::new(camera, (1280, 720), 80);
            capture.open().unwrap();
            assert_eq!(probe.live_streams(), 1);
        }
        assert_eq!(probe.live_streams(), 0);
    }

    #[test]
    fn reopening_keeps_a_single_stream() {
        let camera = FakeCamera::working();
        let probe = camera.probe();
        let mut capture = MediaCapture::new(camera, (1280, 720), 80);

        capture.open().unwrap();
        capture.open().unwrap();

        assert_eq!(probe.live_streams(), 1);
        assert_eq!(probe.attempts().len(), 1);
    }
}
