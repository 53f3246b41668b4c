use std::fmt;
use std::path::Path;

use crate::asset::ImageAsset;
use crate::capture::{CameraBackend, MediaCapture};
use crate::error::DetectError;
use crate::prediction::{PredictionClient, PredictionResult};
use crate::upload::{self, UploadSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Upload,
    Camera,
}

/// Where the page is in a detection cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingInput,
    Submitting,
    Resolved,
    Failed,
}

impl Phase {
    fn describe(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::AwaitingInput => "waiting for an image",
            Phase::Submitting => "a detection is in progress",
            Phase::Resolved => "showing a result",
            Phase::Failed => "showing an error",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubmissionId(u64);

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A dispatched request; hand the asset to a prediction client and report
/// back through [`PageController::settle`].
#[derive(Debug, Clone)]
pub struct Submission {
    pub id: SubmissionId,
    pub asset: ImageAsset,
}

/// `is_loading` is true exactly while a submission is in flight, and
/// `result` and `error` are never both set.
#[derive(Debug, Clone, Default)]
pub struct UiState {
    pub active_input_mode: InputMode,
    pub asset: Option<ImageAsset>,
    pub result: Option<PredictionResult>,
    pub is_loading: bool,
    pub error: Option<DetectError>,
}

/// Owns UI state for one page and the camera session behind it.
pub struct PageController<B: CameraBackend> {
    state: UiState,
    phase: Phase,
    camera: MediaCapture<B>,
    next_id: u64,
    in_flight: Option<SubmissionId>,
}

impl<B: CameraBackend> PageController<B> {
    pub fn new(camera: MediaCapture<B>) -> Self {
        Self {
            state: UiState::default(),
            phase: Phase::Idle,
            camera,
            next_id: 1,
            in_flight: None,
        }
    }

    pub fn state(&self) -> &UiState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn camera_open(&self) -> bool {
        self.camera.is_open()
    }

    /// Start a fresh cycle with the given input mode.
    pub fn select_mode(&mut self, mode: InputMode) -> Result<(), DetectError> {
        self.ensure_not_submitting("switch input mode")?;

        if mode == InputMode::Upload {
            self.camera.close();
        }

        self.state = UiState {
            active_input_mode: mode,
            ..UiState::default()
        };
        self.phase = Phase::AwaitingInput;
        tracing::debug!("Input mode {:?}", mode);
        Ok(())
    }

    pub fn open_camera(&mut self) -> Result<(), DetectError> {
        self.ensure_not_submitting("open the camera")?;
        if self.state.active_input_mode != InputMode::Camera || self.phase != Phase::AwaitingInput {
            self.select_mode(InputMode::Camera)?;
        }

        self.camera.open().map_err(|e| self.fail(e))
    }

    /// Current frame of the open camera, without leaving the cycle.
    pub fn preview_camera(&mut self) -> Result<ImageAsset, DetectError> {
        self.camera.preview()
    }

    pub fn close_camera(&mut self) {
        self.camera.close();
    }

    /// Capture a frame, release the camera and submit the frame.
    pub fn capture_photo(&mut self) -> Result<Submission, DetectError> {
        self.ensure_not_submitting("capture a photo")?;

        let asset = self.camera.capture().map_err(|e| self.fail(e))?;
        self.camera.close();

        if self.phase != Phase::AwaitingInput {
            self.select_mode(InputMode::Camera)?;
        }
        self.submit_asset(asset)
    }

    /// Validate a picked or dropped file and submit it.
    pub fn upload(&mut self, path: &Path, source: UploadSource) -> Result<Submission, DetectError> {
        self.ensure_not_submitting("upload a file")?;
        if self.state.active_input_mode != InputMode::Upload || self.phase != Phase::AwaitingInput {
            self.select_mode(InputMode::Upload)?;
        }

        let asset = upload::accept(path, source).map_err(|e| self.fail(e))?;
        self.submit_asset(asset)
    }

    /// `AwaitingInput -> Submitting`.
    pub fn submit_asset(&mut self, asset: ImageAsset) -> Result<Submission, DetectError> {
        if self.phase != Phase::AwaitingInput {
            return Err(self.refuse("submit an image"));
        }

        let id = SubmissionId(self.next_id);
        self.next_id += 1;

        self.state.asset = Some(asset.clone());
        self.state.result = None;
        self.state.error = None;
        self.state.is_loading = true;
        self.phase = Phase::Submitting;
        self.in_flight = Some(id);

        tracing::info!("Submission {} started ({})", id, asset.file_name());
        Ok(Submission { id, asset })
    }

    /// Apply a prediction outcome. Outcomes for anything other than the
    /// current in-flight submission are dropped; returns whether it applied.
    pub fn settle(
        &mut self,
        id: SubmissionId,
        outcome: Result<PredictionResult, DetectError>,
    ) -> bool {
        if self.in_flight != Some(id) {
            tracing::debug!("Ignoring outcome of stale submission {}", id);
            return false;
        }
        self.in_flight = None;
        self.state.is_loading = false;

        match outcome {
            Ok(result) => {
                tracing::info!("Submission {} resolved as {}", id, result.label);
                self.state.result = Some(result);
                self.phase = Phase::Resolved;
            }
            Err(e) => {
                tracing::info!("Submission {} failed: {}", id, e);
                self.state.error = Some(e);
                self.phase = Phase::Failed;
            }
        }
        true
    }

    /// Run a submission to completion on the current thread.
    pub fn run_submission(&mut self, submission: Submission, client: &dyn PredictionClient) -> Phase {
        let outcome = client.predict(&submission.asset);
        self.settle(submission.id, outcome);
        self.phase
    }

    /// Drop everything, release the camera and forget any in-flight request.
    pub fn reset(&mut self) {
        self.camera.close();
        if let Some(id) = self.in_flight.take() {
            tracing::debug!("Abandoning submission {}", id);
        }
        self.state = UiState::default();
        self.phase = Phase::Idle;
        tracing::info!("Detection reset");
    }

    /// Terminal outcome of the current cycle, if it has one.
    pub fn outcome(&self) -> Option<Result<&PredictionResult, &DetectError>> {
        match (&self.state.result, &self.state.error) {
            (Some(result), _) => Some(Ok(result)),
            (None, Some(error)) => Some(Err(error)),
            (None, None) => None,
        }
    }

    fn ensure_not_submitting(&self, action: &'static str) -> Result<(), DetectError> {
        if self.phase == Phase::Submitting {
            return Err(self.refuse(action));
        }
        Ok(())
    }

    fn refuse(&self, action: &'static str) -> DetectError {
        DetectError::InvalidTransition {
            action,
            phase: self.phase.describe(),
        }
    }

    /// Record a failure that ended the cycle before any request was sent.
    fn fail(&mut self, error: DetectError) -> DetectError {
        if !error.is_validation() {
            tracing::warn!("Detection failed: {}", error);
        }
        self.state.result = None;
        self.state.is_loading = false;
        self.state.error = Some(error.clone());
        self.phase = Phase::Failed;
        error
    }
}
