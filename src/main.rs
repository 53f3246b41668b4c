mod asset;
mod capture;
mod controller;
mod error;
mod prediction;
mod presenter;
mod session;
mod upload;

use anyhow::{Context, Result};
use capture::{CameraBackend, MediaCapture, NokhwaBackend};
use clap::{Parser, Subcommand};
use controller::{PageController, Phase, Submission};
use error::DetectError;
use prediction::{HttpPredictionClient, PredictionClient, DEFAULT_BASE_URL};
use presenter::OutputFormat;
use session::Session;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use upload::UploadSource;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base URL of the prediction service
    #[arg(long, env = "SAMPAH_API_URL", default_value = DEFAULT_BASE_URL, global = true)]
    api_url: String,

    /// Print the prediction as JSON instead of the formatted view
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(flatten)]
    camera: CameraArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct CameraArgs {
    /// Device index of the rear (world-facing) camera
    #[arg(long, default_value_t = 0, global = true)]
    camera_index: u32,

    /// Device index of the front (user-facing) camera
    #[arg(long, default_value_t = 1, global = true)]
    front_camera_index: u32,

    /// Preferred capture resolution width
    #[arg(long, default_value_t = 1280, global = true)]
    capture_width: u32,

    /// Preferred capture resolution height
    #[arg(long, default_value_t = 720, global = true)]
    capture_height: u32,

    /// JPEG quality for captured photos (1-100)
    #[arg(long, default_value_t = 80, global = true)]
    jpeg_quality: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify one image file
    Detect {
        /// Image to upload (JPG, PNG, WebP; max 10MB)
        path: PathBuf,
    },
    /// Take one photo with the camera and classify it
    Snap,
    /// Interactive session: upload, camera, reset
    Session,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("sampah-detect starting");

    let http_client = HttpPredictionClient::new(&args.api_url)
        .context("Failed to initialize prediction client")?;
    tracing::info!("Prediction endpoint: {}", http_client.endpoint());
    let client: Arc<dyn PredictionClient> = Arc::new(http_client);

    let camera = MediaCapture::new(
        NokhwaBackend::new(args.camera.camera_index, args.camera.front_camera_index),
        (args.camera.capture_width, args.camera.capture_height),
        args.camera.jpeg_quality,
    );
    let mut controller = PageController::new(camera);

    let format = if args.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    match args.command {
        Command::Detect { path } => detect_once(&mut controller, client.as_ref(), format, |page| {
            page.upload(&path, UploadSource::Picker)
        }),
        Command::Snap => detect_once(&mut controller, client.as_ref(), format, |page| {
            page.open_camera()?;
            page.capture_photo()
        }),
        Command::Session => {
            Session::new(controller, client, std::io::stdout(), format).run()?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// One detection cycle, printed to stdout. Exit status reflects the outcome.
fn detect_once<B, F>(
    controller: &mut PageController<B>,
    client: &dyn PredictionClient,
    format: OutputFormat,
    start: F,
) -> Result<ExitCode>
where
    B: CameraBackend,
    F: FnOnce(&mut PageController<B>) -> Result<Submission, DetectError>,
{
    let refused = match start(controller) {
        Ok(submission) => {
            controller.run_submission(submission, client);
            None
        }
        Err(e) => Some(e),
    };

    let mut stdout = std::io::stdout().lock();
    match (controller.outcome(), &refused) {
        (Some(outcome), _) => presenter::write_outcome(&mut stdout, outcome, format)?,
        (None, Some(error)) => presenter::write_outcome(&mut stdout, Err(error), format)?,
        (None, None) => {}
    }
    stdout.flush()?;

    let resolved = controller.phase() == Phase::Resolved;
    controller.reset();

    Ok(if resolved {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
