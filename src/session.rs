use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use anyhow::Result;

use crate::asset::ImageAsset;
use crate::capture::CameraBackend;
use crate::controller::{PageController, Submission, SubmissionId};
use crate::error::DetectError;
use crate::prediction::{PredictionClient, PredictionResult};
use crate::presenter::{write_outcome, OutputFormat};
use crate::upload::{self, UploadSource};

const HELP: &str = "\
Commands:
  upload <path>   classify an image file (or just paste/drop a path)
  camera          open the camera
  preview         save the current camera frame and show where it is
  close           turn the camera off
  snap            capture a photo and classify it
  reset           clear the result and close the camera
  status          show where the page is
  help            show this list
  quit            leave";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Upload(PathBuf),
    Dropped(PathBuf),
    OpenCamera,
    Preview,
    CloseCamera,
    Snap,
    Reset,
    Status,
    Help,
    Quit,
}

/// `Ok(None)` for a blank line.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word.to_lowercase().as_str() {
        "upload" | "u" => match upload::parse_dropped_path(rest) {
            Some(path) => Command::Upload(path),
            None => return Err("usage: upload <path>".to_string()),
        },
        "camera" | "c" => Command::OpenCamera,
        "preview" | "p" => Command::Preview,
        "close" => Command::CloseCamera,
        "snap" | "s" => Command::Snap,
        "reset" | "r" => Command::Reset,
        "status" => Command::Status,
        "help" | "h" | "?" => Command::Help,
        "quit" | "q" | "exit" => Command::Quit,
        _ => match upload::parse_dropped_path(line) {
            Some(path) if path.exists() => Command::Dropped(path),
            _ => return Err(format!("unknown command '{}', try 'help'", word)),
        },
    };
    Ok(Some(command))
}

pub enum Event {
    Input(String),
    InputClosed,
    Settled {
        id: SubmissionId,
        outcome: Result<PredictionResult, DetectError>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Interactive page: one event loop fed by the stdin reader and by
/// prediction workers. Only this loop touches the controller.
pub struct Session<B: CameraBackend, W: Write> {
    controller: PageController<B>,
    client: Arc<dyn PredictionClient>,
    out: W,
    format: OutputFormat,
    /// Last preview still; its temp file lives as long as this does.
    preview: Option<ImageAsset>,
    sender: Sender<Event>,
    receiver: Receiver<Event>,
}

impl<B: CameraBackend, W: Write> Session<B, W> {
    pub fn new(
        controller: PageController<B>,
        client: Arc<dyn PredictionClient>,
        out: W,
        format: OutputFormat,
    ) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            controller,
            client,
            out,
            format,
            preview: None,
            sender,
            receiver,
        }
    }

    pub fn run(mut self) -> Result<()> {
        let input = self.sender.clone();
        std::thread::spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if input.send(Event::Input(line)).is_err() {
                    return;
                }
            }
            let _ = input.send(Event::InputClosed);
        });

        writeln!(self.out, "{}", HELP)?;
        self.prompt()?;

        while let Ok(event) = self.receiver.recv() {
            if self.handle(event)? == Flow::Quit {
                break;
            }
        }

        self.controller.reset();
        tracing::info!("Session closed");
        Ok(())
    }

    pub fn handle(&mut self, event: Event) -> Result<Flow> {
        match event {
            Event::Input(line) => match parse_command(&line) {
                Ok(Some(command)) => {
                    let flow = self.execute(command)?;
                    if flow == Flow::Continue {
                        self.prompt()?;
                    }
                    Ok(flow)
                }
                Ok(None) => {
                    self.prompt()?;
                    Ok(Flow::Continue)
                }
                Err(message) => {
                    writeln!(self.out, "{}", message)?;
                    self.prompt()?;
                    Ok(Flow::Continue)
                }
            },
            Event::InputClosed => Ok(Flow::Quit),
            Event::Settled { id, outcome } => {
                if self.controller.settle(id, outcome) {
                    self.show_outcome()?;
                    self.show_status()?;
                    self.prompt()?;
                }
                Ok(Flow::Continue)
            }
        }
    }

    fn execute(&mut self, command: Command) -> Result<Flow> {
        let submission = match command {
            Command::Upload(path) => self.controller.upload(&path, UploadSource::Picker),
            Command::Dropped(path) => self.controller.upload(&path, UploadSource::Drop),
            Command::Snap => self.controller.capture_photo(),
            Command::OpenCamera => {
                match self.controller.open_camera() {
                    Ok(()) => writeln!(self.out, "Camera is on. Type 'snap' to capture.")?,
                    Err(e) => self.report(e),
                }
                return self.transitioned();
            }
            Command::Preview => {
                self.show_preview()?;
                return Ok(Flow::Continue);
            }
            Command::CloseCamera => {
                self.controller.close_camera();
                writeln!(self.out, "Camera is off.")?;
                return self.transitioned();
            }
            Command::Reset => {
                self.controller.reset();
                writeln!(self.out, "Ready for a new image.")?;
                return self.transitioned();
            }
            Command::Status => {
                self.show_status()?;
                return Ok(Flow::Continue);
            }
            Command::Help => {
                writeln!(self.out, "{}", HELP)?;
                return Ok(Flow::Continue);
            }
            Command::Quit => return Ok(Flow::Quit),
        };

        match submission {
            Ok(submission) => {
                writeln!(self.out, "Detecting {}...", submission.asset.file_name())?;
                self.dispatch(submission);
            }
            Err(e) => self.report(e),
        }
        self.transitioned()
    }

    /// Follow-up for commands that may have moved the page.
    fn transitioned(&mut self) -> Result<Flow> {
        if !self.controller.camera_open() {
            self.preview = None;
        }
        self.show_status()?;
        Ok(Flow::Continue)
    }

    fn show_preview(&mut self) -> Result<()> {
        match self.controller.preview_camera() {
            Ok(still) => {
                match still.display_url() {
                    Some(url) => writeln!(self.out, "Preview: {}", url)?,
                    None => writeln!(self.out, "Preview could not be saved.")?,
                }
                self.preview = Some(still);
            }
            Err(e) => self.report(e),
        }
        Ok(())
    }

    /// Run the request off the event loop; the outcome comes back as an event.
    fn dispatch(&self, submission: Submission) {
        let client = Arc::clone(&self.client);
        let sender = self.sender.clone();
        std::thread::spawn(move || {
            let outcome = client.predict(&submission.asset);
            // The session may be gone by now; nobody is waiting then.
            let _ = sender.send(Event::Settled {
                id: submission.id,
                outcome,
            });
        });
    }

    /// Show an error the controller refused or recorded.
    fn report(&mut self, error: DetectError) {
        let recorded = self.controller.state().error.as_ref() == Some(&error);
        let shown = if recorded {
            self.show_outcome()
        } else {
            write_outcome(&mut self.out, Err(&error), self.format).map_err(anyhow::Error::from)
        };
        if let Err(e) = shown {
            tracing::warn!("Could not write output: {:#}", e);
        }
    }

    fn show_outcome(&mut self) -> Result<()> {
        if let Some(outcome) = self.controller.outcome() {
            write_outcome(&mut self.out, outcome, self.format)?;
        }
        Ok(())
    }

    fn show_status(&mut self) -> Result<()> {
        let state = self.controller.state();
        writeln!(
            self.out,
            "Status: {} (mode: {:?}, camera: {}{})",
            self.controller.phase(),
            state.active_input_mode,
            if self.controller.camera_open() { "on" } else { "off" },
            if state.is_loading { ", waiting for the service" } else { "" }
        )?;
        if let Some(asset) = &state.asset {
            match asset.display_url() {
                Some(url) => writeln!(self.out, "Image: {} ({})", asset.file_name(), url)?,
                None => writeln!(self.out, "Image: {}", asset.file_name())?,
            }
        }
        if let Some(url) = self.preview.as_ref().and_then(ImageAsset::display_url) {
            writeln!(self.out, "Preview: {}", url)?;
        }
        Ok(())
    }

    fn prompt(&mut self) -> Result<()> {
        write!(self.out, "> ")?;
        self.out.flush()?;
        Ok(())
    }

    #[cfg(test)]
    fn next_event(&self) -> Event {
        self.receiver
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("worker did not report back")
    }

    #[cfg(test)]
    fn output(&self) -> &W {
        &self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::fake::{FakeCamera, Probe};
    use crate::capture::MediaCapture;
    use crate::controller::Phase;
    use crate::prediction::types::parse_prediction;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedClient {
        calls: AtomicUsize,
        outcome: Result<PredictionResult, DetectError>,
    }

    impl PredictionClient for FixedClient {
        fn predict(&self, _asset: &ImageAsset) -> Result<PredictionResult, DetectError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    fn plastic() -> PredictionResult {
        parse_prediction(
            r#"{"prediction":"plastik","confidence":92,"recommendation":{"deskripsi":"Sampah plastik","cara_penanganan":["Bersihkan","Pisahkan"],"catatan":"Hindari plastik sekali pakai"}}"#,
        )
        .unwrap()
    }

    fn session(
        outcome: Result<PredictionResult, DetectError>,
    ) -> (Session<FakeCamera, Vec<u8>>, Arc<FixedClient>, Probe) {
        let camera = FakeCamera::working();
        let probe = camera.probe();
        let client = Arc::new(FixedClient {
            calls: AtomicUsize::new(0),
            outcome,
        });
        let controller = PageController::new(MediaCapture::new(camera, (1280, 720), 80));
        let session = Session::new(controller, client.clone(), Vec::new(), OutputFormat::Text);
        (session, client, probe)
    }

    fn text(session: &Session<FakeCamera, Vec<u8>>) -> String {
        String::from_utf8_lossy(session.output()).into_owned()
    }

    fn input(line: &str) -> Event {
        Event::Input(line.to_string())
    }

    #[test]
    fn parses_commands() {
        assert_eq!(parse_command("  "), Ok(None));
        assert_eq!(parse_command("snap"), Ok(Some(Command::Snap)));
        assert_eq!(parse_command("C"), Ok(Some(Command::OpenCamera)));
        assert_eq!(parse_command("preview"), Ok(Some(Command::Preview)));
        assert_eq!(
            parse_command("upload '/tmp/a b.jpg'"),
            Ok(Some(Command::Upload(PathBuf::from("/tmp/a b.jpg"))))
        );
        assert!(parse_command("upload").is_err());
        assert!(parse_command("dance").is_err());
    }

    #[test]
    fn existing_path_is_treated_as_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kardus.png");
        std::fs::write(&path, b"png").unwrap();

        let quoted = format!("'{}'", path.display());
        assert_eq!(parse_command(&quoted), Ok(Some(Command::Dropped(path))));
    }

    #[test]
    fn camera_snap_round_trip_renders_result() {
        let (mut session, client, probe) = session(Ok(plastic()));

        session.handle(input("camera")).unwrap();
        assert_eq!(probe.live_streams(), 1);

        session.handle(input("snap")).unwrap();
        assert_eq!(probe.live_streams(), 0);
        assert_eq!(session.controller.phase(), Phase::Submitting);

        let settled = session.next_event();
        session.handle(settled).unwrap();

        assert_eq!(session.controller.phase(), Phase::Resolved);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        let out = text(&session);
        assert!(out.contains("Label:      plastik"));
        assert!(out.contains("Confidence: 92%"));
    }

    #[test]
    fn second_snap_while_submitting_is_refused() {
        let (mut session, client, _) = session(Ok(plastic()));

        session.handle(input("camera")).unwrap();
        session.handle(input("snap")).unwrap();
        session.handle(input("snap")).unwrap();

        let settled = session.next_event();
        session.handle(settled).unwrap();

        assert!(text(&session).contains("cannot capture a photo while a detection is in progress"));
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn outcome_after_reset_is_not_shown() {
        let (mut session, _, _) = session(Ok(plastic()));

        session.handle(input("camera")).unwrap();
        session.handle(input("snap")).unwrap();
        session.handle(input("reset")).unwrap();

        let settled = session.next_event();
        session.handle(settled).unwrap();

        assert_eq!(session.controller.phase(), Phase::Idle);
        assert!(!text(&session).contains("plastik"));
    }

    #[test]
    fn rejected_upload_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello").unwrap();
        let (mut session, client, _) = session(Ok(plastic()));

        session
            .handle(input(&format!("upload {}", path.display())))
            .unwrap();

        assert!(text(&session).contains("please select a valid image file"));
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
        assert_eq!(session.controller.phase(), Phase::Failed);
    }

    #[test]
    fn status_and_close_camera() {
        let (mut session, _, probe) = session(Ok(plastic()));

        session.handle(input("camera")).unwrap();
        session.handle(input("status")).unwrap();
        session.handle(input("close")).unwrap();

        assert_eq!(probe.live_streams(), 0);
        let out = text(&session);
        assert!(out.contains("Status: waiting for an image (mode: Camera, camera: on)"));
        assert!(out.contains("Camera is off."));
    }

    #[test]
    fn status_follows_each_transition() {
        let (mut session, _, _) = session(Ok(plastic()));

        session.handle(input("camera")).unwrap();
        assert!(text(&session).contains("Status: waiting for an image (mode: Camera, camera: on)"));

        session.handle(input("snap")).unwrap();
        assert!(text(&session).contains("Status: a detection is in progress (mode: Camera, camera: off, waiting for the service)"));

        let settled = session.next_event();
        session.handle(settled).unwrap();
        assert!(text(&session).contains("Status: showing a result"));

        session.handle(input("reset")).unwrap();
        assert!(text(&session).ends_with("Status: idle (mode: Upload, camera: off)\n> "));
    }

    #[test]
    fn preview_shows_frame_until_camera_closes() {
        let (mut session, client, probe) = session(Ok(plastic()));

        session.handle(input("camera")).unwrap();
        session.handle(input("preview")).unwrap();

        assert!(text(&session).contains("Preview: file://"));
        assert_eq!(probe.live_streams(), 1);
        assert_eq!(session.controller.phase(), Phase::AwaitingInput);
        let still = session.preview.as_ref().unwrap().display_url().unwrap();
        let path = still.to_file_path().unwrap();
        assert!(path.exists());

        session.handle(input("close")).unwrap();

        assert!(session.preview.is_none());
        assert!(!path.exists());
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn preview_without_camera_is_reported() {
        let (mut session, _, _) = session(Ok(plastic()));

        session.handle(input("preview")).unwrap();

        assert!(text(&session).contains("no active camera stream"));
        assert!(session.preview.is_none());
    }

    #[test]
    fn quit_and_closed_input_end_the_loop() {
        let (mut session, _, _) = session(Ok(plastic()));
        assert_eq!(session.handle(input("quit")).unwrap(), Flow::Quit);
        assert_eq!(session.handle(Event::InputClosed).unwrap(), Flow::Quit);
    }
}
