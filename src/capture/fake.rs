use super::{CameraBackend, CameraConstraints, CaptureSource};
use anyhow::{bail, Result};
use image::{Rgb, RgbImage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Shared view into what a `FakeCamera` has been asked to do.
#[derive(Clone, Default)]
pub struct Probe {
    attempts: Arc<Mutex<Vec<CameraConstraints>>>,
    live: Arc<AtomicUsize>,
}

impl Probe {
    pub fn attempts(&self) -> Vec<CameraConstraints> {
        self.attempts.lock().unwrap().clone()
    }

    /// Streams opened and not yet stopped.
    pub fn live_streams(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

pub struct FakeCamera {
    failures_left: usize,
    frame_size: (u32, u32),
    probe: Probe,
}

impl FakeCamera {
    pub fn working() -> Self {
        Self::failing_first(0)
    }

    pub fn failing_first(failures: usize) -> Self {
        Self {
            failures_left: failures,
            frame_size: (64, 48),
            probe: Probe::default(),
        }
    }

    pub fn with_frame_size(width: u32, height: u32) -> Self {
        Self {
            frame_size: (width, height),
            ..Self::working()
        }
    }

    pub fn probe(&self) -> Probe {
        self.probe.clone()
    }
}

impl CameraBackend for FakeCamera {
    fn open(&mut self, constraints: &CameraConstraints) -> Result<Box<dyn CaptureSource>> {
        let attempt = {
            let mut attempts = self.probe.attempts.lock().unwrap();
            attempts.push(*constraints);
            attempts.len()
        };

        if self.failures_left > 0 {
            self.failures_left -= 1;
            bail!("fake device busy (attempt {})", attempt);
        }

        self.probe.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeStream {
            size: self.frame_size,
            live: Arc::clone(&self.probe.live),
            running: true,
        }))
    }
}

struct FakeStream {
    size: (u32, u32),
    live: Arc<AtomicUsize>,
    running: bool,
}

impl CaptureSource for FakeStream {
    fn capture_frame(&mut self) -> Result<RgbImage> {
        if !self.running {
            bail!("stream stopped");
        }
        Ok(RgbImage::from_pixel(self.size.0, self.size.1, Rgb([40, 160, 90])))
    }

    fn resolution(&self) -> (u32, u32) {
        self.size
    }

    fn stop(&mut self) -> Result<()> {
        if self.running {
            self.running = false;
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

impl Drop for FakeStream {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
