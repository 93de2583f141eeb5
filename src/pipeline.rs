//! The detection loop: capture → (every Nth frame) detect → annotate → encode → publish.
//!
//! One dedicated worker thread owns every piece of state here. The only thing it
//! shares is the `SharedFrameBuffer` it publishes into. Each external call is
//! fail-soft: a failed capture or encode skips the cycle, a failed detection
//! keeps the previous result, a failed alert is logged.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::alert::AlertPlayer;
use crate::annotate::{FrameAnnotator, Overlay};
use crate::detect::{DetectionResult, DetectorBackend};
use crate::encode::FrameEncoder;
use crate::frame::SharedFrameBuffer;
use crate::ingest::FrameSource;

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
pub struct LoopSettings {
    /// Run detection on every Nth captured frame. Must be ≥ 1.
    pub detection_interval: u32,
    /// Sleep between cycles.
    pub frame_delay: Duration,
    /// How long the greeting overlay stays up after a person arrives.
    pub greeting_duration: Duration,
    /// Mirror frames left-right before detection and annotation.
    pub mirror: bool,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            detection_interval: 5,
            frame_delay: Duration::from_millis(50),
            greeting_duration: Duration::from_secs(3),
            mirror: true,
        }
    }
}

/// The collaborators the loop drives. All are injected so tests can fake them.
pub struct Collaborators {
    pub source: Box<dyn FrameSource>,
    pub detector: Box<dyn DetectorBackend>,
    pub annotator: Box<dyn FrameAnnotator>,
    pub encoder: Box<dyn FrameEncoder>,
    pub alert: Box<dyn AlertPlayer>,
}

/// Edge trigger over the per-detection "person present" decision.
#[derive(Clone, Copy, Debug, Default)]
pub struct PresenceEdge {
    present: bool,
}

impl PresenceEdge {
    /// Record the latest decision. Returns true only on absent → present.
    pub fn update(&mut self, present: bool) -> bool {
        let rising = present && !self.present;
        self.present = present;
        rising
    }

    pub fn is_present(&self) -> bool {
        self.present
    }
}

/// Frames-per-second over each detection window.
#[derive(Clone, Copy, Debug)]
pub struct FpsMeter {
    window_start: Instant,
    fps: f32,
}

impl FpsMeter {
    pub fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            fps: 0.0,
        }
    }

    /// Close the window that started at the previous tick; `frames` were processed in it.
    pub fn tick(&mut self, now: Instant, frames: u32) -> f32 {
        let elapsed = now
            .checked_duration_since(self.window_start)
            .map(|d| d.as_secs_f32())
            .unwrap_or(0.0);
        self.fps = if elapsed > 0.0 {
            frames as f32 / elapsed
        } else {
            0.0
        };
        self.window_start = now;
        self.fps
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }
}

/// Counters for health logging and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub frames_captured: u64,
    pub frames_published: u64,
    pub capture_misses: u64,
    pub capture_failures: u64,
    pub detections_run: u64,
    pub detect_failures: u64,
    pub encode_failures: u64,
    pub alerts: u64,
    pub alert_failures: u64,
}

/// What happened in a single cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The source had no frame for us.
    NoFrame,
    /// The source returned an error.
    CaptureFailed,
    /// Annotated but could not be encoded; nothing published.
    EncodeFailed,
    Published { version: u64, detected: bool },
}

pub struct DetectionLoop {
    settings: LoopSettings,
    parts: Collaborators,
    output: Arc<SharedFrameBuffer>,
    frame_counter: u64,
    cached: Option<DetectionResult>,
    presence: PresenceEdge,
    fps: FpsMeter,
    greeting_until: Option<Instant>,
    stats: LoopStats,
}

impl DetectionLoop {
    pub fn new(
        settings: LoopSettings,
        parts: Collaborators,
        output: Arc<SharedFrameBuffer>,
    ) -> Result<Self> {
        if settings.detection_interval == 0 {
            return Err(anyhow!("detection interval must be at least 1"));
        }
        Ok(Self {
            settings,
            parts,
            output,
            frame_counter: 0,
            cached: None,
            presence: PresenceEdge::default(),
            fps: FpsMeter::new(Instant::now()),
            greeting_until: None,
            stats: LoopStats::default(),
        })
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Most recent successful detection result, reused between detection cycles.
    pub fn cached_detection(&self) -> Option<&DetectionResult> {
        self.cached.as_ref()
    }

    pub fn person_present(&self) -> bool {
        self.presence.is_present()
    }

    /// True while the greeting window from the last arrival is open.
    pub fn greeting_active(&self) -> bool {
        self.greeting_until
            .is_some_and(|until| Instant::now() < until)
    }

    /// Run one capture → publish cycle. Never returns an error; every failure is
    /// contained here and reported through the outcome and the log.
    pub fn run_cycle(&mut self) -> CycleOutcome {
        let mut frame = match self.parts.source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                self.stats.capture_misses += 1;
                log::warn!("no frame captured");
                return CycleOutcome::NoFrame;
            }
            Err(err) => {
                self.stats.capture_failures += 1;
                log::warn!("frame capture failed: {:#}", err);
                return CycleOutcome::CaptureFailed;
            }
        };
        self.stats.frames_captured += 1;

        if self.settings.mirror {
            frame.mirror_horizontal();
        }

        self.frame_counter += 1;
        let detected = self.frame_counter % self.settings.detection_interval as u64 == 0;
        if detected {
            self.detect(frame.as_rgb(), frame.width(), frame.height());
        }

        let overlay = Overlay::now(self.fps.fps(), self.greeting_active());
        self.parts
            .annotator
            .annotate(&mut frame, self.cached.as_ref(), &overlay);

        let bytes = match self.parts.encoder.encode(&frame) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.stats.encode_failures += 1;
                log::warn!("frame encode failed, dropping frame: {:#}", err);
                return CycleOutcome::EncodeFailed;
            }
        };
        let version = self.output.publish(bytes);
        self.stats.frames_published += 1;
        log::trace!("published frame version {}", version);
        CycleOutcome::Published { version, detected }
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) {
        let now = Instant::now();
        let fps = self.fps.tick(now, self.settings.detection_interval);

        self.stats.detections_run += 1;
        match self.parts.detector.detect(pixels, width, height) {
            Ok(result) => {
                log::debug!(
                    "detection: {} objects, fps {:.1}",
                    result.detections.len(),
                    fps
                );
                self.cached = Some(result);
            }
            Err(err) => {
                self.stats.detect_failures += 1;
                log::warn!("detection failed, keeping previous result: {:#}", err);
            }
        }

        let present = self
            .cached
            .as_ref()
            .is_some_and(DetectionResult::contains_person);
        if self.presence.update(present) {
            log::info!("person detected");
            self.greeting_until = Some(now + self.settings.greeting_duration);
            self.stats.alerts += 1;
            if let Err(err) = self.parts.alert.play() {
                self.stats.alert_failures += 1;
                log::warn!("alert playback failed: {:#}", err);
            }
        }
    }

    /// Loop until `shutdown` is set. Sleeps `frame_delay` after every cycle.
    pub fn run(mut self, shutdown: Arc<AtomicBool>) {
        if let Err(err) = self.parts.source.connect() {
            log::warn!("frame source connect failed: {:#}", err);
        }
        if let Err(err) = self.parts.detector.warm_up() {
            log::warn!("detector {} warm-up failed: {:#}", self.parts.detector.name(), err);
        }
        log::info!(
            "detection loop running: detector={}, interval={}, frame delay={:?}",
            self.parts.detector.name(),
            self.settings.detection_interval,
            self.settings.frame_delay
        );

        let mut last_health_log = Instant::now();
        while !shutdown.load(Ordering::SeqCst) {
            self.run_cycle();

            if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
                let source = self.parts.source.stats();
                log::info!(
                    "health: source={} healthy={} captured={} published={} version={} \
                     detect_failures={} encode_failures={} alerts={}",
                    source.location,
                    self.parts.source.is_healthy(),
                    self.stats.frames_captured,
                    self.stats.frames_published,
                    self.output.version(),
                    self.stats.detect_failures,
                    self.stats.encode_failures,
                    self.stats.alerts
                );
                last_health_log = Instant::now();
            }

            std::thread::sleep(self.settings.frame_delay);
        }
        log::info!("detection loop stopped");
    }

    /// Start the loop on its own named thread.
    pub fn spawn(self) -> Result<DetectionHandle> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let join = std::thread::Builder::new()
            .name("detection".to_string())
            .spawn(move || self.run(shutdown_thread))?;
        Ok(DetectionHandle {
            shutdown,
            join: Some(join),
        })
    }
}

#[derive(Debug)]
pub struct DetectionHandle {
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl DetectionHandle {
    /// Ask the loop to stop after its current cycle and wait for it.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("detection thread panicked"))?;
        }
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
