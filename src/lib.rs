//! Pi Sentinel
//!
//! A camera sentinel that watches for people and serves a live MJPEG view.
//!
//! # Architecture
//!
//! One detection loop produces frames; any number of HTTP viewers consume them:
//!
//! ```text
//! FrameSource -> DetectionLoop -> SharedFrameBuffer -> StreamServer -> viewers
//!                     |
//!                     +-> AlertPlayer (on a person's arrival)
//! ```
//!
//! The loop captures, mirrors, runs the detector every `detection_interval`
//! frames (reusing the last result in between), annotates, encodes to JPEG and
//! publishes. Viewers block on the buffer and always receive the newest frame.
//!
//! # Module Structure
//!
//! - `frame`: `RawFrame`, `EncodedFrame` and the `SharedFrameBuffer`
//! - `ingest`: frame sources (synthetic `stub://`, V4L2)
//! - `detect`: detector backends and detection results
//! - `annotate`, `encode`, `alert`: per-frame collaborators of the loop
//! - `pipeline`: the detection loop
//! - `server`: the HTTP live view
//! - `config`, `host`: daemon plumbing

pub mod alert;
pub mod annotate;
pub mod config;
pub mod detect;
pub mod encode;
pub mod frame;
pub mod host;
pub mod ingest;
pub mod pipeline;
pub mod server;

pub use alert::{AlertPlayer, CommandAlertPlayer, SilentAlertPlayer};
pub use annotate::{FrameAnnotator, Overlay, OverlayAnnotator};
pub use config::SentinelConfig;
pub use detect::{BoundingBox, Category, Detection, DetectionResult, DetectorBackend};
pub use encode::{FrameEncoder, JpegFrameEncoder};
pub use frame::{EncodedFrame, RawFrame, SharedFrameBuffer, WaitOutcome};
pub use ingest::{FrameSource, SourceSettings};
pub use pipeline::{Collaborators, CycleOutcome, DetectionHandle, DetectionLoop, LoopSettings};
pub use server::{ServerConfig, ServerHandle, StreamServer};
