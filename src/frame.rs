//! Frame types and the shared "latest frame" slot.
//!
//! - `RawFrame`: captured RGB pixels, owned by the detection loop.
//! - `EncodedFrame`: immutable encoded bytes plus the version they were published at.
//! - `SharedFrameBuffer`: the single object shared between the producer and every
//!   streaming client. Holds at most one current frame; publishing supersedes it.
//!
//! Slow readers are coalesced ("latest wins"): a client that was busy while several
//! frames were published only ever sees the newest one.

use anyhow::{anyhow, Result};
use image::RgbImage;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

// ----------------------------------------------------------------------------
// RawFrame: captured pixels
// ----------------------------------------------------------------------------

/// A captured frame in packed RGB24.
pub struct RawFrame {
    pixels: RgbImage,
    captured_at: Instant,
}

impl RawFrame {
    /// Wrap packed RGB24 bytes. Fails when the length does not match `width * height * 3`.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        let pixels = RgbImage::from_raw(width, height, data)
            .ok_or_else(|| anyhow!("invalid {}x{} RGB buffer", width, height))?;
        Ok(Self::from_image(pixels))
    }

    pub fn from_image(pixels: RgbImage) -> Self {
        Self {
            pixels,
            captured_at: Instant::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Packed RGB24 bytes, row-major.
    pub fn as_rgb(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    pub fn image(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn image_mut(&mut self) -> &mut RgbImage {
        &mut self.pixels
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Flip left-right in place (natural self-view).
    pub fn mirror_horizontal(&mut self) {
        image::imageops::flip_horizontal_in_place(&mut self.pixels);
    }
}

// ----------------------------------------------------------------------------
// EncodedFrame: published, immutable
// ----------------------------------------------------------------------------

/// Encoded frame as published to streaming clients.
///
/// Cloning shares the underlying bytes; a reader holding an old frame keeps it
/// alive after a newer one has been published.
#[derive(Clone, Debug)]
pub struct EncodedFrame {
    bytes: Arc<[u8]>,
    version: u64,
}

impl EncodedFrame {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version
    }
}

// ----------------------------------------------------------------------------
// SharedFrameBuffer
// ----------------------------------------------------------------------------

/// Outcome of a bounded wait on the buffer.
#[derive(Debug)]
pub enum WaitOutcome {
    /// A frame newer than the caller's last seen version.
    Frame(EncodedFrame),
    /// Nothing newer arrived before the timeout.
    TimedOut,
    /// The buffer was closed; no further frames will be delivered.
    Closed,
}

#[derive(Default)]
struct Slot {
    current: Option<EncodedFrame>,
    version: u64,
    closed: bool,
}

/// Single-slot, versioned frame buffer with broadcast wake-up.
///
/// `(current, version)` live under one mutex so readers never see a version
/// without its bytes. Version 0 means nothing has been published yet.
#[derive(Default)]
pub struct SharedFrameBuffer {
    slot: Mutex<Slot>,
    updated: Condvar,
}

impl SharedFrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    // Slot fields are only ever assigned together under the lock, so a poisoned
    // guard still holds a consistent pair.
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `bytes` as the current frame and wake every waiter.
    ///
    /// Returns the new version. Holds the lock only for the swap; never waits on readers.
    pub fn publish(&self, bytes: impl Into<Arc<[u8]>>) -> u64 {
        let bytes = bytes.into();
        let version = {
            let mut slot = self.lock();
            slot.version += 1;
            let version = slot.version;
            slot.current = Some(EncodedFrame { bytes, version });
            version
        };
        self.updated.notify_all();
        version
    }

    /// Block until a frame newer than `last_seen` is available.
    ///
    /// Returns `None` once the buffer is closed. A frame already newer than
    /// `last_seen` is returned immediately.
    pub fn wait_for_next(&self, last_seen: u64) -> Option<EncodedFrame> {
        let slot = self.lock();
        let slot = self
            .updated
            .wait_while(slot, |slot| !slot.closed && slot.version <= last_seen)
            .unwrap_or_else(PoisonError::into_inner);
        if slot.closed {
            return None;
        }
        slot.current.clone()
    }

    /// Like `wait_for_next`, but gives up after `timeout`.
    pub fn wait_for_next_timeout(&self, last_seen: u64, timeout: Duration) -> WaitOutcome {
        let slot = self.lock();
        let (slot, _) = self
            .updated
            .wait_timeout_while(slot, timeout, |slot| {
                !slot.closed && slot.version <= last_seen
            })
            .unwrap_or_else(PoisonError::into_inner);
        if slot.closed {
            return WaitOutcome::Closed;
        }
        match &slot.current {
            Some(frame) if frame.version > last_seen => WaitOutcome::Frame(frame.clone()),
            _ => WaitOutcome::TimedOut,
        }
    }

    /// Current frame without waiting.
    pub fn latest(&self) -> Option<EncodedFrame> {
        self.lock().current.clone()
    }

    pub fn version(&self) -> u64 {
        self.lock().version
    }

    /// Wake all waiters with a terminal "closed" outcome.
    pub fn close(&self) {
        self.lock().closed = true;
        self.updated.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;

    #[test]
    fn raw_frame_rejects_length_mismatch() {
        assert!(RawFrame::from_rgb(vec![0u8; 11], 2, 2).is_err());
        let frame = RawFrame::from_rgb(vec![0u8; 12], 2, 2).unwrap();
        assert_eq!(frame.width(), 2);
        assert_eq!(frame.height(), 2);
    }

    #[test]
    fn mirror_swaps_columns() {
        let mut frame = RawFrame::from_rgb(vec![1, 1, 1, 2, 2, 2], 2, 1).unwrap();
        frame.mirror_horizontal();
        assert_eq!(frame.as_rgb(), &[2, 2, 2, 1, 1, 1]);
    }

    #[test]
    fn versions_increase_with_each_publish() {
        let buffer = SharedFrameBuffer::new();
        assert_eq!(buffer.version(), 0);
        assert!(buffer.latest().is_none());

        assert_eq!(buffer.publish(vec![1u8]), 1);
        assert_eq!(buffer.publish(vec![2u8]), 2);
        let latest = buffer.latest().unwrap();
        assert_eq!(latest.version(), 2);
        assert_eq!(latest.bytes(), &[2]);
    }

    #[test]
    fn slow_reader_sees_only_the_latest_frame() {
        let buffer = SharedFrameBuffer::new();
        buffer.publish(vec![1u8]);
        buffer.publish(vec![2u8]);
        buffer.publish(vec![3u8]);

        let frame = buffer.wait_for_next(0).unwrap();
        assert_eq!(frame.version(), 3);
        assert_eq!(frame.bytes(), &[3]);
    }

    #[test]
    fn never_returns_a_frame_at_or_below_last_seen() {
        let buffer = SharedFrameBuffer::new();
        buffer.publish(vec![1u8]);
        match buffer.wait_for_next_timeout(1, Duration::from_millis(20)) {
            WaitOutcome::TimedOut => {}
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn waiter_blocked_before_publish_is_woken() {
        let buffer = Arc::new(SharedFrameBuffer::new());
        buffer.publish(vec![0u8]);

        let (ready_tx, ready_rx) = mpsc::channel();
        let waiter = {
            let buffer = buffer.clone();
            thread::spawn(move || {
                ready_tx.send(()).unwrap();
                buffer.wait_for_next(1)
            })
        };
        ready_rx.recv().unwrap();
        thread::sleep(Duration::from_millis(20));
        buffer.publish(vec![9u8]);

        let frame = waiter.join().unwrap().unwrap();
        assert_eq!(frame.version(), 2);
        assert_eq!(frame.bytes(), &[9]);
    }

    #[test]
    fn all_waiters_wake_on_one_publish() {
        let buffer = Arc::new(SharedFrameBuffer::new());
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let buffer = buffer.clone();
                thread::spawn(move || buffer.wait_for_next(0).map(|f| f.version()))
            })
            .collect();
        thread::sleep(Duration::from_millis(20));
        buffer.publish(vec![7u8]);

        for waiter in waiters {
            assert!(waiter.join().unwrap().unwrap() >= 1);
        }
    }

    #[test]
    fn consumer_versions_are_strictly_increasing() {
        let buffer = Arc::new(SharedFrameBuffer::new());
        let consumer = {
            let buffer = buffer.clone();
            thread::spawn(move || {
                let mut seen = Vec::new();
                let mut last = 0;
                while let Some(frame) = buffer.wait_for_next(last) {
                    seen.push(frame.version());
                    last = frame.version();
                    if last >= 200 {
                        break;
                    }
                }
                seen
            })
        };
        for i in 0..200u32 {
            buffer.publish(i.to_le_bytes().to_vec());
        }

        let seen = consumer.join().unwrap();
        assert!(!seen.is_empty());
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(*seen.last().unwrap(), 200);
    }

    #[test]
    fn close_releases_blocked_waiters() {
        let buffer = Arc::new(SharedFrameBuffer::new());
        let waiter = {
            let buffer = buffer.clone();
            thread::spawn(move || buffer.wait_for_next(0))
        };
        thread::sleep(Duration::from_millis(20));
        buffer.close();

        assert!(waiter.join().unwrap().is_none());
        assert!(buffer.is_closed());
        assert!(matches!(
            buffer.wait_for_next_timeout(0, Duration::from_millis(5)),
            WaitOutcome::Closed
        ));
    }
}
