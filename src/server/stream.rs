//! Per-connection multipart MJPEG writer.

use anyhow::Result;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::frame::{EncodedFrame, SharedFrameBuffer, WaitOutcome};

/// Multipart boundary token. Clients see it in the Content-Type header.
pub const BOUNDARY: &str = "FRAME";

/// Why a stream ended without a write error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamEnd {
    ServerShutdown,
    SourceClosed,
}

pub(crate) fn write_stream_head<S: Write>(stream: &mut S) -> Result<()> {
    let header = format!(
        "{status_line}\r\nAge: 0\r\nCache-Control: no-cache, private\r\nPragma: no-cache\r\n\
         Content-Type: multipart/x-mixed-replace; boundary={boundary}\r\n\r\n",
        status_line = super::http::status_line(200),
        boundary = BOUNDARY
    );
    stream.write_all(header.as_bytes())?;
    stream.flush()?;
    Ok(())
}

pub(crate) fn write_part<S: Write>(stream: &mut S, frame: &EncodedFrame) -> Result<()> {
    let part_head = format!(
        "--{boundary}\r\nContent-Type: image/jpeg\r\nContent-Length: {len}\r\n\r\n",
        boundary = BOUNDARY,
        len = frame.len()
    );
    stream.write_all(part_head.as_bytes())?;
    stream.write_all(frame.bytes())?;
    stream.write_all(b"\r\n")?;
    stream.flush()?;
    Ok(())
}

/// Send every new frame to one client until a write fails or the server stops.
///
/// Blocks only inside the buffer wait; `poll` bounds how long a shutdown can go
/// unnoticed while no frames arrive. Write errors (client gone) are returned.
pub(crate) fn stream_frames<S: Write>(
    stream: &mut S,
    buffer: &SharedFrameBuffer,
    shutdown: &AtomicBool,
    poll: Duration,
) -> Result<StreamEnd> {
    let mut last_seen = 0u64;
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return Ok(StreamEnd::ServerShutdown);
        }
        match buffer.wait_for_next_timeout(last_seen, poll) {
            WaitOutcome::Frame(frame) => {
                write_part(stream, &frame)?;
                last_seen = frame.version();
            }
            WaitOutcome::TimedOut => continue,
            WaitOutcome::Closed => return Ok(StreamEnd::SourceClosed),
        }
    }
}
