use anyhow::Result;

use crate::detect::result::DetectionResult;

/// Object detector backend.
///
/// Invoked by the detection loop every Nth frame. Implementations receive
/// packed RGB24 pixels and must treat the slice as read-only and ephemeral.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<DetectionResult>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
