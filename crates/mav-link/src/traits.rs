use crate::{LinkInfo, ReceivedFrame, Result, WireMessage};

/// A minimal blocking link to a vehicle.
///
/// Implementations split the byte stream into frames, check framing and hand back
/// decoded [`WireMessage`]s. Retransmission is not a concern of this layer.
pub trait Link {
    /// Open a link by endpoint name (e.g., "mock0", "/dev/ttyACM0").
    fn open(name: &str) -> Result<Self>
    where
        Self: Sized;

    /// Attempt to list available endpoints for this backend.
    fn list() -> Result<Vec<LinkInfo>>;

    /// Receive one frame (blocking with optional timeout in milliseconds).
    ///
    /// Frames that failed CRC or signature checks are still returned, flagged through
    /// [`ReceivedFrame::framing`].
    fn recv(&mut self, timeout_ms: Option<u64>) -> Result<ReceivedFrame>;

    /// Send one message. No acknowledgement is awaited.
    fn send(&mut self, msg: &WireMessage) -> Result<()>;
}
