use bytes::Bytes;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::debug;

use crate::{protocol::parse_telemetry, state::DeskState};

/// Sending half handed to the transport's notification delivery
pub type FrameSender = mpsc::UnboundedSender<Bytes>;

/// Receiving half consumed by the [`TelemetryIngestor`]
pub type FrameReceiver = mpsc::UnboundedReceiver<Bytes>;

/// Create the channel that carries raw notification frames
#[must_use]
pub fn frame_channel() -> (FrameSender, FrameReceiver) {
    mpsc::unbounded_channel()
}

/// Background consumer that keeps [`DeskState`] in sync with the desk
///
/// The transport only pushes raw frames into an unbounded channel, so its
/// delivery path never waits on the state lock.
#[derive(Debug)]
pub struct TelemetryIngestor {
    state: DeskState,
}

impl TelemetryIngestor {
    /// Create an ingestor writing into `state`
    #[must_use]
    pub const fn new(state: DeskState) -> Self {
        Self { state }
    }

    /// Decode one frame and store it
    ///
    /// Returns `false` when the frame was too short and got discarded.
    pub async fn ingest(&self, frame: &[u8]) -> bool {
        debug!(buffer = ?frame, "Notification received");

        let Some(reading) = parse_telemetry(frame) else {
            return false;
        };

        self.state.apply(reading).await;
        debug!(
            height = reading.height,
            speed = reading.speed,
            "Parameters updated"
        );
        true
    }

    /// Consume frames until every sender is dropped
    pub async fn run(self, mut frames: FrameReceiver) {
        while let Some(frame) = frames.recv().await {
            self.ingest(&frame).await;
        }
        debug!("Telemetry channel closed");
    }

    /// Run the ingestor on its own task
    pub fn spawn(self, frames: FrameReceiver) -> JoinHandle<()> {
        tokio::spawn(self.run(frames))
    }
}
