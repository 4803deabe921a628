use std::sync::Arc;
use tokio::sync::RwLock;

use crate::types::DeskReading;

#[derive(Debug, Default)]
struct Telemetry {
    reading: DeskReading,
    frames_received: u64,
}

/// Last known height and speed of the desk
///
/// Cloning yields another handle to the same state. Any number of readers may
/// hold the lock at once; a writer excludes everyone else, and the lock is
/// only held for the copy itself.
#[derive(Debug, Clone, Default)]
pub struct DeskState {
    inner: Arc<RwLock<Telemetry>>,
}

impl DeskState {
    /// Create an empty state (height and speed 0, no frames seen)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current height in centimeters
    pub async fn height(&self) -> u8 {
        self.inner.read().await.reading.height
    }

    /// Overwrite the height
    pub async fn set_height(&self, height: u8) {
        self.inner.write().await.reading.height = height;
    }

    /// Current speed
    pub async fn speed(&self) -> u8 {
        self.inner.read().await.reading.speed
    }

    /// Overwrite the speed
    pub async fn set_speed(&self, speed: u8) {
        self.inner.write().await.reading.speed = speed;
    }

    /// Height and speed read under a single lock
    pub async fn reading(&self) -> DeskReading {
        self.inner.read().await.reading
    }

    /// Store a full telemetry reading
    ///
    /// Height and speed are replaced together, so no reader can see the
    /// height of one frame paired with the speed of another.
    pub async fn apply(&self, reading: DeskReading) {
        let mut telemetry = self.inner.write().await;
        telemetry.reading = reading;
        telemetry.frames_received = telemetry.frames_received.saturating_add(1);
    }

    /// Number of telemetry frames applied so far
    pub async fn frames_received(&self) -> u64 {
        self.inner.read().await.frames_received
    }
}
