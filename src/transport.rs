//! Narrow interface to the radio stack.
//!
//! [`DeskSession`](crate::DeskSession) only talks to the desk through these
//! traits. [`BleTransport`](crate::ble::BleTransport) implements them on top
//! of btleplug; tests plug in an in-memory implementation.

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;
use uuid::Uuid;

use crate::{error::Result, telemetry::FrameSender, types::ScanResult};

/// Adapter-level operations: power, discovery and connection
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connected device handle produced by [`Transport::connect`]
    type Link: DeviceLink + 'static;

    /// Power up the local radio adapter
    async fn enable_adapter(&mut self) -> Result<()>;

    /// Start scanning and stream every advertisement seen
    ///
    /// The stream ends when the scan is stopped or the adapter goes away.
    async fn scan(&self) -> Result<BoxStream<'static, ScanResult>>;

    /// Stop a running scan
    async fn stop_scan(&self) -> Result<()>;

    /// Connect to the device with the given address
    async fn connect(&self, address: &str) -> Result<Self::Link>;
}

/// GATT operations on a connected device
#[async_trait]
pub trait DeviceLink: Send + Sync {
    /// Discover services and return the subset of `services` that is present
    async fn discover_services(&self, services: &[Uuid]) -> Result<Vec<Uuid>>;

    /// Look up `characteristics` on `service`
    ///
    /// Fails if any of them is missing.
    async fn discover_characteristics(&self, service: Uuid, characteristics: &[Uuid])
        -> Result<()>;

    /// Subscribe to a notify characteristic and forward every frame to `frames`
    async fn enable_notifications(&self, characteristic: Uuid, frames: FrameSender) -> Result<()>;

    /// Write raw bytes to a characteristic
    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<()>;

    /// Drop the connection
    async fn disconnect(&self) -> Result<()>;
}

/// Destination for desk commands
#[async_trait]
pub trait CommandSink: Send + Sync {
    /// Send one command frame
    async fn send(&self, data: &[u8]) -> Result<()>;
}

/// [`CommandSink`] writing to one characteristic of a [`DeviceLink`]
pub struct CharacteristicWriter<L> {
    link: Arc<L>,
    characteristic: Uuid,
}

impl<L: DeviceLink> CharacteristicWriter<L> {
    /// Bind `link` and the characteristic commands are written to
    pub const fn new(link: Arc<L>, characteristic: Uuid) -> Self {
        Self {
            link,
            characteristic,
        }
    }
}

#[async_trait]
impl<L: DeviceLink> CommandSink for CharacteristicWriter<L> {
    async fn send(&self, data: &[u8]) -> Result<()> {
        self.link.write(self.characteristic, data).await
    }
}
