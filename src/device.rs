use futures::StreamExt;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::timeout};
use tracing::{debug, info, warn};

use crate::{
    ble::BleTransport,
    error::{DeskError, Result},
    motion::{MotionController, MoveReport},
    protocol::STOP_COMMAND,
    state::DeskState,
    telemetry::{frame_channel, FrameSender, TelemetryIngestor},
    transport::{CharacteristicWriter, CommandSink, DeviceLink, Transport},
    types::{validate_height, ConnectionParams, DeskReading, MotionConfig, ScanResult},
    UART_RX_CHAR_UUID, UART_SERVICE_UUID, UART_TX_CHAR_UUID,
};

struct Connection<L> {
    link: Arc<L>,
    writer: CharacteristicWriter<L>,
    ingestor: JoinHandle<()>,
}

/// Main interface for controlling a TMotion desk
///
/// A session is bound to one desk address. [`connect`](Self::connect) runs the
/// whole establishment sequence once; afterwards a background task keeps the
/// height and speed current while [`move_to`](Self::move_to) drives the desk.
///
/// # Connection sequence
///
/// 1. Enable the local Bluetooth adapter
/// 2. Scan until the configured address shows up, then stop scanning
/// 3. Connect to the desk
/// 4. Discover the Nordic UART service
/// 5. Discover the RX (write) and TX (notify) characteristics
/// 6. Subscribe to TX notifications and start the telemetry ingestor
/// 7. Send a stop command so the desk reports its height, then settle
///
/// Every step gates the next; there are no retries.
///
/// # Examples
///
/// ```no_run
/// use tmotion_desk::DeskSession;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut desk = DeskSession::new("D4:36:39:8A:1F:02");
///     desk.connect().await?;
///
///     println!("Desk is at {} cm", desk.height().await);
///     desk.move_to(110).await?;
///
///     Ok(())
/// }
/// ```
pub struct DeskSession<T: Transport = BleTransport> {
    address: String,
    transport: T,
    params: ConnectionParams,
    state: DeskState,
    motion: MotionController,
    connection: Option<Connection<T::Link>>,
}

impl DeskSession<BleTransport> {
    /// Create a session for the desk at `address` using the platform BLE stack
    ///
    /// Nothing touches the radio until [`connect`](Self::connect).
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self::with_transport(address, BleTransport::new())
    }
}

impl<T: Transport> DeskSession<T> {
    /// Create a session on top of a custom [`Transport`]
    #[must_use]
    pub fn with_transport(address: impl Into<String>, transport: T) -> Self {
        let state = DeskState::new();
        Self {
            address: address.into(),
            transport,
            params: ConnectionParams::default(),
            motion: MotionController::new(state.clone(), MotionConfig::default()),
            state,
            connection: None,
        }
    }

    /// Replace the connection parameters
    #[must_use]
    pub fn with_params(mut self, params: ConnectionParams) -> Self {
        self.params = params;
        self
    }

    /// Replace the motion tuning
    #[must_use]
    pub fn with_motion_config(mut self, config: MotionConfig) -> Self {
        self.motion = MotionController::new(self.state.clone(), config);
        self
    }

    /// Address this session is bound to
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Connection parameters in use
    #[must_use]
    pub const fn params(&self) -> &ConnectionParams {
        &self.params
    }

    /// Motion tuning in use
    #[must_use]
    pub const fn motion_config(&self) -> &MotionConfig {
        self.motion.config()
    }

    /// Shared telemetry state, updated in the background once connected
    #[must_use]
    pub const fn state(&self) -> &DeskState {
        &self.state
    }

    /// Whether [`connect`](Self::connect) has completed
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Last reported height in centimeters
    pub async fn height(&self) -> u8 {
        self.state.height().await
    }

    /// Last reported speed
    pub async fn speed(&self) -> u8 {
        self.state.speed().await
    }

    /// Last reported height and speed, read together
    pub async fn reading(&self) -> DeskReading {
        self.state.reading().await
    }

    /// Establish the session
    ///
    /// The desk is matched by address ignoring ASCII case, so `d4:36:…` and
    /// `D4:36:…` find the same desk. On macOS the address is the platform
    /// UUID shown by [`scan_devices`]. Calling this on an already connected
    /// session is a no-op.
    ///
    /// # Errors
    ///
    /// - [`DeskError::AdapterUnavailable`] or [`DeskError::Ble`] if the adapter
    ///   cannot be enabled
    /// - [`DeskError::ScanFailed`] if the scan cannot be started
    /// - [`DeskError::Timeout`] if the desk is not seen within
    ///   `scan_timeout_ms` or does not accept the connection within
    ///   `connect_timeout_ms`
    /// - [`DeskError::DeskNotFound`] if the scan ended without a match
    /// - [`DeskError::ConnectionFailed`] if the connection is refused
    /// - [`DeskError::ServiceNotFound`] if the UART service is missing
    /// - [`DeskError::CharacteristicNotFound`] if RX/TX discovery fails
    /// - [`DeskError::CommandWrite`] if the priming stop command fails
    /// - [`DeskError::TelemetryUnavailable`] if `verify_telemetry` is set and
    ///   no telemetry arrived while settling
    pub async fn connect(&mut self) -> Result<()> {
        if self.connection.is_some() {
            return Ok(());
        }

        self.transport.enable_adapter().await?;

        let found = self.find_desk().await?;
        let link = Arc::new(self.connect_link(&found.address).await?);
        info!(
            address = %found.address,
            local_name = ?found.local_name,
            "Connected to the device"
        );

        let services = link.discover_services(&[UART_SERVICE_UUID]).await?;
        if !services.contains(&UART_SERVICE_UUID) {
            return Err(DeskError::ServiceNotFound);
        }
        debug!(uuid = %UART_SERVICE_UUID, "found service");

        link.discover_characteristics(UART_SERVICE_UUID, &[UART_RX_CHAR_UUID, UART_TX_CHAR_UUID])
            .await
            .map_err(|e| match e {
                DeskError::CharacteristicNotFound(_) => e,
                other => DeskError::CharacteristicNotFound(other.to_string()),
            })?;
        debug!(uuid = %UART_RX_CHAR_UUID, "found RX characteristic");
        debug!(uuid = %UART_TX_CHAR_UUID, "found TX characteristic");

        let (frames_tx, frames_rx) = frame_channel();
        let ingestor = TelemetryIngestor::new(self.state.clone()).spawn(frames_rx);
        let writer = CharacteristicWriter::new(Arc::clone(&link), UART_RX_CHAR_UUID);

        if let Err(e) = self.prime(&link, &writer, frames_tx).await {
            ingestor.abort();
            return Err(e);
        }

        let height = self.state.height().await;
        info!(height, "Device successfully initialised");
        self.connection = Some(Connection {
            link,
            writer,
            ingestor,
        });

        Ok(())
    }

    /// Scan until the configured address shows up
    async fn find_desk(&self) -> Result<ScanResult> {
        let mut results = self.transport.scan().await?;

        let search = async {
            while let Some(result) = results.next().await {
                debug!(
                    address = %result.address,
                    rssi = ?result.rssi,
                    local_name = ?result.local_name,
                    "found device"
                );
                if result.matches_address(&self.address) {
                    return Some(result);
                }
            }
            None
        };
        let outcome = timeout(Duration::from_millis(self.params.scan_timeout_ms), search).await;

        if let Err(e) = self.transport.stop_scan().await {
            warn!(error = %e, "Could not stop scan");
        }

        match outcome {
            Ok(Some(result)) => Ok(result),
            Ok(None) => Err(DeskError::DeskNotFound {
                address: self.address.clone(),
            }),
            Err(_) => Err(DeskError::Timeout {
                timeout_ms: self.params.scan_timeout_ms,
            }),
        }
    }

    async fn connect_link(&self, address: &str) -> Result<T::Link> {
        let timeout_ms = self.params.connect_timeout_ms;
        timeout(
            Duration::from_millis(timeout_ms),
            self.transport.connect(address),
        )
        .await
        .map_err(|_| DeskError::Timeout { timeout_ms })?
    }

    /// Subscribe to telemetry and ask the desk for its first frame
    async fn prime(
        &self,
        link: &T::Link,
        writer: &CharacteristicWriter<T::Link>,
        frames: FrameSender,
    ) -> Result<()> {
        link.enable_notifications(UART_TX_CHAR_UUID, frames).await?;

        // State survives reconnects, so only frames from this link count
        let frames_before = self.state.frames_received().await;
        writer.send(&STOP_COMMAND).await?;
        tokio::time::sleep(Duration::from_millis(self.params.settle_ms)).await;

        if self.params.verify_telemetry && self.state.frames_received().await == frames_before {
            return Err(DeskError::TelemetryUnavailable);
        }

        Ok(())
    }

    /// Move the desk to `target` centimeters and stop it there
    ///
    /// Blocks until the reported height is within the tolerance band of the
    /// target. See [`MotionController::move_to`] for the exact policy.
    ///
    /// # Errors
    ///
    /// - [`DeskError::InvalidHeight`] if `target` is outside 65-130 cm
    /// - [`DeskError::NotConnected`] before [`connect`](Self::connect)
    /// - [`DeskError::CommandWrite`] if a write fails mid-move; the desk state
    ///   is then unknown and the caller should not continue with it
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use tmotion_desk::DeskSession;
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut desk = DeskSession::new("D4:36:39:8A:1F:02");
    /// desk.connect().await?;
    ///
    /// let report = desk.move_to(72).await?;
    /// println!("Stopped at {} cm", report.final_height);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn move_to(&self, target: u8) -> Result<MoveReport> {
        validate_height(target)?;
        let connection = self.connection.as_ref().ok_or(DeskError::NotConnected)?;

        self.motion.move_to(&connection.writer, target).await
    }

    /// Stop the telemetry task and drop the connection
    ///
    /// # Errors
    ///
    /// Returns transport errors from the disconnect itself; the telemetry task
    /// is stopped regardless.
    pub async fn disconnect(&mut self) -> Result<()> {
        info!("Disconnecting from device");

        if let Some(connection) = self.connection.take() {
            connection.ingestor.abort();
            connection.link.disconnect().await?;
        }

        Ok(())
    }
}

impl<T: Transport> Drop for DeskSession<T> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.as_ref() {
            connection.ingestor.abort();
        }
    }
}

/// List devices advertising nearby
///
/// Enables the adapter, scans for `duration` and returns every device seen,
/// one entry per address with the most recent name and RSSI.
///
/// # Errors
///
/// Returns adapter and scan errors from the transport.
pub async fn scan_devices<T: Transport>(
    transport: &mut T,
    duration: Duration,
) -> Result<Vec<ScanResult>> {
    transport.enable_adapter().await?;
    let mut results = transport.scan().await?;

    let mut devices: Vec<ScanResult> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    let collect = async {
        while let Some(result) = results.next().await {
            if let Some(&i) = index.get(&result.address) {
                devices[i] = result;
            } else {
                debug!(address = %result.address, local_name = ?result.local_name, "found device");
                index.insert(result.address.clone(), devices.len());
                devices.push(result);
            }
        }
    };
    // The scan only ends early if the adapter goes away
    let _ = timeout(duration, collect).await;

    transport.stop_scan().await?;
    info!("Scan completed. Found {} device(s)", devices.len());

    Ok(devices)
}
