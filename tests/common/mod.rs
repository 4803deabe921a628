//! In-memory desk used by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use tmotion_desk::{
    protocol::{encode_command, DOWN_COMMAND, STOP_COMMAND, UP_COMMAND},
    telemetry::FrameSender,
    DeskError, DeskState, DeviceLink, Result, ScanResult, Transport, UART_RX_CHAR_UUID,
    UART_SERVICE_UUID,
};
use uuid::Uuid;

pub const DESK_ADDRESS: &str = "D4:36:39:8A:1F:02";

/// What the simulated desk supports and how it misbehaves
#[derive(Debug, Clone)]
pub struct Behavior {
    pub adapter_available: bool,
    pub accepts_connection: bool,
    pub has_uart_service: bool,
    pub has_characteristics: bool,
    pub reports_telemetry: bool,
    pub fail_writes_after: Option<usize>,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            adapter_available: true,
            accepts_connection: true,
            has_uart_service: true,
            has_characteristics: true,
            reports_telemetry: true,
            fail_writes_after: None,
        }
    }
}

/// Desk that moves one centimeter per move command and answers every write
/// with a telemetry frame
pub struct SimulatedDesk {
    behavior: Behavior,
    height: Mutex<u8>,
    writes: Mutex<Vec<(Uuid, Vec<u8>)>>,
    frames: Mutex<Option<FrameSender>>,
    frames_sent: Mutex<u64>,
    observer: Mutex<Option<DeskState>>,
    disconnected: AtomicBool,
    silent: AtomicBool,
}

impl SimulatedDesk {
    pub fn new(height: u8, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            height: Mutex::new(height),
            writes: Mutex::new(Vec::new()),
            frames: Mutex::new(None),
            frames_sent: Mutex::new(0),
            observer: Mutex::new(None),
            disconnected: AtomicBool::new(false),
            silent: AtomicBool::new(false),
        })
    }

    /// Make every write wait until `state` has ingested the frame it caused
    pub fn observe(&self, state: DeskState) {
        *self.observer.lock().unwrap() = Some(state);
    }

    pub fn height(&self) -> u8 {
        *self.height.lock().unwrap()
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .map(|(_, data)| data.clone())
            .collect()
    }

    pub fn write_targets(&self) -> Vec<Uuid> {
        self.writes.lock().unwrap().iter().map(|(uuid, _)| *uuid).collect()
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    /// Stop answering writes with telemetry from now on
    pub fn go_silent(&self) {
        self.silent.store(true, Ordering::SeqCst);
    }

    /// Apply a command and notify the resulting frame
    ///
    /// Returns how many frames have been notified so far, or `None` if this
    /// command produced no frame.
    fn react(&self, data: &[u8]) -> Option<u64> {
        let mut height = self.height.lock().unwrap();
        let speed = if data == encode_command(UP_COMMAND) {
            *height += 1;
            1
        } else if data == encode_command(DOWN_COMMAND) {
            *height -= 1;
            1
        } else {
            assert_eq!(data, STOP_COMMAND, "unexpected command {data:02X?}");
            0
        };

        if !self.behavior.reports_telemetry || self.silent.load(Ordering::SeqCst) {
            return None;
        }
        let frames = self.frames.lock().unwrap();
        let sender = frames.as_ref()?;
        sender
            .send(Bytes::from(vec![0x98, speed, 0x00, *height, 0x00]))
            .ok()?;

        let mut sent = self.frames_sent.lock().unwrap();
        *sent += 1;
        Some(*sent)
    }
}

pub struct SimulatedTransport {
    desk: Arc<SimulatedDesk>,
    advertisements: Vec<ScanResult>,
    keep_scanning: bool,
    scan_stopped: Arc<AtomicBool>,
}

impl SimulatedTransport {
    /// Transport whose scan reports `advertisements` and then ends
    pub fn new(desk: Arc<SimulatedDesk>, advertisements: Vec<ScanResult>) -> Self {
        Self {
            desk,
            advertisements,
            keep_scanning: false,
            scan_stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Transport whose scan finds the desk at [`DESK_ADDRESS`]
    pub fn with_desk(desk: Arc<SimulatedDesk>) -> Self {
        Self::new(desk, vec![named(DESK_ADDRESS, "TMotion")])
    }

    /// Keep the scan open after the advertisements, like a real radio
    pub fn scanning_forever(mut self) -> Self {
        self.keep_scanning = true;
        self
    }

    pub fn scan_stopped(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.scan_stopped)
    }
}

pub fn named(address: &str, name: &str) -> ScanResult {
    ScanResult {
        address: address.to_string(),
        local_name: Some(name.to_string()),
        rssi: Some(-60),
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    type Link = SimulatedLink;

    async fn enable_adapter(&mut self) -> Result<()> {
        if self.desk.behavior.adapter_available {
            Ok(())
        } else {
            Err(DeskError::AdapterUnavailable)
        }
    }

    async fn scan(&self) -> Result<BoxStream<'static, ScanResult>> {
        let seen = stream::iter(self.advertisements.clone());
        if self.keep_scanning {
            Ok(seen.chain(stream::pending()).boxed())
        } else {
            Ok(seen.boxed())
        }
    }

    async fn stop_scan(&self) -> Result<()> {
        self.scan_stopped.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn connect(&self, address: &str) -> Result<SimulatedLink> {
        if !self.desk.behavior.accepts_connection {
            return Err(DeskError::ConnectionFailed(format!("{address} refused")));
        }
        Ok(SimulatedLink {
            desk: Arc::clone(&self.desk),
        })
    }
}

pub struct SimulatedLink {
    desk: Arc<SimulatedDesk>,
}

#[async_trait]
impl DeviceLink for SimulatedLink {
    async fn discover_services(&self, services: &[Uuid]) -> Result<Vec<Uuid>> {
        if !self.desk.behavior.has_uart_service {
            return Ok(Vec::new());
        }
        Ok(services
            .iter()
            .copied()
            .filter(|uuid| *uuid == UART_SERVICE_UUID)
            .collect())
    }

    async fn discover_characteristics(
        &self,
        _service: Uuid,
        _characteristics: &[Uuid],
    ) -> Result<()> {
        if self.desk.behavior.has_characteristics {
            Ok(())
        } else {
            Err(DeskError::Protocol("characteristic discovery failed".to_string()))
        }
    }

    async fn enable_notifications(
        &self,
        _characteristic: Uuid,
        frames: FrameSender,
    ) -> Result<()> {
        *self.desk.frames.lock().unwrap() = Some(frames);
        Ok(())
    }

    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<()> {
        {
            let mut writes = self.desk.writes.lock().unwrap();
            if self
                .desk
                .behavior
                .fail_writes_after
                .is_some_and(|limit| writes.len() >= limit)
            {
                return Err(DeskError::CommandWrite("link lost".to_string()));
            }
            assert_eq!(characteristic, UART_RX_CHAR_UUID);
            writes.push((characteristic, data.to_vec()));
        }

        let Some(sent) = self.desk.react(data) else {
            return Ok(());
        };
        let observer = self.desk.observer.lock().unwrap().clone();
        if let Some(state) = observer {
            while state.frames_received().await < sent {
                tokio::task::yield_now().await;
            }
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.desk.disconnected.store(true, Ordering::SeqCst);
        Ok(())
    }
}
