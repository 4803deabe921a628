use async_trait::async_trait;
use btleplug::{
    api::{
        BDAddr, Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, PeripheralProperties,
        ScanFilter, ValueNotification, WriteType,
    },
    platform::{Adapter, Manager, Peripheral},
};
use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};
use std::{collections::HashMap, fmt::Display};
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    error::{DeskError, Result},
    telemetry::FrameSender,
    transport::{DeviceLink, Transport},
    types::ScanResult,
};

/// btleplug-backed [`Transport`] using the first local adapter
#[derive(Default)]
pub struct BleTransport {
    adapter: Option<Adapter>,
}

impl BleTransport {
    /// Create a transport; nothing touches the radio until
    /// [`Transport::enable_adapter`] is called
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn adapter(&self) -> Result<&Adapter> {
        self.adapter.as_ref().ok_or(DeskError::AdapterUnavailable)
    }

    async fn find_peripheral(&self, address: &str) -> Result<Peripheral> {
        let peripherals = self.adapter()?.peripherals().await?;
        peripherals
            .into_iter()
            .find(|p| is_peripheral(p.address(), &p.id(), address))
            .ok_or_else(|| DeskError::DeskNotFound {
                address: address.to_string(),
            })
    }
}

#[async_trait]
impl Transport for BleTransport {
    type Link = BleLink;

    async fn enable_adapter(&mut self) -> Result<()> {
        if self.adapter.is_some() {
            return Ok(());
        }

        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(DeskError::AdapterUnavailable)?;

        if let Ok(adapter_info) = adapter.adapter_info().await {
            debug!(adapter = %adapter_info, "BLE adapter enabled");
        }

        self.adapter = Some(adapter);
        Ok(())
    }

    async fn scan(&self) -> Result<BoxStream<'static, ScanResult>> {
        let adapter = self.adapter()?.clone();

        // Subscribe before starting so early advertisements are not lost
        let events = adapter
            .events()
            .await
            .map_err(|e| DeskError::ScanFailed(e.to_string()))?;
        adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| DeskError::ScanFailed(e.to_string()))?;
        info!("Scanning BLE devices");

        let results = events.filter_map(move |event| {
            let adapter = adapter.clone();
            async move {
                let (CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id)) = event
                else {
                    return None;
                };
                let peripheral = adapter.peripheral(&id).await.ok()?;
                let properties = peripheral.properties().await.ok().flatten();
                Some(scan_result(&peripheral, properties))
            }
        });

        Ok(results.boxed())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.adapter()?.stop_scan().await?;
        Ok(())
    }

    async fn connect(&self, address: &str) -> Result<BleLink> {
        let peripheral = self.find_peripheral(address).await?;

        peripheral
            .connect()
            .await
            .map_err(|e| DeskError::ConnectionFailed(e.to_string()))?;

        Ok(BleLink::new(peripheral))
    }
}

/// Address a peripheral is reported and looked up by
///
/// CoreBluetooth hides the MAC address and reports `00:00:00:00:00:00`; the
/// platform identifier (a UUID there) is used instead.
fn device_address(address: BDAddr, id: &impl Display) -> String {
    if address == BDAddr::default() {
        id.to_string()
    } else {
        address.to_string()
    }
}

fn is_peripheral(address: BDAddr, id: &impl Display, wanted: &str) -> bool {
    device_address(address, id).eq_ignore_ascii_case(wanted)
}

/// Build a [`ScanResult`] from what the platform knows about a peripheral
fn scan_result(peripheral: &Peripheral, properties: Option<PeripheralProperties>) -> ScanResult {
    let mut result = ScanResult::new(device_address(peripheral.address(), &peripheral.id()));
    if let Some(properties) = properties {
        result.local_name = properties.local_name;
        result.rssi = properties.rssi;
    }
    result
}

/// Active GATT connection to a desk
pub struct BleLink {
    peripheral: Peripheral,
    characteristics: Mutex<HashMap<Uuid, Characteristic>>,
    notification_task: Mutex<Option<JoinHandle<()>>>,
}

impl BleLink {
    fn new(peripheral: Peripheral) -> Self {
        Self {
            peripheral,
            characteristics: Mutex::new(HashMap::new()),
            notification_task: Mutex::new(None),
        }
    }

    async fn characteristic(&self, uuid: Uuid) -> Result<Characteristic> {
        self.characteristics
            .lock()
            .await
            .get(&uuid)
            .cloned()
            .ok_or_else(|| DeskError::CharacteristicNotFound(format!("{uuid} not discovered")))
    }
}

#[async_trait]
impl DeviceLink for BleLink {
    async fn discover_services(&self, services: &[Uuid]) -> Result<Vec<Uuid>> {
        debug!("discovering services/characteristics");
        self.peripheral.discover_services().await?;

        Ok(self
            .peripheral
            .services()
            .iter()
            .filter(|s| services.contains(&s.uuid))
            .map(|s| s.uuid)
            .collect())
    }

    async fn discover_characteristics(
        &self,
        service: Uuid,
        characteristics: &[Uuid],
    ) -> Result<()> {
        let services = self.peripheral.services();
        let service = services
            .iter()
            .find(|s| s.uuid == service)
            .ok_or(DeskError::ServiceNotFound)?;

        let mut found = self.characteristics.lock().await;
        for uuid in characteristics {
            let characteristic = service
                .characteristics
                .iter()
                .find(|c| c.uuid == *uuid)
                .ok_or_else(|| DeskError::CharacteristicNotFound(uuid.to_string()))?;
            debug!(uuid = %characteristic.uuid, "found characteristic");
            found.insert(*uuid, characteristic.clone());
        }

        Ok(())
    }

    async fn enable_notifications(&self, characteristic: Uuid, frames: FrameSender) -> Result<()> {
        let tx_char = self.characteristic(characteristic).await?;

        let notifications = self.peripheral.notifications().await?;
        self.peripheral.subscribe(&tx_char).await?;

        let task = tokio::spawn(forward_notifications(notifications, characteristic, frames));
        if let Some(previous) = self.notification_task.lock().await.replace(task) {
            previous.abort();
        }

        Ok(())
    }

    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<()> {
        let rx_char = self.characteristic(characteristic).await?;
        debug!("Sending command: {:02X?}", data);

        self.peripheral
            .write(&rx_char, data, WriteType::WithoutResponse)
            .await
            .map_err(|e| DeskError::CommandWrite(e.to_string()))
    }

    async fn disconnect(&self) -> Result<()> {
        if let Some(task) = self.notification_task.lock().await.take() {
            task.abort();
        }
        self.peripheral.disconnect().await?;
        Ok(())
    }
}

/// Forward notifications from one characteristic into the frame channel
///
/// Returns when the notification stream ends or the receiving side is gone.
async fn forward_notifications<S>(mut notifications: S, characteristic: Uuid, frames: FrameSender)
where
    S: Stream<Item = ValueNotification> + Unpin,
{
    while let Some(data) = notifications.next().await {
        if data.uuid == characteristic && frames.send(Bytes::from(data.value)).is_err() {
            break;
        }
    }
}
