use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::{future, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::transport::{
    characteristic_uuid, scan_window, CharacteristicHandle, Connection, DeviceHandle, NotificationStream,
    Transport, TransportError, HEART_RATE_SERVICE_UUID,
};

/// btleplug-backed transport, bound to the first adapter found.
pub struct BtleTransport {
    central: Adapter,
    // Peripherals seen during the last scans, keyed by `DeviceHandle::id`
    known: Mutex<HashMap<String, Peripheral>>,
}

impl BtleTransport {
    pub async fn new() -> Result<Self, TransportError> {
        let manager = Manager::new().await?;
        let central = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(TransportError::NoAdapter)?;
        info!("Using Bluetooth adapter: {:?}", central.adapter_info().await);
        Ok(Self {
            central,
            known: Mutex::new(HashMap::new()),
        })
    }
}

#[async_trait]
impl Transport for BtleTransport {
    type Connection = BtleConnection;

    async fn discover(
        &self,
        window: Duration,
        cancel_token: &CancellationToken,
    ) -> Result<Vec<DeviceHandle>, TransportError> {
        self.central.start_scan(ScanFilter::default()).await?;
        if !scan_window(window, cancel_token).await {
            debug!("Scan window cut short");
        }
        let peripherals = self.central.peripherals().await;
        if let Err(e) = self.central.stop_scan().await {
            warn!("Failed to stop scan: {e}");
        }

        let mut found = Vec::new();
        for peripheral in peripherals? {
            let Some(properties) = peripheral.properties().await? else {
                continue;
            };
            let handle = DeviceHandle {
                id: peripheral.id().to_string(),
                name: properties.local_name,
                address: properties.address.to_string(),
                rssi: properties.rssi,
                advertises_heart_rate: properties.services.contains(&HEART_RATE_SERVICE_UUID),
            };
            found.push((handle, peripheral));
        }
        debug!("Scan window closed with {} devices", found.len());

        let mut known = self.known.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(found
            .into_iter()
            .map(|(handle, peripheral)| {
                known.insert(handle.id.clone(), peripheral);
                handle
            })
            .collect())
    }

    async fn connect(
        &self,
        device: &DeviceHandle,
        timeout: Duration,
    ) -> Result<BtleConnection, TransportError> {
        let peripheral = self
            .known
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&device.id)
            .cloned()
            .ok_or_else(|| TransportError::UnknownDevice(device.to_string()))?;

        // Service discovery can stall just like the connect itself
        tokio::time::timeout(timeout, async {
            peripheral.connect().await?;
            peripheral.discover_services().await
        })
        .await
        .map_err(|_| TransportError::Timeout(timeout))??;
        debug!(
            "Connected to {device}, found {} characteristics",
            peripheral.characteristics().len()
        );

        Ok(BtleConnection {
            central: self.central.clone(),
            peripheral,
        })
    }
}

pub struct BtleConnection {
    central: Adapter,
    peripheral: Peripheral,
}

impl BtleConnection {
    fn lookup(
        &self,
        characteristic: &CharacteristicHandle,
    ) -> Result<btleplug::api::Characteristic, TransportError> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == characteristic.uuid && c.service_uuid == characteristic.service)
            .ok_or(TransportError::NotSubscribed(characteristic.uuid))
    }
}

#[async_trait]
impl Connection for BtleConnection {
    fn find_characteristic(&self, description: &str) -> Option<CharacteristicHandle> {
        let uuid = characteristic_uuid(description)?;
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .map(|c| CharacteristicHandle {
                uuid: c.uuid,
                service: c.service_uuid,
                description: description.to_owned(),
            })
    }

    async fn subscribe(
        &mut self,
        characteristic: &CharacteristicHandle,
    ) -> Result<NotificationStream, TransportError> {
        let target = self.lookup(characteristic)?;
        self.peripheral.subscribe(&target).await?;

        let notifications = self.peripheral.notifications().await?;
        let mut events = self.central.events().await?;
        let id = self.peripheral.id();
        // The adapter tells us about drops, the notification stream doesn't always end on its own
        let dropped = async move {
            while let Some(event) = events.next().await {
                if matches!(event, CentralEvent::DeviceDisconnected(ref gone) if *gone == id) {
                    return;
                }
            }
        };

        let uuid = target.uuid;
        let stream = notifications
            .filter(move |n| future::ready(n.uuid == uuid))
            .map(|n| n.value)
            .take_until(dropped);
        Ok(Box::pin(stream))
    }

    async fn unsubscribe(
        &mut self,
        characteristic: &CharacteristicHandle,
    ) -> Result<(), TransportError> {
        let target = self.lookup(characteristic)?;
        self.peripheral.unsubscribe(&target).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.peripheral.is_connected().await.unwrap_or(false) {
            self.peripheral.disconnect().await?;
        }
        Ok(())
    }
}
