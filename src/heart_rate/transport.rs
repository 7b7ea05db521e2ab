//! The seam between a heart rate session and whatever BLE stack is underneath.
//!
//! `btle` implements this with btleplug, `dummy` with a simulated monitor, and
//! the session tests with scripted connections.

use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// The standard description of the characteristic we subscribe to.
pub const HEART_RATE_MEASUREMENT: &str = "Heart Rate Measurement";

pub const HEART_RATE_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000180d_0000_1000_8000_00805f9b34fb);
pub const HEART_RATE_MEASUREMENT_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x00002a37_0000_1000_8000_00805f9b34fb);

/// Raw notification payloads. The stream ending means the device went away.
pub type NotificationStream = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;

/// A discoverable peripheral. Treated as an opaque token by the session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceHandle {
    pub id: String,
    pub name: Option<String>,
    pub address: String,
    pub rssi: Option<i16>,
    pub advertises_heart_rate: bool,
}

impl DeviceHandle {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown")
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name(), self.address)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicHandle {
    pub uuid: Uuid,
    pub service: Uuid,
    pub description: String,
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Bluetooth Error: {0}")]
    Bt(#[from] btleplug::Error),
    #[error("No Bluetooth adapters found! Make sure it's plugged in and enabled.")]
    NoAdapter,
    #[error("Device \"{0}\" is no longer known, scan again")]
    UnknownDevice(String),
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    #[error("Not subscribed to {0}")]
    NotSubscribed(Uuid),
    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Connection: Connection;

    /// Looks for nearby peripherals for `window`, or until `cancel_token` fires.
    /// May return an empty list. The underlying scan is stopped either way.
    async fn discover(
        &self,
        window: Duration,
        cancel_token: &CancellationToken,
    ) -> Result<Vec<DeviceHandle>, TransportError>;

    /// Connects within `timeout`, failing with [`TransportError::Timeout`] otherwise.
    async fn connect(
        &self,
        device: &DeviceHandle,
        timeout: Duration,
    ) -> Result<Self::Connection, TransportError>;
}

#[async_trait]
pub trait Connection: Send + 'static {
    /// Finds a characteristic by its standard description, e.g. [`HEART_RATE_MEASUREMENT`].
    fn find_characteristic(&self, description: &str) -> Option<CharacteristicHandle>;

    async fn subscribe(
        &mut self,
        characteristic: &CharacteristicHandle,
    ) -> Result<NotificationStream, TransportError>;

    async fn unsubscribe(
        &mut self,
        characteristic: &CharacteristicHandle,
    ) -> Result<(), TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Waits out a scan window. Returns `false` if it was cut short.
pub async fn scan_window(window: Duration, cancel_token: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(window) => true,
        _ = cancel_token.cancelled() => false,
    }
}

/// Maps standard characteristic descriptions to their assigned numbers,
/// since BLE stacks hand us UUIDs rather than descriptions.
pub fn characteristic_uuid(description: &str) -> Option<Uuid> {
    match description {
        HEART_RATE_MEASUREMENT => Some(HEART_RATE_MEASUREMENT_CHARACTERISTIC_UUID),
        _ => None,
    }
}
