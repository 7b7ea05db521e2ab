use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::emit;
use crate::heart_rate::session::SessionError;
use crate::heart_rate::transport::{DeviceHandle, Transport};

#[derive(Debug)]
pub enum DeviceUpdate {
    Discovered(Vec<DeviceHandle>),
    Error(SessionError),
}

impl From<Vec<DeviceHandle>> for DeviceUpdate {
    fn from(devices: Vec<DeviceHandle>) -> Self {
        DeviceUpdate::Discovered(devices)
    }
}

impl From<SessionError> for DeviceUpdate {
    fn from(error: SessionError) -> Self {
        DeviceUpdate::Error(error)
    }
}

/// Runs one discovery window and reports what was found, strongest signal first.
pub async fn scan_thread<T: Transport>(
    transport: Arc<T>,
    window: Duration,
    only_heart_rate_devices: bool,
    tx: UnboundedSender<DeviceUpdate>,
    cancel_token: CancellationToken,
) {
    info!("Scanning for {}s", window.as_secs());
    // Not raced against the token, the transport has to stop its scan itself
    let result = transport.discover(window, &cancel_token).await;
    if cancel_token.is_cancelled() {
        info!("Scan cancelled");
        return;
    }
    match result {
        Ok(devices) => {
            let devices = sort_devices(devices, only_heart_rate_devices);
            debug!("Scan found {} devices", devices.len());
            emit!(tx, devices);
        }
        Err(e) => {
            error!("Scanning failure: {e}");
            emit!(tx, SessionError::ScanFailure(e));
        }
    }
}

fn sort_devices(mut devices: Vec<DeviceHandle>, only_heart_rate_devices: bool) -> Vec<DeviceHandle> {
    if only_heart_rate_devices {
        devices.retain(|d| d.advertises_heart_rate);
    }
    // Heart rate monitors first, then by signal strength
    devices.sort_by(|a, b| {
        b.advertises_heart_rate
            .cmp(&a.advertises_heart_rate)
            .then(b.rssi.unwrap_or(i16::MIN).cmp(&a.rssi.unwrap_or(i16::MIN)))
    });
    devices
}
