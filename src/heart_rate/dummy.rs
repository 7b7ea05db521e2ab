//! A simulated heart rate monitor, handy for testing overlays without a strap.
//!
//! BPM bounces between `low_bpm` and `high_bpm`. With `loops_before_dc` set, the
//! simulated device drops the connection after that many bounces.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::measurement::encode_hrm;
use super::rr_from_bpm;
use super::transport::{
    scan_window, CharacteristicHandle, Connection, DeviceHandle, NotificationStream, Transport,
    TransportError, HEART_RATE_MEASUREMENT, HEART_RATE_MEASUREMENT_CHARACTERISTIC_UUID,
    HEART_RATE_SERVICE_UUID,
};
use crate::settings::DummySettings;

pub const DUMMY_DEVICE_ID: &str = "dummy";
pub const DUMMY_DEVICE_ADDRESS: &str = "00:00:00:00:00:00";

pub fn dummy_device() -> DeviceHandle {
    DeviceHandle {
        id: DUMMY_DEVICE_ID.into(),
        name: Some("Dummy Heart Rate Monitor".into()),
        address: DUMMY_DEVICE_ADDRESS.into(),
        rssi: Some(-42),
        advertises_heart_rate: true,
    }
}

/// BPM pattern of the simulated device.
#[derive(Debug, Clone)]
pub struct Bounce {
    bpm: u16,
    low: u16,
    high: u16,
    rising: bool,
    loops: u16,
}

impl Bounce {
    pub fn new(low: u16, high: u16) -> Self {
        let high = high.max(low);
        Self {
            bpm: low.saturating_sub(1),
            low,
            high,
            rising: true,
            loops: 0,
        }
    }

    /// Next BPM value. Never leaves `low..=high` after the first step.
    pub fn step(&mut self) -> u16 {
        if self.low == self.high {
            self.bpm = self.low;
            return self.bpm;
        }
        let bound = if self.rising {
            self.bpm += 1;
            self.high
        } else {
            self.bpm -= 1;
            self.low
        };
        if self.bpm == bound {
            self.rising = !self.rising;
            self.loops = self.loops.saturating_add(1);
        }
        self.bpm
    }

    /// Number of times a bound has been reached.
    pub fn loops(&self) -> u16 {
        self.loops
    }
}

pub struct DummyTransport {
    settings: DummySettings,
}

impl DummyTransport {
    pub fn new(settings: DummySettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Transport for DummyTransport {
    type Connection = DummyConnection;

    async fn discover(
        &self,
        window: Duration,
        cancel_token: &CancellationToken,
    ) -> Result<Vec<DeviceHandle>, TransportError> {
        // Pretend to scan, but don't hold anyone up for the whole window
        scan_window(window.min(Duration::from_millis(500)), cancel_token).await;
        Ok(vec![dummy_device()])
    }

    async fn connect(
        &self,
        device: &DeviceHandle,
        _timeout: Duration,
    ) -> Result<DummyConnection, TransportError> {
        if device.id != DUMMY_DEVICE_ID {
            return Err(TransportError::UnknownDevice(device.to_string()));
        }
        info!("Connected to simulated monitor");
        Ok(DummyConnection {
            settings: self.settings.clone(),
            connected: true,
        })
    }
}

pub struct DummyConnection {
    settings: DummySettings,
    connected: bool,
}

#[async_trait]
impl Connection for DummyConnection {
    fn find_characteristic(&self, description: &str) -> Option<CharacteristicHandle> {
        (description == HEART_RATE_MEASUREMENT).then(|| CharacteristicHandle {
            uuid: HEART_RATE_MEASUREMENT_CHARACTERISTIC_UUID,
            service: HEART_RATE_SERVICE_UUID,
            description: description.to_owned(),
        })
    }

    async fn subscribe(
        &mut self,
        characteristic: &CharacteristicHandle,
    ) -> Result<NotificationStream, TransportError> {
        if !self.connected {
            return Err(TransportError::NotSubscribed(characteristic.uuid));
        }
        let speed = if self.settings.bpm_speed > 0.0 {
            self.settings.bpm_speed
        } else {
            1.0
        };
        let mut interval = tokio::time::interval(Duration::from_secs_f32(1.0 / speed));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let bounce = Bounce::new(self.settings.low_bpm, self.settings.high_bpm);
        let loops_before_dc = self.settings.loops_before_dc;

        let stream = stream::unfold((interval, bounce), move |(mut interval, mut bounce)| async move {
            interval.tick().await;
            if loops_before_dc != 0 && bounce.loops() >= loops_before_dc {
                info!("Simulating lost connection");
                return None;
            }
            let bpm = bounce.step();
            let payload = encode_hrm(bpm, &[rr_from_bpm(bpm)]);
            Some((payload, (interval, bounce)))
        });
        Ok(Box::pin(stream))
    }

    async fn unsubscribe(&mut self, _: &CharacteristicHandle) -> Result<(), TransportError> {
        debug!("Simulated monitor unsubscribed");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.connected = false;
        info!("Shutting down simulated monitor");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heart_rate::measurement::parse_hrm;
    use futures::StreamExt;

    fn settings(loops_before_dc: u16) -> DummySettings {
        DummySettings {
            low_bpm: 60,
            high_bpm: 63,
            bpm_speed: 10.0,
            loops_before_dc,
        }
    }

    #[test]
    fn bounces_between_bounds() {
        let mut bounce = Bounce::new(60, 63);
        let steps: Vec<u16> = (0..10).map(|_| bounce.step()).collect();
        assert_eq!(steps, vec![60, 61, 62, 63, 62, 61, 60, 61, 62, 63]);
        assert_eq!(bounce.loops(), 3);
    }

    #[test]
    fn flat_range_holds_steady() {
        let mut bounce = Bounce::new(80, 70);
        assert!((0..5).all(|_| bounce.step() == 80));
    }

    #[tokio::test(start_paused = true)]
    async fn notifications_decode_to_bounce() {
        let transport = DummyTransport::new(settings(0));
        let mut connection = transport
            .connect(&dummy_device(), Duration::from_secs(1))
            .await
            .unwrap();
        let characteristic = connection
            .find_characteristic(HEART_RATE_MEASUREMENT)
            .unwrap();
        let stream = connection.subscribe(&characteristic).await.unwrap();
        let bpms: Vec<u16> = stream
            .take(5)
            .map(|payload| parse_hrm(&payload).unwrap().bpm)
            .collect()
            .await;
        assert_eq!(bpms, vec![60, 61, 62, 63, 62]);
    }

    #[tokio::test(start_paused = true)]
    async fn simulated_drop_ends_stream() {
        let transport = DummyTransport::new(settings(1));
        let mut connection = transport
            .connect(&dummy_device(), Duration::from_secs(1))
            .await
            .unwrap();
        let characteristic = connection
            .find_characteristic(HEART_RATE_MEASUREMENT)
            .unwrap();
        let stream = connection.subscribe(&characteristic).await.unwrap();
        // 60..=63 reaches the upper bound once, then the device goes away
        assert_eq!(stream.count().await, 4);
    }

    #[tokio::test]
    async fn rejects_unknown_devices() {
        let transport = DummyTransport::new(settings(0));
        let stranger = DeviceHandle {
            id: "someone-else".into(),
            ..Default::default()
        };
        assert!(matches!(
            transport.connect(&stranger, Duration::from_secs(1)).await,
            Err(TransportError::UnknownDevice(_))
        ));
    }
}
