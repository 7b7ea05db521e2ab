//! Outputs for stream overlays. Every sink is a passive last-value store: the UI
//! publishes each accepted BPM, and a sink only ever serves or writes the most
//! recent one.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::errors::AppError;
use crate::settings::{HttpSettings, SnapshotSettings};

pub mod http;
pub mod snapshot;

pub trait Publisher: Send {
    fn publish(&self, bpm: u16);
}

impl Publisher for watch::Sender<u16> {
    fn publish(&self, bpm: u16) {
        // Overwrites whatever hasn't been picked up yet
        self.send_replace(bpm);
    }
}

/// The set of running sinks, all fed from one publisher.
pub struct Sinks {
    bpm_tx: watch::Sender<u16>,
    cancel_token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Sinks {
    pub fn new(cancel_token: CancellationToken) -> Self {
        let (bpm_tx, _) = watch::channel(0);
        Self {
            bpm_tx,
            cancel_token,
            tasks: Vec::new(),
        }
    }

    /// Starts whichever sinks are enabled. A sink that fails to start is
    /// reported and skipped, the others still run.
    pub async fn start(
        &mut self,
        http_settings: &HttpSettings,
        snapshot_settings: &SnapshotSettings,
    ) -> Vec<AppError> {
        let mut errors = Vec::new();
        if http_settings.enabled {
            if let Err(e) = self.start_http(http_settings) {
                error!("HTTP sink failed to start: {e}");
                errors.push(e);
            }
        }
        if snapshot_settings.enabled {
            if let Err(e) = self.start_snapshot(snapshot_settings).await {
                error!("Snapshot sink failed to start: {e}");
                errors.push(e);
            }
        }
        errors
    }

    pub fn start_http(&mut self, settings: &HttpSettings) -> Result<http::HttpSink, AppError> {
        let sink = http::HttpSink::bind(&settings.host_ip, settings.port)?;
        let handle = sink.clone();
        let bpm_rx = self.bpm_tx.subscribe();
        let cancel_token = self.cancel_token.clone();
        self.tasks.push(tokio::task::spawn_blocking(move || {
            http::http_thread(handle, bpm_rx, cancel_token)
        }));
        Ok(sink)
    }

    pub async fn start_snapshot(&mut self, settings: &SnapshotSettings) -> Result<(), AppError> {
        let writer = snapshot::SnapshotWriter::create(&settings.path).await?;
        let bpm_rx = self.bpm_tx.subscribe();
        let cancel_token = self.cancel_token.clone();
        self.tasks.push(tokio::spawn(snapshot::snapshot_thread(
            writer,
            bpm_rx,
            cancel_token,
        )));
        Ok(())
    }

    pub fn running(&self) -> usize {
        self.tasks.iter().filter(|t| !t.is_finished()).count()
    }

    pub fn latest(&self) -> u16 {
        *self.bpm_tx.borrow()
    }

    pub async fn join(self) {
        self.cancel_token.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                error!("Sink task failed: {e}");
            }
        }
        info!("Sinks shut down");
    }
}

impl Publisher for Sinks {
    fn publish(&self, bpm: u16) {
        self.bpm_tx.publish(bpm);
    }
}
