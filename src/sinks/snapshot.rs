//! Fixed-size snapshot file for overlay tools that poll a memory region.
//!
//! Layout, little-endian: `i32` BPM, then `f64` UNIX timestamp in seconds. The
//! file is padded to [`SNAPSHOT_SIZE`] and rewritten in place.

use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::errors::AppError;

pub const SNAPSHOT_SIZE: u64 = 4096;
const RECORD_SIZE: usize = 12;

pub struct SnapshotWriter {
    file: File,
    path: PathBuf,
}

impl SnapshotWriter {
    pub async fn create(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .await
            .map_err(|source| AppError::CreateFile {
                path: path.clone(),
                source,
            })?;
        file.set_len(SNAPSHOT_SIZE).await?;
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn write(&mut self, bpm: u16, timestamp: f64) -> Result<(), AppError> {
        let mut record = [0u8; RECORD_SIZE];
        record[..4].copy_from_slice(&i32::from(bpm).to_le_bytes());
        record[4..].copy_from_slice(&timestamp.to_le_bytes());
        self.file.seek(SeekFrom::Start(0)).await?;
        self.file.write_all(&record).await?;
        self.file.flush().await?;
        Ok(())
    }
}

/// Reads back the BPM and timestamp from a snapshot file.
pub async fn read_snapshot(path: impl AsRef<Path>) -> Result<(i32, f64), AppError> {
    let mut file = File::open(path).await?;
    let mut record = [0u8; RECORD_SIZE];
    file.read_exact(&mut record).await?;
    let mut bpm = [0u8; 4];
    let mut timestamp = [0u8; 8];
    bpm.copy_from_slice(&record[..4]);
    timestamp.copy_from_slice(&record[4..]);
    Ok((i32::from_le_bytes(bpm), f64::from_le_bytes(timestamp)))
}

fn unix_now() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

pub async fn snapshot_thread(
    mut writer: SnapshotWriter,
    mut bpm_rx: watch::Receiver<u16>,
    cancel_token: CancellationToken,
) {
    info!("Snapshot thread started! Writing to {}", writer.path().display());
    loop {
        tokio::select! {
            changed = bpm_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let bpm = *bpm_rx.borrow_and_update();
                if let Err(e) = writer.write(bpm, unix_now()).await {
                    error!("Failed to write snapshot: {e}");
                    break;
                }
            }
            _ = cancel_token.cancelled() => {
                // Leave the final published value behind (0 after a disconnect)
                if bpm_rx.has_changed().unwrap_or(false) {
                    let bpm = *bpm_rx.borrow_and_update();
                    if let Err(e) = writer.write(bpm, unix_now()).await {
                        error!("Failed to write final snapshot: {e}");
                    }
                }
                break;
            }
        }
    }
    info!("Shutting down Snapshot thread!");
}
