use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, File as ConfigFile};
use serde_derive::{Deserialize, Serialize};
use tracing_subscriber::filter::LevelFilter;

use crate::errors::AppError;

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct MiscSettings {
    log_level: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct BLESettings {
    pub connect_timeout_secs: u64,
    pub scan_duration_secs: u64,
    // Hide devices that don't advertise the Heart Rate service
    pub only_heart_rate_devices: bool,
    pub saved_address: String,
    pub saved_name: String,
}

impl BLESettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }

    pub fn scan_duration(&self) -> Duration {
        Duration::from_secs(self.scan_duration_secs.max(1))
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct HttpSettings {
    pub enabled: bool,
    pub host_ip: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct SnapshotSettings {
    pub enabled: bool,
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct DummySettings {
    pub low_bpm: u16,
    pub high_bpm: u16,
    pub bpm_speed: f32,
    // 0 never disconnects
    pub loops_before_dc: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct Settings {
    pub misc: MiscSettings,
    pub ble: BLESettings,
    pub http: HttpSettings,
    pub snapshot: SnapshotSettings,
    pub dummy: DummySettings,
}

impl Settings {
    pub fn load(config_path: &Path, config_required: bool) -> Result<Self, ConfigError> {
        let default_log_level = if cfg!(debug_assertions) {
            "debug"
        } else {
            "info"
        };

        let s = Config::builder()
            .add_source(ConfigFile::from(config_path).required(config_required))
            .set_default("misc.log_level", default_log_level)?
            .set_default("ble.connect_timeout_secs", 10)?
            .set_default("ble.scan_duration_secs", 5)?
            .set_default("ble.only_heart_rate_devices", false)?
            .set_default("ble.saved_address", "")?
            .set_default("ble.saved_name", "")?
            .set_default("http.enabled", true)?
            .set_default("http.host_ip", "127.0.0.1")?
            .set_default("http.port", 3030)?
            .set_default("snapshot.enabled", false)?
            .set_default("snapshot.path", "heartline_snapshot.bin")?
            .set_default("dummy.low_bpm", 50)?
            .set_default("dummy.high_bpm", 120)?
            .set_default("dummy.bpm_speed", 1.5)?
            .set_default("dummy.loops_before_dc", 0)?
            .build()?;

        s.try_deserialize()
    }

    pub fn save(&self, config_path: &Path) -> Result<(), AppError> {
        let toml_string = toml::to_string(self)?;

        let mut file = File::create(config_path).map_err(|source| AppError::CreateFile {
            path: config_path.to_path_buf(),
            source,
        })?;
        file.write_all(toml_string.as_bytes())?;

        Ok(())
    }

    pub fn get_log_level(&self) -> LevelFilter {
        match self.misc.log_level.to_lowercase().as_str() {
            "off" => LevelFilter::OFF,
            "error" => LevelFilter::ERROR,
            "warn" => LevelFilter::WARN,
            "info" => LevelFilter::INFO,
            "debug" => LevelFilter::DEBUG,
            "trace" => LevelFilter::TRACE,
            _ => LevelFilter::INFO,
        }
    }

    pub fn has_saved_device(&self) -> bool {
        !self.ble.saved_address.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("missing.toml"), false).unwrap();
        assert_eq!(settings.ble.connect_timeout(), Duration::from_secs(10));
        assert_eq!(settings.ble.scan_duration(), Duration::from_secs(5));
        assert!(settings.http.enabled);
        assert_eq!(settings.http.host_ip, "127.0.0.1");
        assert_eq!(settings.http.port, 3030);
        assert!(!settings.snapshot.enabled);
        assert_eq!(settings.dummy.high_bpm, 120);
        assert!(!settings.has_saved_device());
    }

    #[test]
    fn required_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Settings::load(&dir.path().join("missing.toml"), true).is_err());
    }

    #[test]
    fn saved_settings_load_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("heartline.toml");
        let mut settings = Settings::load(&path, false).unwrap();
        settings.ble.saved_address = "AA:BB:CC:DD:EE:FF".into();
        settings.http.port = 4040;
        settings.save(&path).unwrap();

        let reloaded = Settings::load(&path, true).unwrap();
        assert_eq!(reloaded, settings);
        assert!(reloaded.has_saved_device());
    }

    #[test]
    fn unknown_log_level_falls_back_to_info() {
        let settings = Settings {
            misc: MiscSettings {
                log_level: "LOUD".into(),
            },
            ..Default::default()
        };
        assert_eq!(settings.get_log_level(), LevelFilter::INFO);
    }
}
