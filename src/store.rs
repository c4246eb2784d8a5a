use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::ratelimit::RateLimitSnapshot;
use crate::types::{BridgeConfig, MobileDevice, Weather, ZoneInfo, ZoneStates};

pub const CONFIG_FILE: &str = "config.json";
pub const ZONES_FILE: &str = "zones.json";
pub const ZONES_INFO_FILE: &str = "zones_info.json";
pub const RATELIMIT_FILE: &str = "ratelimit.json";
pub const WEATHER_FILE: &str = "weather.json";
pub const MOBILE_DEVICES_FILE: &str = "mobile_devices.json";

/// File-backed document store. One JSON document per file, replaced
/// atomically on write: the document is serialized to a temp file in the same
/// directory and renamed over the target, so a crash mid-write never leaves a
/// truncated document behind.
pub struct DataStore {
    dir: PathBuf,
}

impl DataStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn write<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer_pretty(&mut tmp, value)?;
        tmp.flush()?;
        tmp.persist(self.path(name))
            .map_err(|e| Error::Io(e.error))?;
        debug!(file = name, "document saved");
        Ok(())
    }

    /// Read a document, treating a missing or unparseable file as "no data
    /// yet". Corruption is logged but never surfaced as an error; the next
    /// sync cycle rewrites the document in full.
    pub fn read<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let raw = match fs::read_to_string(self.path(name)) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(file = name, "document not found");
                return None;
            }
            Err(e) => {
                warn!(file = name, error = %e, "failed to read document");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(file = name, error = %e, "invalid JSON in document");
                None
            }
        }
    }

    pub fn load_config(&self) -> BridgeConfig {
        self.read(CONFIG_FILE).unwrap_or_default()
    }

    pub fn save_config(&self, config: &BridgeConfig) -> Result<()> {
        self.write(CONFIG_FILE, config)
    }

    pub fn load_zone_states(&self) -> Option<ZoneStates> {
        self.read(ZONES_FILE)
    }

    pub fn load_zones_info(&self) -> Option<Vec<ZoneInfo>> {
        self.read(ZONES_INFO_FILE)
    }

    pub fn load_weather(&self) -> Option<Weather> {
        self.read(WEATHER_FILE)
    }

    pub fn load_mobile_devices(&self) -> Option<Vec<MobileDevice>> {
        self.read(MOBILE_DEVICES_FILE)
    }

    pub fn load_ratelimit(&self) -> Option<RateLimitSnapshot> {
        self.read(RATELIMIT_FILE)
    }

    pub fn save_ratelimit(&self, snapshot: &RateLimitSnapshot) -> Result<()> {
        self.write(RATELIMIT_FILE, snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> (tempfile::TempDir, DataStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = DataStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn write_then_read_round_trips() {
        let (_dir, store) = store();
        let config = BridgeConfig {
            home_id: Some("12345".into()),
            refresh_token: Some("rt-1".into()),
        };
        store.save_config(&config).unwrap();

        let loaded = store.load_config();
        assert_eq!(loaded.home_id.as_deref(), Some("12345"));
        assert_eq!(loaded.refresh_token.as_deref(), Some("rt-1"));
    }

    #[test]
    fn missing_document_reads_as_none() {
        let (_dir, store) = store();
        assert!(store.load_weather().is_none());
        assert!(store.load_zone_states().is_none());
    }

    #[test]
    fn corrupt_document_reads_as_none() {
        let (_dir, store) = store();
        fs::create_dir_all(store.dir()).unwrap();
        fs::write(store.dir().join(WEATHER_FILE), "{\"outsideTemp").unwrap();
        assert!(store.load_weather().is_none());
    }

    #[test]
    fn write_replaces_document_in_full() {
        let (_dir, store) = store();
        store
            .write(WEATHER_FILE, &json!({"outsideTemperature": {"celsius": 4.0}}))
            .unwrap();
        store
            .write(WEATHER_FILE, &json!({"solarIntensity": {"percentage": 55.0}}))
            .unwrap();

        let weather = store.load_weather().unwrap();
        assert!(weather.outside_temperature.is_none());
        assert_eq!(
            weather.solar_intensity.and_then(|s| s.percentage),
            Some(55.0)
        );
    }

    #[test]
    fn stray_temp_file_does_not_disturb_committed_document() {
        // Simulates a crash between temp-file creation and rename: the
        // committed target must stay readable.
        let (_dir, store) = store();
        let config = BridgeConfig {
            home_id: Some("12345".into()),
            refresh_token: Some("rt-1".into()),
        };
        store.save_config(&config).unwrap();

        fs::write(store.dir().join(".tmpAbC123"), "{\"home_id\": \"trunc").unwrap();

        let loaded = store.load_config();
        assert_eq!(loaded.home_id.as_deref(), Some("12345"));
        assert_eq!(loaded.refresh_token.as_deref(), Some("rt-1"));
    }
}
