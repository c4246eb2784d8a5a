use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted credential/config document (`config.json`).
///
/// `refresh_token` rotates whenever the vendor issues a replacement and is
/// cleared only after an `invalid_grant` rejection. `home_id` is resolved
/// once via `/me` and kept for the life of the installation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub home_id: Option<String>,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Temperature {
    pub celsius: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fahrenheit: Option<f64>,
}

impl Temperature {
    pub fn celsius(celsius: f64) -> Self {
        Self {
            celsius,
            fahrenheit: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Power {
    On,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ZoneType {
    Heating,
    HotWater,
    AirConditioning,
}

/// Target setting for a zone, both as reported in zone state and as sent in
/// overlay commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneSetting {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<ZoneType>,
    pub power: Power,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<Temperature>,
}

impl ZoneSetting {
    pub fn heating(celsius: f64) -> Self {
        Self {
            kind: Some(ZoneType::Heating),
            power: Power::On,
            temperature: Some(Temperature::celsius(celsius)),
        }
    }

    pub fn off(kind: ZoneType) -> Self {
        Self {
            kind: Some(kind),
            power: Power::Off,
            temperature: None,
        }
    }
}

/// Overlay termination policy: hold until cleared, hold for a fixed time, or
/// hold until the next scheduled change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Termination {
    Manual,
    #[serde(rename_all = "camelCase")]
    Timer {
        duration_in_seconds: u32,
    },
    TadoMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverlayType {
    Manual,
    Timer,
    TadoMode,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayTermination {
    #[serde(rename = "type")]
    pub kind: Option<OverlayType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_in_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_time_in_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overlay {
    #[serde(rename = "type")]
    pub kind: Option<OverlayType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setting: Option<ZoneSetting>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination: Option<OverlayTermination>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextScheduleChange {
    pub start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setting: Option<ZoneSetting>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TemperatureReading {
    pub celsius: Option<f64>,
    pub fahrenheit: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PercentageReading {
    pub percentage: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SensorDataPoints {
    pub inside_temperature: Option<TemperatureReading>,
    pub humidity: Option<PercentageReading>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActivityDataPoints {
    pub heating_power: Option<PercentageReading>,
}

/// Latest reported state of one zone. Replaced wholesale every sync cycle;
/// the cache holds no history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ZoneState {
    pub tado_mode: Option<String>,
    pub overlay_type: Option<OverlayType>,
    pub setting: Option<ZoneSetting>,
    pub overlay: Option<Overlay>,
    pub next_schedule_change: Option<NextScheduleChange>,
    pub activity_data_points: Option<ActivityDataPoints>,
    pub sensor_data_points: Option<SensorDataPoints>,
}

/// Document shape of `zones.json`: the vendor keys zone states by zone id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneStates {
    pub zone_states: BTreeMap<String, ZoneState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatteryState {
    Normal,
    Low,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionState {
    pub value: Option<bool>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceInfo {
    pub device_type: Option<String>,
    pub short_serial_no: Option<String>,
    pub current_fw_version: Option<String>,
    pub connection_state: Option<ConnectionState>,
    pub battery_state: Option<BatteryState>,
    pub child_lock_enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EarlyStart {
    pub enabled: Option<bool>,
}

/// Zone metadata as returned by the `zones` endpoint (`zones_info.json`).
/// Slow-changing; only refreshed on full-sync cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneInfo {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub zone_type: ZoneType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub early_start: Option<EarlyStart>,
    #[serde(default)]
    pub devices: Vec<DeviceInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WeatherState {
    pub value: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Weather {
    pub outside_temperature: Option<TemperatureReading>,
    pub solar_intensity: Option<PercentageReading>,
    pub weather_state: Option<WeatherState>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MobileLocation {
    pub at_home: Option<bool>,
    pub stale: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MobileSettings {
    pub geo_tracking_enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MobileDevice {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub location: Option<MobileLocation>,
    pub settings: Option<MobileSettings>,
}

/// Manual override of automatic home/away detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Presence {
    Home,
    Away,
}

/// Behavior of a heating zone while the home is away.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AwayMode {
    /// Let the vendor pick the away temperature from a comfort level (0-100).
    Auto { comfort_level: u8 },
    /// Hold a fixed target temperature while away.
    Manual { celsius: f64 },
    /// Heating off while away.
    Off,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HomeSummary {
    pub id: i64,
    pub name: Option<String>,
}

/// Subset of the `/me` document used for home-id resolution.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Me {
    #[serde(default)]
    pub homes: Vec<HomeSummary>,
}
