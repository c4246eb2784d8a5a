use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::auth::TokenManager;
use crate::error::{Error, Result};
use crate::ratelimit::{DEFAULT_RESET_JUMP_THRESHOLD, RateLimitTracker};
use crate::store::DataStore;
use crate::types::*;

pub const TADO_API_BASE: &str = "https://my.tado.com/api/v2";
pub const TADO_AUTH_BASE: &str = "https://login.tado.com/oauth2";
pub const DEFAULT_CLIENT_ID: &str = "1bb50063-6b0c-4d11-bd99-387f4a91cc46";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub struct TadoBridgeBuilder {
    data_dir: PathBuf,
    api_base: String,
    auth_base: String,
    client_id: String,
    timeout: Duration,
    reset_jump_threshold: u32,
}

impl TadoBridgeBuilder {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            api_base: TADO_API_BASE.to_string(),
            auth_base: TADO_AUTH_BASE.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            timeout: REQUEST_TIMEOUT,
            reset_jump_threshold: DEFAULT_RESET_JUMP_THRESHOLD,
        }
    }

    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    pub fn auth_base(mut self, base: impl Into<String>) -> Self {
        self.auth_base = base.into();
        self
    }

    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = id.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Tune the heuristic reset detection in the rate-limit tracker.
    pub fn reset_jump_threshold(mut self, threshold: u32) -> Self {
        self.reset_jump_threshold = threshold;
        self
    }

    pub fn build(self) -> TadoBridge {
        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .expect("failed to build HTTP client");

        let store = Arc::new(DataStore::new(self.data_dir));
        let auth = TokenManager::new(
            http.clone(),
            self.auth_base,
            self.client_id,
            Arc::clone(&store),
        );

        TadoBridge {
            http,
            api_base: self.api_base,
            store,
            auth,
            ratelimit: RateLimitTracker::new(self.reset_jump_threshold),
        }
    }
}

/// One bridge instance per home session, constructed explicitly and passed
/// to consumers; `PollScheduler::shutdown` tears down the in-memory token
/// state. There is no global client cache.
pub struct TadoBridge {
    http: reqwest::Client,
    api_base: String,
    store: Arc<DataStore>,
    auth: TokenManager,
    ratelimit: RateLimitTracker,
}

impl TadoBridge {
    pub fn builder(data_dir: impl Into<PathBuf>) -> TadoBridgeBuilder {
        TadoBridgeBuilder::new(data_dir)
    }

    pub fn store(&self) -> &DataStore {
        &self.store
    }

    pub fn auth(&self) -> &TokenManager {
        &self.auth
    }

    pub fn ratelimit(&self) -> &RateLimitTracker {
        &self.ratelimit
    }

    /// The stable home id, resolved via `/me` on first use and persisted.
    pub async fn home_id(&self) -> Result<String> {
        let mut config = self.store.load_config();
        if let Some(id) = config.home_id {
            return Ok(id);
        }

        let me = self.me().await?;
        let Some(home) = me.homes.first() else {
            return Err(Error::NotConfigured("no homes on this account"));
        };
        if me.homes.len() > 1 {
            warn!(count = me.homes.len(), "multiple homes on account, using the first");
        }

        let id = home.id.to_string();
        info!(
            home_id = %id,
            home_name = home.name.as_deref().unwrap_or("unknown"),
            "home resolved"
        );
        config.home_id = Some(id.clone());
        self.store.save_config(&config)?;
        Ok(id)
    }

    pub async fn me(&self) -> Result<Me> {
        let resp = self
            .request(Method::GET, format!("{}/me", self.api_base), None)
            .await?;
        Ok(resp.json().await?)
    }

    // -- Sync fetches --

    pub async fn zone_states(&self) -> Result<ZoneStates> {
        self.home_get("zoneStates").await
    }

    pub async fn weather(&self) -> Result<Weather> {
        self.home_get("weather").await
    }

    pub async fn zones(&self) -> Result<Vec<ZoneInfo>> {
        self.home_get("zones").await
    }

    pub async fn mobile_devices(&self) -> Result<Vec<MobileDevice>> {
        self.home_get("mobileDevices").await
    }

    // -- Commands --

    /// Override a zone's schedule with a manual setting.
    pub async fn set_zone_overlay(
        &self,
        zone_id: &str,
        setting: ZoneSetting,
        termination: Termination,
    ) -> Result<()> {
        let url = self.zone_url(zone_id, "overlay").await?;
        let payload = json!({ "setting": setting, "termination": termination });
        self.request(Method::PUT, url, Some(payload)).await?;
        info!(zone = zone_id, "zone overlay set");
        Ok(())
    }

    /// Remove a zone's overlay, resuming the schedule. Deleting an overlay
    /// that is not there counts as success, so resuming twice is harmless.
    pub async fn delete_zone_overlay(&self, zone_id: &str) -> Result<()> {
        let url = self.zone_url(zone_id, "overlay").await?;
        match self.request(Method::DELETE, url, None).await {
            Ok(_) => {
                info!(zone = zone_id, "zone overlay deleted, schedule resumed");
                Ok(())
            }
            Err(Error::Http { status: 404, .. }) => {
                debug!(zone = zone_id, "no overlay to delete");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn temperature_offset(&self, serial: &str) -> Result<Temperature> {
        let url = format!("{}/devices/{}/temperatureOffset", self.api_base, serial);
        let resp = self.request(Method::GET, url, None).await?;
        Ok(resp.json().await?)
    }

    pub async fn set_temperature_offset(&self, serial: &str, celsius: f64) -> Result<()> {
        let url = format!("{}/devices/{}/temperatureOffset", self.api_base, serial);
        self.request(Method::PUT, url, Some(json!({ "celsius": celsius })))
            .await?;
        info!(device = serial, offset = celsius, "temperature offset set");
        Ok(())
    }

    pub async fn set_presence_lock(&self, presence: Presence) -> Result<()> {
        let url = self.home_url("presenceLock").await?;
        self.request(Method::PUT, url, Some(json!({ "homePresence": presence })))
            .await?;
        info!(?presence, "presence lock set");
        Ok(())
    }

    pub async fn set_away_configuration(&self, zone_id: &str, mode: AwayMode) -> Result<()> {
        let url = self.zone_url(zone_id, "schedule/awayConfiguration").await?;
        let payload = match mode {
            AwayMode::Auto { comfort_level } => json!({
                "type": "HEATING",
                "autoAdjust": true,
                "comfortLevel": comfort_level,
                "setting": { "type": "HEATING", "power": "OFF" }
            }),
            AwayMode::Manual { celsius } => json!({
                "type": "HEATING",
                "autoAdjust": false,
                "setting": {
                    "type": "HEATING",
                    "power": "ON",
                    "temperature": { "celsius": celsius }
                }
            }),
            AwayMode::Off => json!({
                "type": "HEATING",
                "autoAdjust": false,
                "setting": { "type": "HEATING", "power": "OFF" }
            }),
        };
        self.request(Method::PUT, url, Some(payload)).await?;
        info!(zone = zone_id, ?mode, "away configuration set");
        Ok(())
    }

    pub async fn set_child_lock(&self, serial: &str, enabled: bool) -> Result<()> {
        let url = format!("{}/devices/{}/childLock", self.api_base, serial);
        self.request(Method::PUT, url, Some(json!({ "childLockEnabled": enabled })))
            .await?;
        info!(device = serial, enabled, "child lock set");
        Ok(())
    }

    pub async fn set_early_start(&self, zone_id: &str, enabled: bool) -> Result<()> {
        let url = self.zone_url(zone_id, "earlyStart").await?;
        self.request(Method::PUT, url, Some(json!({ "enabled": enabled })))
            .await?;
        info!(zone = zone_id, enabled, "early start set");
        Ok(())
    }

    /// Make a device flash its LED so it can be located.
    pub async fn identify_device(&self, serial: &str) -> Result<()> {
        let url = format!("{}/devices/{}/identify", self.api_base, serial);
        self.request(Method::POST, url, None).await?;
        info!(device = serial, "identify command sent");
        Ok(())
    }

    /// Report an energy meter reading; `date` defaults to today.
    pub async fn add_meter_reading(&self, reading: i64, date: Option<NaiveDate>) -> Result<()> {
        let url = self.home_url("meterReadings").await?;
        let date = date.unwrap_or_else(|| Local::now().date_naive());
        let payload = json!({
            "date": date.format("%Y-%m-%d").to_string(),
            "reading": reading,
        });
        self.request(Method::POST, url, Some(payload)).await?;
        info!(reading, %date, "meter reading added");
        Ok(())
    }

    // -- Helpers --

    async fn home_url(&self, endpoint: &str) -> Result<String> {
        let home_id = self.home_id().await?;
        Ok(format!("{}/homes/{}/{}", self.api_base, home_id, endpoint))
    }

    async fn zone_url(&self, zone_id: &str, endpoint: &str) -> Result<String> {
        let home_id = self.home_id().await?;
        Ok(format!(
            "{}/homes/{}/zones/{}/{}",
            self.api_base, home_id, zone_id, endpoint
        ))
    }

    async fn home_get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let url = self.home_url(endpoint).await?;
        let resp = self.request(Method::GET, url, None).await?;
        Ok(resp.json().await?)
    }

    /// Single choke point for authenticated vendor calls: bearer token from
    /// the token manager, rate-limit headers recorded on every response, 401
    /// invalidates the token cache eagerly, 429 aborts with `RateLimited`.
    async fn request(
        &self,
        method: Method,
        url: String,
        body: Option<Value>,
    ) -> Result<reqwest::Response> {
        let token = self.auth.get_access_token().await?;
        let mut req = self.http.request(method, &url).bearer_auth(&token);
        if let Some(body) = body {
            req = req.json(&body);
        }

        let resp = req.send().await?;
        self.ratelimit.record(resp.headers());

        let status = resp.status().as_u16();
        match status {
            200..=299 => Ok(resp),
            401 => {
                warn!(url = %url, "401 from vendor API, invalidating cached token");
                self.auth.invalidate().await;
                Err(Error::Http {
                    status,
                    message: resp.text().await.unwrap_or_default(),
                })
            }
            429 => {
                warn!(url = %url, "rate limit exceeded");
                Err(Error::RateLimited)
            }
            _ => Err(Error::Http {
                status,
                message: resp.text().await.unwrap_or_default(),
            }),
        }
    }
}
