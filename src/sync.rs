use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::client::TadoBridge;
use crate::error::{Error, Result};
use crate::ratelimit::RateLimitStatus;
use crate::store::{MOBILE_DEVICES_FILE, WEATHER_FILE, ZONES_FILE, ZONES_INFO_FILE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Fetch only the fast-changing documents: zone states and weather.
    Quick,
    /// Additionally refresh zone metadata and mobile devices.
    Full,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Quick => "quick",
            SyncMode::Full => "full",
        }
    }
}

/// Runs one sync cycle against the vendor API and commits the results to the
/// document store. The engine is the sole writer of the cached documents.
pub struct SyncEngine {
    bridge: Arc<TadoBridge>,
}

impl SyncEngine {
    pub fn new(bridge: Arc<TadoBridge>) -> Self {
        Self { bridge }
    }

    pub fn bridge(&self) -> &Arc<TadoBridge> {
        &self.bridge
    }

    /// Run one cycle. Whatever happens to the data fetches, a rate-limit
    /// snapshot is written before returning so scheduling and status
    /// reporting never run on stale-forever data.
    pub async fn run_cycle(&self, mode: SyncMode) -> Result<()> {
        info!(mode = mode.as_str(), "starting sync cycle");
        let outcome = self.fetch_documents(mode).await;

        let (status, error) = match &outcome {
            Ok(()) => (RateLimitStatus::Ok, None),
            Err(Error::RateLimited) => {
                (RateLimitStatus::RateLimited, Some("rate_limited".to_string()))
            }
            Err(e) => (RateLimitStatus::Error, Some(e.to_string())),
        };

        let store = self.bridge.store();
        let prev = store.load_ratelimit();
        let snapshot = self
            .bridge
            .ratelimit()
            .snapshot(prev.as_ref(), status, error, Utc::now());
        if let Err(e) = store.save_ratelimit(&snapshot) {
            warn!(error = %e, "failed to save rate limit snapshot");
        }

        match &outcome {
            Ok(()) => info!(mode = mode.as_str(), "sync cycle complete"),
            Err(e) => warn!(mode = mode.as_str(), error = %e, "sync cycle failed"),
        }
        outcome
    }

    /// The vendor snapshot is authoritative: every fetched document replaces
    /// the cached one in full, immediately, so a failure later in the cycle
    /// does not throw away data already fetched. The first error aborts the
    /// remaining calls; the next scheduled cycle is the retry.
    async fn fetch_documents(&self, mode: SyncMode) -> Result<()> {
        let store = self.bridge.store();

        let zone_states = self.bridge.zone_states().await?;
        store.write(ZONES_FILE, &zone_states)?;
        debug!(zones = zone_states.zone_states.len(), "zone states saved");

        let weather = self.bridge.weather().await?;
        store.write(WEATHER_FILE, &weather)?;
        debug!("weather saved");

        if mode == SyncMode::Full {
            let zones_info = self.bridge.zones().await?;
            store.write(ZONES_INFO_FILE, &zones_info)?;
            debug!(zones = zones_info.len(), "zone metadata saved");

            let mobile_devices = self.bridge.mobile_devices().await?;
            store.write(MOBILE_DEVICES_FILE, &mobile_devices)?;
            debug!(devices = mobile_devices.len(), "mobile devices saved");
        }

        Ok(())
    }
}
