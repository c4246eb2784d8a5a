use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::store::DataStore;

/// Upper bound on how long a fetched access token is cached. Vendor tokens
/// are advertised at ~10 minutes; caching for at most 5 keeps a healthy
/// margin even if the advertised lifetime is optimistic.
const TOKEN_CACHE_CAP: Duration = Duration::from_secs(300);

/// Clock-skew buffer subtracted from the expiry at validity checks.
const EXPIRY_SKEW: Duration = Duration::from_secs(10);

const DEVICE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";
const DEVICE_SCOPE: &str = "home.user offline_access";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self, now: Instant) -> bool {
        now + EXPIRY_SKEW < self.expires_at
    }

    fn from_response(token: &TokenResponse) -> Self {
        let lifetime = token
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(TOKEN_CACHE_CAP)
            .min(TOKEN_CACHE_CAP);
        Self {
            access_token: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        }
    }
}

/// Owns the OAuth access-token lifecycle: short-lived in-memory cache,
/// refresh-token rotation, and invalidation on authorization failure.
///
/// The cache mutex is held across the whole check-then-refresh sequence, so
/// any number of concurrent callers arriving with an expired token produce
/// exactly one refresh request; the rest wait and reuse its result. Refresh
/// quota is limited and token reuse can invalidate the rotated refresh
/// token, so redundant refreshes are not merely wasteful.
pub struct TokenManager {
    http: reqwest::Client,
    auth_base: String,
    client_id: String,
    store: Arc<DataStore>,
    cache: Mutex<Option<CachedToken>>,
}

impl TokenManager {
    pub(crate) fn new(
        http: reqwest::Client,
        auth_base: String,
        client_id: String,
        store: Arc<DataStore>,
    ) -> Self {
        Self {
            http,
            auth_base,
            client_id,
            store,
            cache: Mutex::new(None),
        }
    }

    /// Get a valid access token, refreshing if the cached one is expired.
    ///
    /// `Err(Unauthenticated)` means no usable refresh token is stored and
    /// the device-authorization flow has to be run again. Transient refresh
    /// failures surface as `Http`/`Transport` and leave credentials intact.
    pub async fn get_access_token(&self) -> Result<String> {
        let mut cache = self.cache.lock().await;
        if let Some(token) = cache.as_ref()
            && token.is_valid(Instant::now())
        {
            return Ok(token.access_token.clone());
        }

        let token = self.refresh().await?;
        let access_token = token.access_token.clone();
        *cache = Some(token);
        Ok(access_token)
    }

    /// Drop the cached access token. Called on 401 responses and at
    /// shutdown so no stale credential survives a reload.
    pub async fn invalidate(&self) {
        *self.cache.lock().await = None;
    }

    async fn refresh(&self) -> Result<CachedToken> {
        let mut config = self.store.load_config();
        let Some(refresh_token) = config.refresh_token.clone() else {
            warn!("no refresh token stored; device authorization required");
            return Err(Error::Unauthenticated);
        };

        debug!("refreshing access token");
        let resp = self
            .http
            .post(format!("{}/token", self.auth_base))
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            if body.contains("invalid_grant") {
                error!("refresh token rejected (invalid_grant); re-authorization required");
                config.refresh_token = None;
                self.store.save_config(&config)?;
                return Err(Error::Unauthenticated);
            }
            warn!(status = status.as_u16(), "token refresh failed");
            return Err(Error::Http {
                status: status.as_u16(),
                message: body,
            });
        }

        let token: TokenResponse = resp.json().await?;
        if let Some(new_refresh) = &token.refresh_token
            && *new_refresh != refresh_token
        {
            // Losing a rotated refresh token locks the user out permanently;
            // persist it before handing the access token to anyone.
            config.refresh_token = Some(new_refresh.clone());
            self.store.save_config(&config)?;
            debug!("refresh token rotated and saved");
        }

        debug!("access token refreshed");
        Ok(CachedToken::from_response(&token))
    }

    /// Start the device-authorization flow: ask the vendor for a device/user
    /// code pair the user completes in a browser.
    pub async fn request_device_code(&self) -> Result<DeviceAuthorization> {
        let resp = self
            .http
            .post(format!("{}/device_authorize", self.auth_base))
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("scope", DEVICE_SCOPE),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                message: resp.text().await.unwrap_or_default(),
            });
        }
        Ok(resp.json().await?)
    }

    /// Poll the token endpoint until the user approves the device code, then
    /// persist the granted refresh token. Honors the advertised interval,
    /// backs off on `slow_down`, gives up when the code expires.
    pub async fn wait_for_authorization(&self, auth: &DeviceAuthorization) -> Result<()> {
        let deadline = Instant::now() + Duration::from_secs(auth.expires_in);
        let mut interval = Duration::from_secs(auth.interval.max(1));

        loop {
            tokio::time::sleep(interval).await;
            if Instant::now() >= deadline {
                warn!("device authorization timed out");
                return Err(Error::Unauthenticated);
            }

            let resp = self
                .http
                .post(format!("{}/token", self.auth_base))
                .form(&[
                    ("client_id", self.client_id.as_str()),
                    ("grant_type", DEVICE_GRANT_TYPE),
                    ("device_code", auth.device_code.as_str()),
                ])
                .send()
                .await?;

            let status = resp.status();
            if status.is_success() {
                let token: TokenResponse = resp.json().await?;
                let Some(refresh_token) = token.refresh_token.clone() else {
                    return Err(Error::Http {
                        status: status.as_u16(),
                        message: "no refresh token in device grant response".into(),
                    });
                };

                let mut config = self.store.load_config();
                config.refresh_token = Some(refresh_token);
                self.store.save_config(&config)?;
                *self.cache.lock().await = Some(CachedToken::from_response(&token));
                info!("device authorization complete");
                return Ok(());
            }

            let body = resp.text().await.unwrap_or_default();
            if body.contains("authorization_pending") {
                debug!("authorization pending");
            } else if body.contains("slow_down") {
                interval += Duration::from_secs(5);
                debug!(interval_secs = interval.as_secs(), "slowing device poll");
            } else {
                return Err(Error::Http {
                    status: status.as_u16(),
                    message: body,
                });
            }
        }
    }
}

/// Pending device-authorization grant, as returned by the vendor.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceAuthorization {
    pub device_code: String,
    pub user_code: String,
    #[serde(default)]
    pub verification_uri: Option<String>,
    #[serde(default)]
    pub verification_uri_complete: Option<String>,
    #[serde(default = "default_poll_interval")]
    pub interval: u64,
    #[serde(default = "default_code_expiry")]
    pub expires_in: u64,
}

fn default_poll_interval() -> u64 {
    5
}

fn default_code_expiry() -> u64 {
    300
}
