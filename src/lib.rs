mod auth;
mod client;
mod error;
mod ratelimit;
mod scheduler;
mod store;
mod sync;
mod types;

pub use auth::{DeviceAuthorization, TokenManager};
pub use client::{DEFAULT_CLIENT_ID, TADO_API_BASE, TADO_AUTH_BASE, TadoBridge, TadoBridgeBuilder};
pub use error::{Error, Result};
pub use ratelimit::{
    DEFAULT_RESET_JUMP_THRESHOLD, RateLimitSnapshot, RateLimitStatus, RateLimitTracker,
};
pub use scheduler::{PollScheduler, compute_interval, is_daytime};
pub use store::{
    CONFIG_FILE, DataStore, MOBILE_DEVICES_FILE, RATELIMIT_FILE, WEATHER_FILE, ZONES_FILE,
    ZONES_INFO_FILE,
};
pub use sync::{SyncEngine, SyncMode};
pub use types::*;
