use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Default upward jump in `remaining` treated as a quota-window reset.
///
/// The vendor does not report an absolute reset time on every response, so a
/// reset is inferred when the remaining budget grows by more than this
/// threshold between snapshots. Reverse-engineered from observed behavior,
/// not a documented contract; bursts of parallel requests can in principle
/// trip it, which only costs a slightly-off reset estimate.
pub const DEFAULT_RESET_JUMP_THRESHOLD: u32 = 100;

const WINDOW_SECS: i64 = 86_400;
const WARNING_PERCENTAGE: u32 = 80;

const POLICY_HEADER: &str = "ratelimit-policy";
const RATELIMIT_HEADER: &str = "ratelimit";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitStatus {
    Ok,
    Warning,
    RateLimited,
    Error,
}

/// Persisted rate-limit document (`ratelimit.json`). `last_reset_timestamp`
/// must survive restarts: until the vendor reports a reset time directly it
/// is the only anchor for the rolling-window estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitSnapshot {
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
    pub reset_seconds: Option<i64>,
    pub used: Option<u32>,
    pub percentage_used: Option<u32>,
    pub status: RateLimitStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub last_reset_timestamp: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Observed {
    limit: Option<u32>,
    remaining: Option<u32>,
    reset_seconds: Option<i64>,
}

/// Accumulates rate-limit header observations across the calls of a sync
/// cycle and turns them into persisted snapshots.
pub struct RateLimitTracker {
    observed: Mutex<Observed>,
    reset_jump_threshold: u32,
}

impl RateLimitTracker {
    pub fn new(reset_jump_threshold: u32) -> Self {
        Self {
            observed: Mutex::new(Observed::default()),
            reset_jump_threshold,
        }
    }

    /// Parse the vendor's two rate-limit headers, e.g.
    /// `ratelimit-policy: "perday";q=5000;w=86400` and
    /// `ratelimit: "perday";r=123;t=5904`. Later observations overwrite
    /// earlier ones field by field; malformed fields are skipped.
    pub fn record(&self, headers: &HeaderMap) {
        let policy = headers
            .get(POLICY_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let ratelimit = headers
            .get(RATELIMIT_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        let mut observed = self.observed.lock().unwrap();
        if let Some(limit) = parse_field(policy, "q").and_then(|v| u32::try_from(v).ok()) {
            observed.limit = Some(limit);
        }
        if let Some(remaining) = parse_field(ratelimit, "r").and_then(|v| u32::try_from(v).ok()) {
            observed.remaining = Some(remaining);
        }
        if let Some(reset) = parse_field(ratelimit, "t") {
            observed.reset_seconds = Some(reset);
        }
    }

    /// Build the snapshot for the cycle that just finished. `prev` is the
    /// previously persisted snapshot (carries `last_reset_timestamp` across
    /// restarts); `status` is the cycle outcome, upgraded to
    /// `rate_limited`/`warning` when the budget numbers say so.
    pub fn snapshot(
        &self,
        prev: Option<&RateLimitSnapshot>,
        status: RateLimitStatus,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> RateLimitSnapshot {
        let observed = *self.observed.lock().unwrap();

        let mut last_reset = prev.and_then(|p| p.last_reset_timestamp);
        if let (Some(prev_remaining), Some(remaining)) =
            (prev.and_then(|p| p.remaining), observed.remaining)
            && remaining > prev_remaining.saturating_add(self.reset_jump_threshold)
        {
            info!(
                previous = prev_remaining,
                current = remaining,
                "rate limit window reset detected"
            );
            last_reset = Some(now);
        }

        let reset_seconds = observed
            .reset_seconds
            .filter(|s| *s > 0)
            .or_else(|| estimate_reset_seconds(last_reset, now));

        let mut status = status;
        let mut used = None;
        let mut percentage_used = None;
        if let (Some(limit), Some(remaining)) = (observed.limit, observed.remaining)
            && limit > 0
        {
            let u = limit.saturating_sub(remaining);
            used = Some(u);
            let pct = ((u as f64) * 100.0 / (limit as f64)).round() as u32;
            percentage_used = Some(pct);
            if remaining == 0 {
                status = RateLimitStatus::RateLimited;
            } else if pct > WARNING_PERCENTAGE {
                status = RateLimitStatus::Warning;
            }
        }

        RateLimitSnapshot {
            limit: observed.limit,
            remaining: observed.remaining,
            reset_seconds,
            used,
            percentage_used,
            status,
            error,
            last_reset_timestamp: last_reset,
            last_updated: now,
        }
    }
}

impl Default for RateLimitTracker {
    fn default() -> Self {
        Self::new(DEFAULT_RESET_JUMP_THRESHOLD)
    }
}

/// Rolling-window fallback: the quota resets roughly 24 h after the last
/// detected reset. Wraps forward when that instant is already past.
fn estimate_reset_seconds(last_reset: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<i64> {
    let next = last_reset? + Duration::seconds(WINDOW_SECS);
    let mut secs = (next - now).num_seconds();
    if secs <= 0 {
        secs = secs.rem_euclid(WINDOW_SECS);
    }
    (secs > 0).then_some(secs)
}

fn parse_field(raw: &str, key: &str) -> Option<i64> {
    raw.split(';').find_map(|part| {
        let (k, v) = part.trim().split_once('=')?;
        if k.trim() == key {
            v.trim().parse().ok()
        } else {
            None
        }
    })
}
