use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{Local, Timelike};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::sync::{SyncEngine, SyncMode};

const DAY_START_HOUR: u32 = 7;
const NIGHT_START_HOUR: u32 = 23;

/// (quota ceiling, day minutes, night minutes), ascending; first match wins.
/// Smaller quotas poll more conservatively.
const POLL_TIERS: &[(u32, u64, u64)] = &[
    (100, 30, 120),
    (1_000, 15, 60),
    (5_000, 10, 30),
    (20_000, 5, 15),
];

const DEFAULT_DAY_MINUTES: u64 = 30;
const DEFAULT_NIGHT_MINUTES: u64 = 120;

/// Zone metadata and presence data must not go stale indefinitely, whatever
/// the quick-sync cadence works out to.
const FULL_SYNC_INTERVAL: Duration = Duration::from_secs(6 * 3600);

pub fn is_daytime(hour: u32) -> bool {
    (DAY_START_HOUR..NIGHT_START_HOUR).contains(&hour)
}

/// Next poll interval for the given rate-limit ceiling and local hour.
pub fn compute_interval(limit: Option<u32>, hour: u32) -> Duration {
    let day = is_daytime(hour);
    let minutes = match limit {
        Some(limit) => {
            let (_, day_minutes, night_minutes) = POLL_TIERS
                .iter()
                .copied()
                .find(|(ceiling, _, _)| limit <= *ceiling)
                .unwrap_or(*POLL_TIERS.last().expect("tier table is non-empty"));
            if day { day_minutes } else { night_minutes }
        }
        None => {
            if day {
                DEFAULT_DAY_MINUTES
            } else {
                DEFAULT_NIGHT_MINUTES
            }
        }
    };
    Duration::from_secs(minutes * 60)
}

fn full_sync_due(last_full_sync: Option<Instant>, now: Instant) -> bool {
    match last_full_sync {
        None => true,
        Some(at) => now.duration_since(at) >= FULL_SYNC_INTERVAL,
    }
}

struct SchedulerState {
    timer: Option<JoinHandle<()>>,
    current_interval: Option<Duration>,
    last_full_sync: Option<Instant>,
}

/// Self-rescheduling poll timer. The scheduler owns the one active timer:
/// re-arming aborts the previous timer task before spawning its replacement,
/// so cycles never overlap and timers never leak.
pub struct PollScheduler {
    engine: SyncEngine,
    state: Mutex<SchedulerState>,
}

impl PollScheduler {
    pub fn new(engine: SyncEngine) -> Arc<Self> {
        Arc::new(Self {
            engine,
            state: Mutex::new(SchedulerState {
                timer: None,
                current_interval: None,
                last_full_sync: None,
            }),
        })
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    /// Run an immediate first cycle, then keep re-arming.
    pub async fn start(self: Arc<Self>) {
        self.tick().await;
    }

    /// Run one cycle (full if one is due, quick otherwise) and re-arm the
    /// timer for the next.
    pub async fn tick(self: Arc<Self>) {
        let mode = {
            let state = self.state.lock().unwrap();
            if full_sync_due(state.last_full_sync, Instant::now()) {
                SyncMode::Full
            } else {
                SyncMode::Quick
            }
        };

        let result = self.engine.run_cycle(mode).await;
        if result.is_ok() && mode == SyncMode::Full {
            self.state.lock().unwrap().last_full_sync = Some(Instant::now());
        }

        self.reschedule();
    }

    /// Compute the next interval from the cached rate-limit ceiling and the
    /// local time of day, then arm a fresh timer in place of the old one.
    pub fn reschedule(self: Arc<Self>) {
        let limit = self
            .engine
            .bridge()
            .store()
            .load_ratelimit()
            .and_then(|s| s.limit);
        let hour = Local::now().hour();
        let interval = compute_interval(limit, hour);

        let mut state = self.state.lock().unwrap();
        if state.current_interval != Some(interval) {
            info!(
                minutes = interval.as_secs() / 60,
                period = if is_daytime(hour) { "day" } else { "night" },
                "polling interval updated"
            );
            state.current_interval = Some(interval);
        }

        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        let sched = Arc::clone(&self);
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            sched.tick().await;
        }));
    }

    pub fn is_armed(&self) -> bool {
        self.state.lock().unwrap().timer.is_some()
    }

    /// Cancel the active timer and clear cached token state so nothing
    /// stale survives a reload.
    pub async fn shutdown(&self) {
        if let Some(timer) = self.state.lock().unwrap().timer.take() {
            timer.abort();
        }
        self.engine.bridge().auth().invalidate().await;
        debug!("scheduler shut down");
    }
}
