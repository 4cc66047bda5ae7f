//! Clock helpers

use std::sync::OnceLock;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Room tick rate when TICK_RATE_HZ is unset
pub const DEFAULT_TICK_RATE_HZ: u32 = 60;

static STARTED_AT: OnceLock<Instant> = OnceLock::new();

/// Wall clock in milliseconds since the Unix epoch, sent in `welcome`
pub fn unix_millis() -> u64 {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    since_epoch.as_millis() as u64
}

/// Record the process start; later calls keep the first instant
pub fn init_server_time() {
    STARTED_AT.get_or_init(Instant::now);
}

/// Seconds since `init_server_time`, 0 if it was never called
pub fn uptime_secs() -> u64 {
    STARTED_AT.get().map_or(0, |started| started.elapsed().as_secs())
}
