//! Wall-clock timestamps and the frame-rate ticker.

use std::time::{SystemTime, UNIX_EPOCH};

use tokio::time::{Duration, Instant, Interval, MissedTickBehavior};

/// Microseconds since the Unix epoch.
pub fn timestamp_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Periodic timer firing once per frame interval.
///
/// Unlike a bare [`Interval`], a tick reports how many frame intervals have
/// expired since the previous tick, so a stalled loop can skip the raw
/// frames it missed instead of falling behind.
#[derive(Debug)]
pub struct FrameTicker {
    interval: Interval,
    period: Duration,

    /// Deadline of the next expiration not yet reported.
    due: Instant,
}

impl FrameTicker {
    /// Creates a ticker firing every `1 / frame_rate` seconds, starting one
    /// period from now.
    pub fn new(frame_rate: u16) -> Self {
        let period = Duration::from_nanos(1_000_000_000 / u64::from(frame_rate.max(1)));
        let start = Instant::now() + period;
        let mut interval = tokio::time::interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        Self {
            interval,
            period,
            due: start,
        }
    }

    /// Waits for the next expiration and returns the expiration count,
    /// always at least 1.
    pub async fn tick(&mut self) -> u32 {
        self.interval.tick().await;

        let now = Instant::now();
        let mut expirations = 0u32;
        while self.due <= now {
            expirations += 1;
            self.due += self.period;
        }
        expirations.max(1)
    }
}
