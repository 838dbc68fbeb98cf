//! Round-trip-time estimation from ACK samples.

/// EWMA smoothing factor.
const ALPHA: f64 = 0.2;

/// Tracks the minimum and the exponentially weighted moving average of
/// observed round-trip times.
///
/// Both values are unset until the first ACK arrives.
#[derive(Debug, Default)]
pub struct RttEstimator {
    min_rtt_us: Option<u64>,
    ewma_rtt_us: Option<f64>,
}

impl RttEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one RTT sample in microseconds.
    pub fn add_sample(&mut self, rtt_us: u64) {
        self.min_rtt_us = Some(match self.min_rtt_us {
            Some(min) => min.min(rtt_us),
            None => rtt_us,
        });

        self.ewma_rtt_us = Some(match self.ewma_rtt_us {
            Some(ewma) => ALPHA * rtt_us as f64 + (1.0 - ALPHA) * ewma,
            None => rtt_us as f64,
        });
    }

    /// Smallest RTT observed so far.
    pub fn min_us(&self) -> Option<u64> {
        self.min_rtt_us
    }

    /// Smoothed RTT, used as the retransmission pacing interval.
    pub fn ewma_us(&self) -> Option<f64> {
        self.ewma_rtt_us
    }
}
