use std::time::Duration;

/// Floor for [`TrackerConfig::poll_interval`]; a zero interval would never tick.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Timing of the fallback poll that runs after a queued analysis request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Wait before the first poll. Insert notifications normally land well within this.
    pub fallback_delay: Duration,
    /// Spacing between polls once polling has started. Clamped to
    /// [`MIN_POLL_INTERVAL`].
    pub poll_interval: Duration,
    /// How long to keep polling before giving up.
    pub poll_window: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            fallback_delay: Duration::from_secs(75),
            poll_interval: Duration::from_secs(10),
            poll_window: Duration::from_secs(45),
        }
    }
}

impl TrackerConfig {
    /// Hard ceiling between the request and the timeout, never extended.
    pub fn deadline(&self) -> Duration {
        self.fallback_delay + self.poll_window
    }

    pub(crate) fn effective_poll_interval(&self) -> Duration {
        self.poll_interval.max(MIN_POLL_INTERVAL)
    }
}
