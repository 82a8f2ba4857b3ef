//! Bill-analysis status tracker.
//!
//! Combines the latest stored analysis, insert notifications, and a delayed
//! fallback poll into one [`TrackerView`](legistrack_core::TrackerView).

mod config;
mod guard;
mod tracker;

pub use config::{MIN_POLL_INTERVAL, TrackerConfig};
pub use guard::TrackerGuard;
pub use tracker::{RequestOutcome, StatusTracker};
