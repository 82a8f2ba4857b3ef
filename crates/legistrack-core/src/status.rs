//! Analysis status derivation.
//!
//! The tracker never assigns a [`TrackerState`] directly. It keeps three
//! inputs (the latest record, the bill's last activity, and an [`Activity`]
//! marker for the trigger request) and re-runs [`derive_state`] whenever
//! any of them changes.
//!
//! # Staleness
//!
//! Staleness is decided at calendar-day granularity in UTC: a record is
//! stale only if the day it was created is strictly before the day of the
//! bill's last activity. A record created at 00:05 on the same day as an
//! amendment recorded at 23:50 is still current.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::AnalysisRecord;

/// Derived status of a bill's analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrackerState {
    /// No analysis exists for the bill.
    #[default]
    None,
    /// Latest analysis is on or after the bill's last-activity day.
    Current,
    /// Latest analysis predates the bill's last-activity day.
    Stale,
    /// A trigger request is outstanding.
    Running,
    /// The outstanding request timed out.
    Error,
}

impl TrackerState {
    pub fn as_str(self) -> &'static str {
        match self {
            TrackerState::None => "NONE",
            TrackerState::Current => "CURRENT",
            TrackerState::Stale => "STALE",
            TrackerState::Running => "RUNNING",
            TrackerState::Error => "ERROR",
        }
    }

    /// States in which a new trigger request is suppressed.
    pub fn blocks_request(self) -> bool {
        matches!(self, TrackerState::Running | TrackerState::Current)
    }
}

impl fmt::Display for TrackerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-flight marker for the trigger request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Activity {
    #[default]
    Idle,
    /// Request sent, waiting for the endpoint or for the record to land.
    Running,
    /// Endpoint answered that an up-to-date analysis already exists.
    Confirmed,
    /// Request was queued but no record arrived before the deadline.
    TimedOut,
}

impl Activity {
    /// Activity to restore when the trigger call itself fails.
    ///
    /// `TimedOut` is only produced by the poll deadline, never by a failed
    /// dispatch, so it falls back to `Idle`.
    pub fn after_dispatch_failure(self) -> Self {
        match self {
            Activity::TimedOut | Activity::Running => Activity::Idle,
            other => other,
        }
    }
}

/// True if `record` was created on an earlier UTC day than `last_activity`.
pub fn is_stale(record: &AnalysisRecord, last_activity: Option<DateTime<Utc>>) -> bool {
    match last_activity {
        Some(activity) => record.created_at.date_naive() < activity.date_naive(),
        None => false,
    }
}

/// Project the tracker inputs onto a single [`TrackerState`].
pub fn derive_state(
    record: Option<&AnalysisRecord>,
    last_activity: Option<DateTime<Utc>>,
    activity: Activity,
) -> TrackerState {
    match activity {
        Activity::Running => TrackerState::Running,
        Activity::TimedOut => TrackerState::Error,
        Activity::Confirmed => TrackerState::Current,
        Activity::Idle => match record {
            None => TrackerState::None,
            Some(r) if is_stale(r, last_activity) => TrackerState::Stale,
            Some(_) => TrackerState::Current,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_timestamp;

    fn record_at(created_at: &str) -> AnalysisRecord {
        AnalysisRecord {
            id: "a1".into(),
            subject_id: "s-1021".into(),
            created_at: parse_timestamp(created_at).unwrap(),
            content: String::new(),
            tags: vec![],
        }
    }

    fn ts(s: &str) -> Option<DateTime<Utc>> {
        Some(parse_timestamp(s).unwrap())
    }

    #[test]
    fn no_record_is_none() {
        assert_eq!(derive_state(None, ts("2025-07-10"), Activity::Idle), TrackerState::None);
        assert_eq!(derive_state(None, None, Activity::Idle), TrackerState::None);
    }

    #[test]
    fn older_day_is_stale() {
        let rec = record_at("2025-07-05T12:00:00Z");
        assert_eq!(
            derive_state(Some(&rec), ts("2025-07-10"), Activity::Idle),
            TrackerState::Stale
        );
    }

    #[test]
    fn same_day_is_current_regardless_of_time() {
        let rec = record_at("2025-07-10T00:05:00Z");
        assert_eq!(
            derive_state(Some(&rec), ts("2025-07-10T23:50:00Z"), Activity::Idle),
            TrackerState::Current
        );
    }

    #[test]
    fn later_day_is_current() {
        let rec = record_at("2025-07-11T08:00:00Z");
        assert_eq!(
            derive_state(Some(&rec), ts("2025-07-10T23:59:59Z"), Activity::Idle),
            TrackerState::Current
        );
    }

    #[test]
    fn midnight_boundary_uses_utc_days() {
        let rec = record_at("2025-07-09T23:59:59Z");
        assert!(is_stale(&rec, ts("2025-07-10T00:00:00Z")));
        // 2025-07-10T01:00+02:00 is still 2025-07-09 in UTC.
        assert!(!is_stale(&rec, ts("2025-07-10T01:00:00+02:00")));
    }

    #[test]
    fn missing_activity_is_never_stale() {
        let rec = record_at("2001-01-01T00:00:00Z");
        assert_eq!(derive_state(Some(&rec), None, Activity::Idle), TrackerState::Current);
    }

    #[test]
    fn activity_overrides_data() {
        let rec = record_at("2025-07-05T12:00:00Z");
        let activity = ts("2025-07-10");
        assert_eq!(derive_state(Some(&rec), activity, Activity::Running), TrackerState::Running);
        assert_eq!(derive_state(None, activity, Activity::TimedOut), TrackerState::Error);
        assert_eq!(derive_state(Some(&rec), activity, Activity::Confirmed), TrackerState::Current);
    }

    #[test]
    fn dispatch_failure_never_leaves_error() {
        assert_eq!(Activity::TimedOut.after_dispatch_failure(), Activity::Idle);
        assert_eq!(Activity::Idle.after_dispatch_failure(), Activity::Idle);
    }

    #[test]
    fn request_guard_states() {
        assert!(TrackerState::Running.blocks_request());
        assert!(TrackerState::Current.blocks_request());
        assert!(!TrackerState::Stale.blocks_request());
        assert!(!TrackerState::None.blocks_request());
        assert!(!TrackerState::Error.blocks_request());
    }
}
