//! Shared analysis types exchanged with the hosted database and trigger endpoint.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A generated analysis of a tracked bill.
///
/// Rows live in the hosted `bill_analyses` table and are only ever inserted
/// by the analysis backend. The `bill_id` column is accepted as an alias for
/// `subject_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: String,
    #[serde(alias = "bill_id")]
    pub subject_id: String,
    pub created_at: DateTime<Utc>,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl AnalysisRecord {
    /// True if `self` was created strictly after `held`, or nothing is held yet.
    pub fn supersedes(&self, held: Option<&AnalysisRecord>) -> bool {
        held.is_none_or(|h| self.created_at > h.created_at)
    }
}

/// The tracked legislative item an analysis is about.
#[derive(Debug, Clone, PartialEq)]
pub struct Subject {
    pub id: String,
    /// Last external activity on the bill (votes, amendments, status changes).
    pub last_activity: Option<DateTime<Utc>>,
}

impl Subject {
    pub fn new(id: impl Into<String>, last_activity: Option<DateTime<Utc>>) -> Self {
        Self {
            id: id.into(),
            last_activity,
        }
    }
}

/// Successful response of the analysis trigger endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TriggerOutcome {
    /// An analysis newer than the bill's last activity already exists.
    Current,
    /// Analysis work has been enqueued; the record arrives later.
    Queued,
}

/// Parse a bill activity timestamp.
///
/// Accepts RFC 3339 (`2025-07-10T14:00:00Z`) or a bare date (`2025-07-10`),
/// the latter taken as midnight UTC.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let s = s.trim();
    match DateTime::parse_from_rfc3339(s) {
        Ok(ts) => Ok(ts.with_timezone(&Utc)),
        Err(rfc_err) => match NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            Ok(date) => Ok(date.and_time(chrono::NaiveTime::MIN).and_utc()),
            Err(_) => Err(rfc_err),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(id: &str, created_at: &str) -> AnalysisRecord {
        AnalysisRecord {
            id: id.into(),
            subject_id: "hr-1234".into(),
            created_at: parse_timestamp(created_at).unwrap(),
            content: "Summary of provisions".into(),
            tags: vec![],
        }
    }

    #[test]
    fn record_from_hosted_row() {
        let json = r#"{
            "id": "7f3c",
            "bill_id": "hr-1234",
            "created_at": "2025-07-05T09:30:00.123456+00:00",
            "content": "The bill amends the Clean Air Act...",
            "tags": ["environment", "energy"]
        }"#;
        let parsed: AnalysisRecord = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.subject_id, "hr-1234");
        assert_eq!(parsed.tags, vec!["environment", "energy"]);
        assert_eq!(
            parsed.created_at.date_naive(),
            NaiveDate::from_ymd_opt(2025, 7, 5).unwrap()
        );
    }

    #[test]
    fn record_without_tags() {
        let json = r#"{
            "id": "7f3c",
            "subject_id": "hr-1234",
            "created_at": "2025-07-05T09:30:00Z",
            "content": ""
        }"#;
        let parsed: AnalysisRecord = serde_json::from_str(json).unwrap();
        assert!(parsed.tags.is_empty());
    }

    #[test]
    fn trigger_outcome_from_status() {
        let current: TriggerOutcome = serde_json::from_str(r#"{"status":"current"}"#).unwrap();
        let queued: TriggerOutcome = serde_json::from_str(r#"{"status":"queued"}"#).unwrap();
        assert_eq!(current, TriggerOutcome::Current);
        assert_eq!(queued, TriggerOutcome::Queued);
        assert!(serde_json::from_str::<TriggerOutcome>(r#"{"status":"failed"}"#).is_err());
    }

    #[test]
    fn supersedes_requires_strictly_newer() {
        let older = record("a", "2025-07-05T09:00:00Z");
        let newer = record("b", "2025-07-05T09:00:01Z");
        assert!(older.supersedes(None));
        assert!(newer.supersedes(Some(&older)));
        assert!(!older.supersedes(Some(&newer)));
        assert!(!newer.supersedes(Some(&newer.clone())));
    }

    #[test]
    fn parse_bare_date_and_rfc3339() {
        assert_eq!(
            parse_timestamp("2025-07-10").unwrap(),
            Utc.with_ymd_and_hms(2025, 7, 10, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_timestamp(" 2025-07-10T14:00:00+02:00 ").unwrap(),
            Utc.with_ymd_and_hms(2025, 7, 10, 12, 0, 0).unwrap()
        );
        assert!(parse_timestamp("July 10").is_err());
    }
}
