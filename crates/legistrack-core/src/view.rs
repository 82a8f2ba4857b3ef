//! Read-only view model rendered by the bill-detail view.

use serde::Serialize;

use crate::{AnalysisRecord, TrackerState};

pub const TIMEOUT_MESSAGE: &str = "Analysis timed out. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Warning,
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusBadge {
    pub text: &'static str,
    pub severity: Severity,
}

/// Snapshot of the tracker as seen by the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackerView {
    pub state: TrackerState,
    pub analysis: Option<AnalysisRecord>,
    pub is_button_disabled: bool,
    pub button_text: &'static str,
    pub status_badge: Option<StatusBadge>,
    pub error: Option<String>,
    /// True until the initial fetch has resolved.
    pub loading: bool,
    /// Bumped on every published change.
    pub revision: u64,
}

impl TrackerView {
    pub fn new(
        state: TrackerState,
        analysis: Option<AnalysisRecord>,
        error: Option<String>,
        loading: bool,
        revision: u64,
    ) -> Self {
        Self {
            state,
            is_button_disabled: state.blocks_request(),
            button_text: button_text(state, analysis.is_some()),
            status_badge: status_badge(state),
            analysis,
            error,
            loading,
            revision,
        }
    }
}

impl Default for TrackerView {
    fn default() -> Self {
        Self::new(TrackerState::None, None, None, true, 0)
    }
}

/// Label of the single analysis action button.
pub fn button_text(state: TrackerState, has_record: bool) -> &'static str {
    match state {
        TrackerState::None => "Begin Analysis",
        TrackerState::Running => "Analyzing…",
        TrackerState::Current => "Analysis Current",
        TrackerState::Stale => "Re-run Analysis",
        TrackerState::Error if has_record => "Re-run Analysis",
        TrackerState::Error => "Begin Analysis",
    }
}

pub fn status_badge(state: TrackerState) -> Option<StatusBadge> {
    let (text, severity) = match state {
        TrackerState::None => return None,
        TrackerState::Current => ("Analysis Current", Severity::Success),
        TrackerState::Stale => ("Out of Date", Severity::Warning),
        TrackerState::Running => ("Analyzing", Severity::Info),
        TrackerState::Error => ("Analysis Failed", Severity::Error),
    };
    Some(StatusBadge { text, severity })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_offers_begin() {
        let view = TrackerView::new(TrackerState::None, None, None, false, 1);
        assert_eq!(view.button_text, "Begin Analysis");
        assert!(!view.is_button_disabled);
        assert!(view.status_badge.is_none());
    }

    #[test]
    fn running_and_current_disable_button() {
        let running = TrackerView::new(TrackerState::Running, None, None, false, 1);
        assert_eq!(running.button_text, "Analyzing…");
        assert!(running.is_button_disabled);

        let current = TrackerView::new(TrackerState::Current, None, None, false, 1);
        assert_eq!(current.button_text, "Analysis Current");
        assert!(current.is_button_disabled);
        assert_eq!(current.status_badge.unwrap().severity, Severity::Success);
    }

    #[test]
    fn stale_offers_rerun() {
        let view = TrackerView::new(TrackerState::Stale, None, None, false, 1);
        assert_eq!(view.button_text, "Re-run Analysis");
        assert!(!view.is_button_disabled);
        assert_eq!(
            view.status_badge,
            Some(StatusBadge {
                text: "Out of Date",
                severity: Severity::Warning
            })
        );
    }

    #[test]
    fn error_label_depends_on_record() {
        assert_eq!(button_text(TrackerState::Error, true), "Re-run Analysis");
        assert_eq!(button_text(TrackerState::Error, false), "Begin Analysis");
        assert_eq!(status_badge(TrackerState::Error).unwrap().text, "Analysis Failed");
    }

    #[test]
    fn default_view_is_loading() {
        let view = TrackerView::default();
        assert!(view.loading);
        assert_eq!(view.state, TrackerState::None);
        assert_eq!(view.revision, 0);
    }
}
