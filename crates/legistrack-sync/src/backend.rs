use async_trait::async_trait;
use legistrack_core::{AnalysisRecord, TriggerOutcome};

use crate::SyncError;

/// Remote side of the analysis workflow: the record table and the trigger endpoint.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Most recent analysis for `subject_id`.
    ///
    /// `Ok(None)` means the bill has never been analysed, which is not an error.
    async fn fetch_latest(&self, subject_id: &str) -> Result<Option<AnalysisRecord>, SyncError>;

    /// Ask the backend to (re)generate the analysis for `subject_id`.
    async fn trigger(&self, subject_id: &str) -> Result<TriggerOutcome, SyncError>;
}
