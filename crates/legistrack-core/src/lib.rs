pub mod analysis;
pub mod status;
pub mod view;

pub use analysis::{AnalysisRecord, Subject, TriggerOutcome, parse_timestamp};
pub use status::{Activity, TrackerState, derive_state, is_stale};
pub use view::{Severity, StatusBadge, TIMEOUT_MESSAGE, TrackerView};
