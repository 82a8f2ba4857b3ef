//! Sync layer: hosted analysis store, trigger endpoint, and change notifications.

mod backend;
mod error;
mod notify;

pub use backend::AnalysisBackend;
pub use error::SyncError;
pub use notify::{ChangeNotifier, LocalNotifier, Subscription};

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::{RemoteConfig, RestBackend};

#[cfg(feature = "realtime")]
pub mod realtime;

#[cfg(feature = "realtime")]
pub use realtime::RealtimeNotifier;
