//! Change notifications for newly inserted analysis records.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use legistrack_core::AnalysisRecord;
use tokio::sync::mpsc;
use tracing::debug;

use crate::SyncError;

/// Source of insert events for the analysis table.
pub trait ChangeNotifier: Send + Sync {
    /// Open a feed of new records for one bill.
    ///
    /// Every call returns an independent subscription; dropping it
    /// unsubscribes.
    fn subscribe(&self, subject_id: &str) -> Result<Subscription, SyncError>;
}

/// Receiving end of a per-bill insert feed.
#[derive(Debug)]
pub struct Subscription {
    subject_id: String,
    rx: mpsc::UnboundedReceiver<AnalysisRecord>,
}

impl Subscription {
    /// Create a subscription and the sender a notifier feeds it through.
    pub fn channel(subject_id: &str) -> (mpsc::UnboundedSender<AnalysisRecord>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sub = Self {
            subject_id: subject_id.to_string(),
            rx,
        };
        (tx, sub)
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    /// Next record for this bill, or `None` once the feed is closed.
    ///
    /// Records addressed to other bills are skipped.
    pub async fn recv(&mut self) -> Option<AnalysisRecord> {
        loop {
            let record = self.rx.recv().await?;
            if record.subject_id == self.subject_id {
                return Some(record);
            }
            debug!(
                expected = %self.subject_id,
                got = %record.subject_id,
                "dropping record for another bill"
            );
        }
    }
}

type Senders = HashMap<String, Vec<mpsc::UnboundedSender<AnalysisRecord>>>;

/// In-process notifier.
///
/// Whatever receives insert events (a realtime socket, a webhook, a test)
/// calls [`publish`](Self::publish); every open subscription for the
/// record's bill gets a copy.
#[derive(Debug, Clone, Default)]
pub struct LocalNotifier {
    senders: Arc<Mutex<Senders>>,
}

impl LocalNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `record` to the bill's subscribers. Returns how many received it.
    pub fn publish(&self, record: AnalysisRecord) -> usize {
        let mut senders = self.senders.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = senders.get_mut(&record.subject_id) else {
            return 0;
        };
        list.retain(|tx| tx.send(record.clone()).is_ok());
        let delivered = list.len();
        if list.is_empty() {
            senders.remove(&record.subject_id);
        }
        debug!(subject = %record.subject_id, record = %record.id, delivered, "published analysis insert");
        delivered
    }

    /// Number of live subscriptions for a bill.
    pub fn subscriber_count(&self, subject_id: &str) -> usize {
        let mut senders = self.senders.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = senders.get_mut(subject_id) else {
            return 0;
        };
        list.retain(|tx| !tx.is_closed());
        list.len()
    }
}

impl ChangeNotifier for LocalNotifier {
    fn subscribe(&self, subject_id: &str) -> Result<Subscription, SyncError> {
        let (tx, sub) = Subscription::channel(subject_id);
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(subject_id.to_string())
            .or_default()
            .push(tx);
        debug!(subject = %subject_id, "opened analysis subscription");
        Ok(sub)
    }
}
