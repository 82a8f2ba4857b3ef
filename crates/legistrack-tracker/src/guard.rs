use std::future::Future;

use tokio::task::JoinHandle;
use tracing::info;

use crate::StatusTracker;

/// Handle to a spawned poll cycle. Dropping it cancels the cycle.
pub(crate) struct PollCycle(JoinHandle<()>);

impl PollCycle {
    pub(crate) fn spawn<F>(cycle: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self(tokio::spawn(cycle))
    }
}

impl Drop for PollCycle {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Owns everything a mounted tracker holds open: the notification
/// subscription task and, through the tracker, the current poll cycle.
///
/// Released exactly once, by [`teardown`](Self::teardown) or on drop. After
/// release no notification, poll, or pending trigger reply changes the view.
pub struct TrackerGuard {
    tracker: StatusTracker,
    subscription: Option<JoinHandle<()>>,
}

impl TrackerGuard {
    pub(crate) fn new(tracker: StatusTracker, subscription: Option<JoinHandle<()>>) -> Self {
        Self {
            tracker,
            subscription,
        }
    }

    pub fn tracker(&self) -> &StatusTracker {
        &self.tracker
    }

    pub fn teardown(mut self) {
        self.release();
    }

    fn release(&mut self) {
        let shared = &self.tracker.shared;
        let cycle = {
            let mut inner = shared.lock();
            if !shared.deactivate() {
                return;
            }
            inner.cycle.take()
        };
        drop(cycle);
        if let Some(task) = self.subscription.take() {
            task.abort();
        }
        info!(subject = %shared.subject_id(), "analysis tracker released");
    }
}

impl Drop for TrackerGuard {
    fn drop(&mut self) {
        self.release();
    }
}
