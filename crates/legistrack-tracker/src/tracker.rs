//! The status tracker and its poll cycle.
//!
//! All mutable state lives in one [`Inner`] behind a mutex that is never held
//! across an await. Every mutation goes through [`Shared::publish`], which
//! re-derives the view and is a no-op once the tracker is torn down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use legistrack_core::{
    Activity, AnalysisRecord, Subject, TIMEOUT_MESSAGE, TrackerState, TrackerView, TriggerOutcome,
    derive_state,
};
use legistrack_sync::{AnalysisBackend, ChangeNotifier, Subscription, SyncError};
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::TrackerConfig;
use crate::guard::{PollCycle, TrackerGuard};

/// Result of [`StatusTracker::request_analysis`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Suppressed: the analysis is running or already current, or the tracker is gone.
    Ignored,
    /// Endpoint reported an up-to-date analysis.
    Current,
    /// Analysis queued; the record arrives by notification or poll.
    Queued,
    /// Endpoint call failed with this message.
    Rejected(String),
}

impl From<Result<TriggerOutcome, SyncError>> for RequestOutcome {
    fn from(result: Result<TriggerOutcome, SyncError>) -> Self {
        match result {
            Ok(TriggerOutcome::Current) => RequestOutcome::Current,
            Ok(TriggerOutcome::Queued) => RequestOutcome::Queued,
            Err(e) => RequestOutcome::Rejected(e.to_string()),
        }
    }
}

#[derive(Default)]
pub(crate) struct Inner {
    record: Option<AnalysisRecord>,
    last_activity: Option<DateTime<Utc>>,
    activity: Activity,
    error: Option<String>,
    /// Why the change feed is unavailable. Survives merges; shown when
    /// nothing more recent went wrong.
    feed_error: Option<String>,
    loading: bool,
    revision: u64,
    /// Identifies the latest trigger request and its poll cycle.
    generation: u64,
    pub(crate) cycle: Option<PollCycle>,
}

impl Inner {
    fn state(&self) -> TrackerState {
        derive_state(self.record.as_ref(), self.last_activity, self.activity)
    }

    fn view(&self) -> TrackerView {
        TrackerView::new(
            self.state(),
            self.record.clone(),
            self.error.clone().or_else(|| self.feed_error.clone()),
            self.loading,
            self.revision,
        )
    }

    /// Take `record` if it is strictly newer than the held one.
    ///
    /// A newer record settles any outstanding request and ends its cycle.
    fn merge(&mut self, record: AnalysisRecord) -> bool {
        if !record.supersedes(self.record.as_ref()) {
            return false;
        }
        self.record = Some(record);
        self.activity = Activity::Idle;
        self.error = None;
        self.cycle = None;
        true
    }

    fn for_generation(&self, generation: u64) -> bool {
        self.generation == generation && self.activity == Activity::Running
    }
}

pub(crate) struct Shared {
    subject_id: String,
    config: TrackerConfig,
    backend: Arc<dyn AnalysisBackend>,
    active: AtomicBool,
    inner: Mutex<Inner>,
    view: watch::Sender<TrackerView>,
}

impl Shared {
    pub(crate) fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Flip to inactive. Returns true only for the first caller.
    pub(crate) fn deactivate(&self) -> bool {
        self.active.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn subject_id(&self) -> &str {
        &self.subject_id
    }

    fn publish(&self, inner: &mut Inner) {
        if !self.is_active() {
            return;
        }
        inner.revision += 1;
        let view = inner.view();
        debug!(
            subject = %self.subject_id,
            state = %view.state,
            revision = view.revision,
            "tracker view updated"
        );
        self.view.send_replace(view);
    }

    fn finish_initial_fetch(&self, result: Result<Option<AnalysisRecord>, SyncError>) {
        let mut inner = self.lock();
        if !self.is_active() {
            return;
        }
        inner.loading = false;
        match result {
            Ok(Some(record)) => {
                inner.merge(record);
            }
            Ok(None) => debug!(subject = %self.subject_id, "no analysis yet"),
            Err(e) => {
                warn!(subject = %self.subject_id, error = %e, "initial analysis fetch failed");
                inner.error = Some(e.to_string());
            }
        }
        self.publish(&mut inner);
    }

    fn apply_pushed(&self, record: AnalysisRecord) {
        let mut inner = self.lock();
        if !self.is_active() {
            return;
        }
        let id = record.id.clone();
        if inner.merge(record) {
            info!(subject = %self.subject_id, record = %id, "analysis arrived by notification");
            self.publish(&mut inner);
        } else {
            debug!(subject = %self.subject_id, record = %id, "ignoring notification for older analysis");
        }
    }

    /// Apply one poll result. Returns true when the cycle should stop.
    fn apply_polled(
        &self,
        generation: u64,
        result: Result<Option<AnalysisRecord>, SyncError>,
    ) -> bool {
        let mut inner = self.lock();
        if !self.is_active() || !inner.for_generation(generation) {
            return true;
        }
        match result {
            Ok(Some(record)) => {
                let id = record.id.clone();
                if inner.merge(record) {
                    info!(subject = %self.subject_id, record = %id, "analysis arrived by poll");
                    self.publish(&mut inner);
                    return true;
                }
                debug!(subject = %self.subject_id, "poll found no newer analysis");
            }
            Ok(None) => debug!(subject = %self.subject_id, "poll found no analysis"),
            Err(e) => {
                warn!(subject = %self.subject_id, error = %e, "analysis poll failed");
                inner.error = Some(e.to_string());
                self.publish(&mut inner);
            }
        }
        false
    }

    fn time_out(&self, generation: u64) {
        let mut inner = self.lock();
        if !self.is_active() || !inner.for_generation(generation) {
            return;
        }
        warn!(subject = %self.subject_id, "analysis request timed out");
        inner.activity = Activity::TimedOut;
        inner.error = Some(TIMEOUT_MESSAGE.to_string());
        // Dropping our own cycle handle only flags this task; it exits right after.
        inner.cycle = None;
        self.publish(&mut inner);
    }
}

/// Cheap handle to a mounted tracker.
///
/// Obtained from [`TrackerGuard::tracker`]; stays valid after teardown but
/// every action then becomes a no-op.
#[derive(Clone)]
pub struct StatusTracker {
    pub(crate) shared: Arc<Shared>,
}

impl StatusTracker {
    /// Start tracking `subject`.
    ///
    /// Opens the notification subscription, then fetches the latest analysis
    /// once. Failures of either step are reported through the view's `error`
    /// field. The returned guard owns the subscription and any poll cycle.
    pub async fn initialize(
        subject: Subject,
        backend: Arc<dyn AnalysisBackend>,
        notifier: &dyn ChangeNotifier,
        config: TrackerConfig,
    ) -> TrackerGuard {
        let (view, _) = watch::channel(TrackerView::default());
        let shared = Arc::new(Shared {
            subject_id: subject.id,
            config,
            backend,
            active: AtomicBool::new(true),
            inner: Mutex::new(Inner {
                last_activity: subject.last_activity,
                loading: true,
                ..Inner::default()
            }),
            view,
        });
        info!(subject = %shared.subject_id, "tracking analysis status");

        let subscription = match notifier.subscribe(&shared.subject_id) {
            Ok(sub) => Some(tokio::spawn(listen(Arc::clone(&shared), sub))),
            Err(e) => {
                warn!(subject = %shared.subject_id, error = %e, "analysis subscription failed");
                shared.lock().feed_error = Some(e.to_string());
                None
            }
        };
        let guard = TrackerGuard::new(StatusTracker { shared }, subscription);

        let shared = &guard.tracker().shared;
        let result = shared.backend.fetch_latest(&shared.subject_id).await;
        shared.finish_initial_fetch(result);
        guard
    }

    pub fn subject_id(&self) -> &str {
        &self.shared.subject_id
    }

    /// Current view snapshot.
    pub fn view(&self) -> TrackerView {
        self.shared.view.borrow().clone()
    }

    /// Receiver notified on every view change.
    pub fn watch(&self) -> watch::Receiver<TrackerView> {
        self.shared.view.subscribe()
    }

    /// Ask the backend to analyse the bill.
    ///
    /// Does nothing while an analysis is running or already current. On
    /// failure the pre-request status is restored and the message lands in
    /// the view's `error` field.
    pub async fn request_analysis(&self) -> RequestOutcome {
        let shared = &self.shared;
        let requested_at = Instant::now();
        let (generation, before) = {
            let mut inner = shared.lock();
            if !shared.is_active() {
                return RequestOutcome::Ignored;
            }
            let state = inner.state();
            if state.blocks_request() {
                debug!(subject = %shared.subject_id, %state, "analysis request suppressed");
                return RequestOutcome::Ignored;
            }
            let before = inner.activity;
            inner.generation += 1;
            inner.activity = Activity::Running;
            inner.error = None;
            inner.cycle = None;
            shared.publish(&mut inner);
            (inner.generation, before)
        };

        let result = shared.backend.trigger(&shared.subject_id).await;

        let mut inner = shared.lock();
        if !shared.is_active() || !inner.for_generation(generation) {
            // Torn down, or a notification settled the request before the endpoint answered.
            return result.into();
        }
        match result {
            Ok(TriggerOutcome::Current) => {
                info!(subject = %shared.subject_id, "analysis already current");
                inner.activity = Activity::Confirmed;
                shared.publish(&mut inner);
                RequestOutcome::Current
            }
            Ok(TriggerOutcome::Queued) => {
                info!(subject = %shared.subject_id, generation, "analysis queued, arming fallback poll");
                inner.cycle = Some(PollCycle::spawn(run_poll_cycle(
                    Arc::clone(shared),
                    generation,
                    requested_at,
                )));
                RequestOutcome::Queued
            }
            Err(e) => {
                let message = e.to_string();
                warn!(subject = %shared.subject_id, error = %message, "analysis request failed");
                inner.activity = before.after_dispatch_failure();
                inner.error = Some(message.clone());
                shared.publish(&mut inner);
                RequestOutcome::Rejected(message)
            }
        }
    }

    /// Record new external activity on the bill and re-derive the status.
    pub fn set_last_activity(&self, last_activity: Option<DateTime<Utc>>) {
        let shared = &self.shared;
        let mut inner = shared.lock();
        if !shared.is_active() || inner.last_activity == last_activity {
            return;
        }
        inner.last_activity = last_activity;
        match inner.activity {
            Activity::Confirmed => inner.activity = Activity::Idle,
            Activity::TimedOut => {
                inner.activity = Activity::Idle;
                inner.error = None;
            }
            Activity::Idle | Activity::Running => {}
        }
        shared.publish(&mut inner);
    }
}

async fn listen(shared: Arc<Shared>, mut subscription: Subscription) {
    while let Some(record) = subscription.recv().await {
        shared.apply_pushed(record);
    }
    debug!(subject = %shared.subject_id, "analysis change feed closed");
}

/// Poll for the queued analysis until it shows up or the deadline passes.
///
/// Polling starts `fallback_delay` after the request; the deadline is
/// measured from the request too and is never pushed back.
async fn run_poll_cycle(shared: Arc<Shared>, generation: u64, requested_at: Instant) {
    let config = shared.config;
    let deadline = tokio::time::sleep_until(requested_at + config.deadline());
    tokio::pin!(deadline);
    let mut ticker = tokio::time::interval_at(
        requested_at + config.fallback_delay,
        config.effective_poll_interval(),
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = &mut deadline => {
                shared.time_out(generation);
                return;
            }
            result = poll_once(&shared, &mut ticker) => {
                if shared.apply_polled(generation, result) {
                    return;
                }
            }
        }
    }
}

async fn poll_once(
    shared: &Shared,
    ticker: &mut Interval,
) -> Result<Option<AnalysisRecord>, SyncError> {
    ticker.tick().await;
    debug!(subject = %shared.subject_id, "polling for analysis");
    shared.backend.fetch_latest(&shared.subject_id).await
}
