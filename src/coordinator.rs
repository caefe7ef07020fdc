//! The coordinator. Decides, per scheduling request, whether to suppress,
//! replace, or admit it, and keeps the tracker store in line with what the
//! host scheduler actually holds.
//!
//! The host wires three extension points around its job lifecycle:
//!
//! 1. [`Coordinator::enqueue`] wraps the submission to the host scheduler
//!    and applies throttle and debounce policy.
//! 2. [`Coordinator::after_enqueue`] records the admitted execution in the
//!    tracker store and hands the tracker back to the caller.
//! 3. [`Coordinator::after_perform`] consumes that tracker once execution
//!    has finished, successfully or not.
//!
//! [`Coordinator::submit`] and [`Coordinator::perform`] chain these for
//! callers that hold the tracker in-process. Callers that deliver work to
//! another process recover it with [`Coordinator::resume`], correlating on
//! the provider job id.

use chrono::{FixedOffset, Local, TimeDelta};
use opentelemetry::KeyValue;
use std::future::Future;
use std::sync::Arc;
use tracing::{Instrument, debug, info, warn};

use crate::cache::{Fetched, SENTINEL, TtlCache};
use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::model::{JobInvocation, ProviderJobId, Throttle, Tracker};
use crate::store::TrackerStore;
use crate::telemetry::job::{record_decision, start_enqueue_span};
use crate::telemetry::metrics;

/// What happened to a submission attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enqueued {
    /// The submission reached the host scheduler.
    Admitted {
        provider_job_id: Option<ProviderJobId>,
        admission: Admission,
    },
    /// A live throttle entry covered the key; nothing was submitted.
    Suppressed,
}

impl Enqueued {
    pub fn is_suppressed(&self) -> bool {
        matches!(self, Enqueued::Suppressed)
    }

    pub fn provider_job_id(&self) -> Option<&ProviderJobId> {
        match self {
            Enqueued::Admitted {
                provider_job_id, ..
            } => provider_job_id.as_ref(),
            Enqueued::Suppressed => None,
        }
    }

    /// Metric and log label for this outcome.
    pub fn decision(&self) -> &'static str {
        match self {
            Enqueued::Admitted { admission, .. } => admission.as_str(),
            Enqueued::Suppressed => "suppressed",
        }
    }
}

/// Which policy path admitted a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// No throttle configured.
    Unthrottled,
    /// Throttle window was open; the sentinel now closes it.
    Throttled,
    /// Debounced and throttled with a tracker pending: the new submission
    /// supersedes the pending one and refreshes the window.
    DebounceThrottled,
}

impl Admission {
    pub fn as_str(self) -> &'static str {
        match self {
            Admission::Unthrottled => "admitted",
            Admission::Throttled => "throttled",
            Admission::DebounceThrottled => "debounced",
        }
    }
}

/// Enqueue outcome plus the tracker recorded for it, if any.
#[derive(Debug, Clone)]
pub struct Submission {
    pub outcome: Enqueued,
    pub tracker: Option<Tracker>,
}

/// Where a delivered execution stands relative to its key's tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resumed {
    /// The tracker names this execution.
    Current(Tracker),
    /// The tracker names a later submission for the same key.
    Superseded(Tracker),
    /// No tracker exists for the key.
    Untracked,
}

impl Resumed {
    /// The tracker this execution owns and must clean up.
    pub fn into_owned_tracker(self) -> Option<Tracker> {
        match self {
            Resumed::Current(tracker) => Some(tracker),
            Resumed::Superseded(_) | Resumed::Untracked => None,
        }
    }
}

/// Throttle, debounce and tracking decisions over a tracker store and a TTL
/// cache. Holds no state of its own; everything shared lives in `S` and `C`.
pub struct Coordinator<S, C> {
    store: Arc<S>,
    cache: Arc<C>,
    clock: Arc<dyn Clock>,
    day_offset: FixedOffset,
}

impl<S, C> Clone for Coordinator<S, C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            cache: Arc::clone(&self.cache),
            clock: Arc::clone(&self.clock),
            day_offset: self.day_offset,
        }
    }
}

impl<S: TrackerStore, C: TtlCache> Coordinator<S, C> {
    /// Wall clock, daily windows in the process's local offset.
    pub fn new(store: Arc<S>, cache: Arc<C>) -> Self {
        Self {
            store,
            cache,
            clock: Arc::new(SystemClock),
            day_offset: *Local::now().offset(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// UTC offset whose calendar day bounds a `daily` throttle.
    pub fn with_day_offset(mut self, offset: FixedOffset) -> Self {
        self.day_offset = offset;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<C> {
        &self.cache
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Cache TTL for `job` under `throttle`, measured from now.
    pub fn throttle_ttl(&self, job: &JobInvocation, throttle: &Throttle) -> Result<TimeDelta> {
        throttle
            .expiry(job.scheduled_at(), self.clock.now(), self.day_offset)
            .map_err(|reason| Error::PolicyMisconfiguration {
                job_type: job.job_type().to_string(),
                reason,
            })
    }

    /// Pre-enqueue: run `submit` unless throttle policy suppresses it.
    ///
    /// `submit` runs at most once. A suppressed attempt reports success
    /// without side effects. Any error aborts the attempt before a tracker
    /// is written.
    pub async fn enqueue<F, Fut>(&self, job: &JobInvocation, submit: F) -> Result<Enqueued>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Option<ProviderJobId>>> + Send,
    {
        let policy = job.policy();
        let Some(throttle) = &policy.throttled else {
            let provider_job_id = submit().await?;
            return Ok(self.admitted(job, provider_job_id, Admission::Unthrottled));
        };

        let key = job.key();
        let ttl = self.throttle_ttl(job, throttle)?;

        if policy.debounced && self.store.find_by_key(&key).await?.is_some() {
            self.cache.write(&key, SENTINEL, ttl).await?;
            let provider_job_id = submit().await?;
            return Ok(self.admitted(job, provider_job_id, Admission::DebounceThrottled));
        }

        match self.cache.fetch_or_compute(&key, ttl, submit).await? {
            Fetched::Computed(provider_job_id) => {
                Ok(self.admitted(job, provider_job_id, Admission::Throttled))
            }
            Fetched::Cached => {
                info!(job_type = job.job_type(), %key, "submission throttled");
                self.count_decision(job, "suppressed");
                Ok(Enqueued::Suppressed)
            }
        }
    }

    /// Post-enqueue: persist a tracker for an admitted execution.
    ///
    /// Tracked when the key reuses trackers and one is already persisted,
    /// or when the job is scheduled and the host returned an id. Returns the
    /// tracker the post-execution step must consume.
    pub async fn after_enqueue(
        &self,
        job: &JobInvocation,
        provider_job_id: Option<ProviderJobId>,
    ) -> Result<Option<Tracker>> {
        let key = job.key();
        let mut tracker = if job.policy().reuses_key() {
            self.store.find_or_initialize_by_key(&key).await?
        } else {
            Tracker::new(key)
        };

        let scheduled = job.scheduled_at().is_some() && provider_job_id.is_some();
        if !(tracker.is_persisted() || scheduled) {
            if job.scheduled_at().is_some() {
                debug!(
                    job_type = job.job_type(),
                    key = %tracker.key,
                    "no provider job id, not tracking"
                );
            }
            return Ok(None);
        }

        tracker.provider_job_id = provider_job_id;
        tracker.scheduled_at = job.scheduled_at();

        match self.store.save(&mut tracker).await {
            Ok(()) => {
                debug!(
                    job_type = job.job_type(),
                    key = %tracker.key,
                    provider_job_id = ?tracker.provider_job_id,
                    "tracker saved"
                );
                metrics::trackers_saved()
                    .add(1, &[KeyValue::new("job_type", job.job_type().to_string())]);
                Ok(Some(tracker))
            }
            Err(Error::StoreConflict { key }) => {
                // Another submission tracked this key first; one row per key
                // still holds.
                warn!(job_type = job.job_type(), %key, "tracker conflict, leaving untracked");
                metrics::tracker_conflicts()
                    .add(1, &[KeyValue::new("job_type", job.job_type().to_string())]);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Post-execution: delete the tracker this execution owns. Never fails;
    /// a leftover tracker is logged, not raised.
    pub async fn after_perform(&self, tracker: Option<Tracker>) {
        let Some(tracker) = tracker else {
            return;
        };

        match self.store.delete(&tracker).await {
            Ok(true) => {
                debug!(key = %tracker.key, "tracker deleted");
                metrics::trackers_deleted().add(1, &[]);
            }
            Ok(false) => {
                debug!(key = %tracker.key, "tracker already gone or superseded");
            }
            Err(e) => {
                warn!(key = %tracker.key, error = %e, "tracker cleanup failed");
                metrics::cleanup_failures().add(1, &[]);
            }
        }
    }

    /// Pre-enqueue then post-enqueue.
    pub async fn submit<F, Fut>(&self, job: &JobInvocation, submit: F) -> Result<Submission>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Option<ProviderJobId>>> + Send,
    {
        let key = job.key();
        let span = start_enqueue_span(job.job_type(), &key);

        async {
            let outcome = self.enqueue(job, submit).await?;
            record_decision(&span, outcome.decision());

            let tracker = match &outcome {
                Enqueued::Admitted {
                    provider_job_id, ..
                } => self.after_enqueue(job, provider_job_id.clone()).await?,
                Enqueued::Suppressed => None,
            };

            Ok::<_, Error>(Submission { outcome, tracker })
        }
        .instrument(span.clone())
        .await
    }

    /// Run `work`, then clean up `tracker` whatever `work` returned.
    pub async fn perform<F, Fut, T>(&self, tracker: Option<Tracker>, work: F) -> T
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = T> + Send,
    {
        let outcome = work().await;
        self.after_perform(tracker).await;
        outcome
    }

    /// Recover the tracker for a delivered execution identified by its
    /// provider job id.
    pub async fn resume(&self, key: &str, provider_job_id: &ProviderJobId) -> Result<Resumed> {
        Ok(match self.store.find_by_key(key).await? {
            Some(tracker) if tracker.names(provider_job_id) => Resumed::Current(tracker),
            Some(tracker) => Resumed::Superseded(tracker),
            None => Resumed::Untracked,
        })
    }

    fn admitted(
        &self,
        job: &JobInvocation,
        provider_job_id: Option<ProviderJobId>,
        admission: Admission,
    ) -> Enqueued {
        debug!(
            job_type = job.job_type(),
            decision = admission.as_str(),
            provider_job_id = ?provider_job_id,
            "submission admitted"
        );
        self.count_decision(job, admission.as_str());
        Enqueued::Admitted {
            provider_job_id,
            admission,
        }
    }

    fn count_decision(&self, job: &JobInvocation, decision: &'static str) {
        metrics::enqueue_decisions().add(
            1,
            &[
                KeyValue::new("job_type", job.job_type().to_string()),
                KeyValue::new("decision", decision),
            ],
        );
    }
}
