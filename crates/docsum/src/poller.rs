//! Job status polling
//!
//! A [`StatusPoller`] follows one job at a time through the states
//!
//! ```text
//!            start(job)                 server: done | failed
//!   Idle ───────────────▶ Polling ───────────────────────────▶ Settled
//!    ▲                    │    ▲
//!    │           cancel() │    │ start(job)
//!    │                    ▼    │
//!    └─────────────── Cancelled
//! ```
//!
//! Each `start` opens a new epoch and cancels the previous poll stream. Every
//! status request is tagged with its epoch and a sequence number; a response is
//! applied only if its epoch is still current and no newer response has been
//! applied. In-flight requests are never aborted, their results are dropped.
//!
//! Failed status requests (network errors, 5xx, ...) do not settle anything:
//! the next tick retries. After `degraded_after` consecutive failures a
//! [`PollEvent::Degraded`] notice is published once, and [`PollEvent::Recovered`]
//! follows the next successful response. Only a server-reported `failed` status
//! settles the job as failed.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::api::{ApiResult, SummaryApi};
use crate::classifier::ClassifiedError;
use crate::config::ClientConfig;
use crate::store::{JobStateStore, Reconcile};
use crate::types::{JobStatus, SummarizationJob};

/// Poller state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling { job_id: String },
    /// Terminal status reported by the server (`done` or `failed`)
    Settled { job_id: String, status: JobStatus },
    Cancelled { job_id: String },
}

impl PollState {
    pub fn job_id(&self) -> Option<&str> {
        match self {
            PollState::Idle => None,
            PollState::Polling { job_id }
            | PollState::Settled { job_id, .. }
            | PollState::Cancelled { job_id } => Some(job_id),
        }
    }

    pub fn is_polling(&self) -> bool {
        matches!(self, PollState::Polling { .. })
    }
}

/// Notifications published while polling
#[derive(Debug, Clone)]
pub enum PollEvent {
    /// A status response was applied to the store
    Status { job: SummarizationJob },
    /// Consecutive transient failures reached the threshold; polling continues
    Degraded {
        job_id: String,
        consecutive_failures: u32,
        error: ClassifiedError,
    },
    /// A response arrived again after a degraded period
    Recovered { job_id: String, after_failures: u32 },
    /// The job reached `done` or `failed`; no further requests are issued
    Settled { job: SummarizationJob },
}

/// Polling cadence and connectivity policy
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Consecutive transient failures before a degraded-connectivity notice
    pub degraded_after: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(3_000),
            degraded_after: 5,
        }
    }
}

impl From<&ClientConfig> for PollPolicy {
    fn from(config: &ClientConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            degraded_after: config.degraded_after_failures.max(1),
        }
    }
}

struct Tracking {
    epoch: u64,
    state: PollState,
    token: Option<CancellationToken>,
    /// Sequence number of the last applied response in this epoch
    last_applied: u64,
}

enum Flow {
    Continue,
    Stop,
}

struct Shared {
    api: Arc<dyn SummaryApi>,
    store: Arc<JobStateStore>,
    policy: PollPolicy,
    tracking: Mutex<Tracking>,
    state_tx: watch::Sender<PollState>,
    events: broadcast::Sender<PollEvent>,
}

impl Shared {
    fn publish_state(&self, tracking: &Tracking) {
        self.state_tx.send_replace(tracking.state.clone());
    }

    fn emit(&self, event: PollEvent) {
        let _ = self.events.send(event);
    }

    /// Apply one response under the tracking lock
    fn handle(
        &self,
        job_id: &str,
        epoch: u64,
        seq: u64,
        response: ApiResult<SummarizationJob>,
        failures: &mut u32,
    ) -> Flow {
        let mut tracking = self.tracking.lock();

        if tracking.epoch != epoch {
            tracing::debug!(
                "Discarding stale response #{} for job {} (epoch {} superseded by {})",
                seq,
                job_id,
                epoch,
                tracking.epoch
            );
            return Flow::Stop;
        }
        if seq <= tracking.last_applied {
            tracing::debug!("Discarding out-of-order response #{} for job {}", seq, job_id);
            return Flow::Continue;
        }

        let job = match response {
            Ok(job) if job.id == job_id => job,
            Ok(job) => {
                tracing::warn!("Status request for job {} returned job {}; ignoring", job_id, job.id);
                return Flow::Continue;
            }
            Err(error) => {
                *failures += 1;
                tracing::warn!(
                    "Status poll for job {} failed ({} consecutive, {}): {}",
                    job_id,
                    failures,
                    error.kind,
                    error
                );
                if *failures == self.policy.degraded_after {
                    tracing::warn!(
                        "Degraded connectivity while polling job {}; still retrying every {:?}",
                        job_id,
                        self.policy.interval
                    );
                    self.emit(PollEvent::Degraded {
                        job_id: job_id.to_string(),
                        consecutive_failures: *failures,
                        error,
                    });
                }
                return Flow::Continue;
            }
        };

        tracking.last_applied = seq;
        if *failures >= self.policy.degraded_after {
            tracing::info!("Connectivity restored for job {} after {} failures", job_id, failures);
            self.emit(PollEvent::Recovered {
                job_id: job_id.to_string(),
                after_failures: *failures,
            });
        }
        *failures = 0;

        tracing::debug!("Job {} reported {}", job_id, job.status);
        let outcome = self.store.apply(job.clone());
        if outcome == Reconcile::Superseded {
            tracing::info!("Job {} no longer tracked for its document; stopping poll", job_id);
            tracking.epoch += 1;
            tracking.token = None;
            tracking.state = PollState::Cancelled {
                job_id: job_id.to_string(),
            };
            self.publish_state(&tracking);
            return Flow::Stop;
        }
        if outcome.applied() {
            self.emit(PollEvent::Status {
                job: job.clone().normalized(),
            });
        }

        // The store is authoritative: it may already hold a terminal record.
        let current = self.store.get(job_id).unwrap_or(job);
        if !current.status.is_terminal() {
            return Flow::Continue;
        }

        match current.failure_reason() {
            Some(reason) => tracing::warn!("Job {} failed: {}", job_id, reason),
            None => tracing::info!("Job {} finished", job_id),
        }
        tracking.token = None;
        tracking.state = PollState::Settled {
            job_id: job_id.to_string(),
            status: current.status,
        };
        self.publish_state(&tracking);
        self.emit(PollEvent::Settled { job: current });
        Flow::Stop
    }
}

/// Polls one job at a time until it settles
pub struct StatusPoller {
    shared: Arc<Shared>,
}

impl StatusPoller {
    pub fn new(api: Arc<dyn SummaryApi>, store: Arc<JobStateStore>, policy: PollPolicy) -> Self {
        let (state_tx, _) = watch::channel(PollState::Idle);
        let (events, _) = broadcast::channel(256);
        Self {
            shared: Arc::new(Shared {
                api,
                store,
                policy,
                tracking: Mutex::new(Tracking {
                    epoch: 0,
                    state: PollState::Idle,
                    token: None,
                    last_applied: 0,
                }),
                state_tx,
                events,
            }),
        }
    }

    pub fn policy(&self) -> PollPolicy {
        self.shared.policy
    }

    /// Start polling `job_id`, cancelling any poll in progress.
    ///
    /// Must be called from within a tokio runtime. Returns the new epoch.
    pub fn start(&self, job_id: &str) -> u64 {
        let mut tracking = self.shared.tracking.lock();

        if let Some(previous) = tracking.token.take() {
            previous.cancel();
        }
        if let PollState::Polling { job_id: previous } = &tracking.state {
            tracing::info!("Poll for job {} superseded by job {}", previous, job_id);
        }

        tracking.epoch += 1;
        tracking.last_applied = 0;
        let epoch = tracking.epoch;
        let token = CancellationToken::new();
        tracking.token = Some(token.clone());
        tracking.state = PollState::Polling {
            job_id: job_id.to_string(),
        };
        self.shared.publish_state(&tracking);
        drop(tracking);

        tracing::info!("Polling job {} every {:?}", job_id, self.shared.policy.interval);
        tokio::spawn(poll_loop(
            Arc::clone(&self.shared),
            job_id.to_string(),
            epoch,
            token,
        ));
        epoch
    }

    /// Stop polling. Scheduling stops immediately and any response still in
    /// flight is discarded when it arrives.
    pub fn cancel(&self) {
        let mut tracking = self.shared.tracking.lock();
        tracking.epoch += 1;
        if let Some(token) = tracking.token.take() {
            token.cancel();
        }
        if let PollState::Polling { job_id } = &tracking.state {
            tracing::info!("Cancelled poll for job {}", job_id);
            tracking.state = PollState::Cancelled {
                job_id: job_id.clone(),
            };
            self.shared.publish_state(&tracking);
        }
    }

    /// Current state
    pub fn state(&self) -> PollState {
        self.shared.state_tx.borrow().clone()
    }

    /// Watch state transitions
    pub fn watch_state(&self) -> watch::Receiver<PollState> {
        self.shared.state_tx.subscribe()
    }

    /// Subscribe to poll events
    pub fn events(&self) -> broadcast::Receiver<PollEvent> {
        self.shared.events.subscribe()
    }

    /// Wait until the poller is no longer polling and return the state it
    /// came to rest in
    pub async fn wait_settled(&self) -> PollState {
        let mut rx = self.shared.state_tx.subscribe();
        let state = match rx.wait_for(|state| !state.is_polling()).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        };
        state
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn poll_loop(shared: Arc<Shared>, job_id: String, epoch: u64, token: CancellationToken) {
    let mut ticker = tokio::time::interval(shared.policy.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut seq = 0u64;
    let mut failures = 0u32;

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                tracing::debug!("Poll loop for job {} cancelled", job_id);
                return;
            }
            _ = ticker.tick() => {}
        }

        seq += 1;
        tracing::debug!("Requesting status of job {} (#{})", job_id, seq);
        // Not raced against cancellation: the request completes and `handle`
        // drops the result if the epoch moved on.
        let response = shared.api.get_summary(&job_id).await;

        if let Flow::Stop = shared.handle(&job_id, epoch, seq, response, &mut failures) {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{job, ScriptedApi};
    use crate::classifier::{classify, ErrorKind, RawFailure, RequestContext};

    fn poller(api: &Arc<ScriptedApi>, degraded_after: u32) -> (StatusPoller, Arc<JobStateStore>) {
        let store = Arc::new(JobStateStore::new());
        let policy = PollPolicy {
            interval: Duration::from_millis(3_000),
            degraded_after,
        };
        let api: Arc<dyn SummaryApi> = Arc::clone(api) as Arc<dyn SummaryApi>;
        (StatusPoller::new(api, Arc::clone(&store), policy), store)
    }

    fn drain(events: &mut broadcast::Receiver<PollEvent>) -> Vec<PollEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    fn statuses(events: &[PollEvent]) -> Vec<JobStatus> {
        events
            .iter()
            .filter_map(|e| match e {
                PollEvent::Status { job } => Some(job.status),
                _ => None,
            })
            .collect()
    }

    fn server_error(status: u16) -> ClassifiedError {
        classify(RawFailure::Status {
            status,
            body: r#"{"detail":"upstream unavailable"}"#.to_string(),
            context: RequestContext::new("GET", "http://localhost:8000/summaries/s1"),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_on_done() {
        use JobStatus::*;
        let api = Arc::new(ScriptedApi::new());
        api.script_statuses("s1", "d1", &[Queued, Running, Running, Done]);
        let (poller, store) = poller(&api, 5);

        poller.start("s1");
        let state = poller.wait_settled().await;
        assert_eq!(state, PollState::Settled { job_id: "s1".to_string(), status: Done });
        assert_eq!(api.status_calls(), 4);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(api.status_calls(), 4);
        assert_eq!(store.get("s1").unwrap().summary_text.as_deref(), Some("Short summary."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_observed_sequence_matches_server_sequence() {
        use JobStatus::*;
        let api = Arc::new(ScriptedApi::new());
        api.script_statuses("s1", "d1", &[Queued, Queued, Running, Done]);
        let (poller, _) = poller(&api, 5);
        let mut events = poller.events();

        poller.start("s1");
        poller.wait_settled().await;

        let events = drain(&mut events);
        assert_eq!(statuses(&events), vec![Queued, Queued, Running, Done]);
        assert!(matches!(events.last(), Some(PollEvent::Settled { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_between_requests() {
        use JobStatus::*;
        let api = Arc::new(ScriptedApi::new());
        api.script_statuses("s1", "d1", &[Queued, Running, Done]);
        let (poller, _) = poller(&api, 5);

        let started = tokio::time::Instant::now();
        poller.start("s1");
        poller.wait_settled().await;
        assert_eq!(started.elapsed(), Duration::from_millis(6_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_discards_stale_response() {
        use JobStatus::*;
        let api = Arc::new(ScriptedApi::new());
        api.push_status_after("A", Duration::from_secs(5), Ok(job("A", "dA", Done)));
        api.script_statuses("B", "dB", &[Queued, Done]);
        let (poller, store) = poller(&api, 5);
        let mut events = poller.events();

        poller.start("A");
        tokio::time::sleep(Duration::from_millis(10)).await;
        poller.start("B");

        let state = poller.wait_settled().await;
        assert_eq!(state, PollState::Settled { job_id: "B".to_string(), status: Done });

        // A's response lands at t=5s, after B settled.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(store.get("A").is_none());
        assert_eq!(poller.state().job_id(), Some("B"));

        let events = drain(&mut events);
        assert!(events.iter().all(|e| match e {
            PollEvent::Status { job } | PollEvent::Settled { job } => job.id == "B",
            _ => true,
        }));
        assert_eq!(api.status_log(), vec!["A", "B", "B"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_job_settles_without_retry() {
        use JobStatus::*;
        let api = Arc::new(ScriptedApi::new());
        api.script_statuses("s1", "d1", &[Queued, Failed]);
        let (poller, store) = poller(&api, 5);
        let mut events = poller.events();

        poller.start("s1");
        let state = poller.wait_settled().await;
        assert_eq!(state, PollState::Settled { job_id: "s1".to_string(), status: Failed });

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(api.status_calls(), 2);

        let settled = drain(&mut events)
            .into_iter()
            .find_map(|e| match e {
                PollEvent::Settled { job } => Some(job),
                _ => None,
            })
            .unwrap();
        assert_eq!(settled.failure_reason(), Some("model crashed"));
        assert_eq!(store.get("s1").unwrap().error_message.as_deref(), Some("model crashed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_keep_polling() {
        use JobStatus::*;
        let api = Arc::new(ScriptedApi::new());
        api.push_status("s1", Err(ClassifiedError::network("connection refused")))
            .push_status("s1", Err(server_error(503)))
            .push_status("s1", Err(ClassifiedError::network("timed out")))
            .push_status("s1", Ok(job("s1", "d1", Running)))
            .push_status("s1", Ok(job("s1", "d1", Done)));
        let (poller, _) = poller(&api, 2);
        let mut events = poller.events();

        poller.start("s1");
        let state = poller.wait_settled().await;
        assert_eq!(state, PollState::Settled { job_id: "s1".to_string(), status: Done });
        assert_eq!(api.status_calls(), 5);

        let events = drain(&mut events);
        let degraded: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                PollEvent::Degraded { consecutive_failures, error, .. } => {
                    Some((*consecutive_failures, error.kind))
                }
                _ => None,
            })
            .collect();
        assert_eq!(degraded, vec![(2, ErrorKind::Http)]);
        assert!(events
            .iter()
            .any(|e| matches!(e, PollEvent::Recovered { after_failures: 3, .. })));
        assert_eq!(statuses(&events), vec![Running, Done]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_discards_in_flight_response() {
        use JobStatus::*;
        let api = Arc::new(ScriptedApi::new());
        api.push_status("s1", Ok(job("s1", "d1", Queued)))
            .push_status_after("s1", Duration::from_secs(2), Ok(job("s1", "d1", Running)));
        let (poller, store) = poller(&api, 5);
        let mut events = poller.events();

        poller.start("s1");
        // Second request goes out at t=3s and answers at t=5s.
        tokio::time::sleep(Duration::from_secs(4)).await;
        poller.cancel();
        assert_eq!(poller.state(), PollState::Cancelled { job_id: "s1".to_string() });

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(api.status_calls(), 2);
        assert_eq!(store.status_of("s1"), Some(Queued));
        assert_eq!(statuses(&drain(&mut events)), vec![Queued]);
        assert_eq!(poller.wait_settled().await, PollState::Cancelled { job_id: "s1".to_string() });
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_cancel() {
        use JobStatus::*;
        let api = Arc::new(ScriptedApi::new());
        api.script_statuses("s1", "d1", &[Queued, Done]);
        let (poller, _) = poller(&api, 5);

        poller.start("s1");
        poller.cancel();
        assert_eq!(poller.state(), PollState::Cancelled { job_id: "s1".to_string() });

        poller.start("s1");
        let state = poller.wait_settled().await;
        assert_eq!(state, PollState::Settled { job_id: "s1".to_string(), status: Done });
    }

    #[tokio::test(start_paused = true)]
    async fn test_regression_not_applied() {
        use JobStatus::*;
        let api = Arc::new(ScriptedApi::new());
        api.script_statuses("s1", "d1", &[Running, Queued, Done]);
        let (poller, _) = poller(&api, 5);
        let mut events = poller.events();

        poller.start("s1");
        poller.wait_settled().await;
        assert_eq!(statuses(&drain(&mut events)), vec![Running, Done]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_settled_pending_while_polling() {
        use JobStatus::*;
        let api = Arc::new(ScriptedApi::new());
        api.script_statuses("s1", "d1", &[Queued, Done]);
        let (poller, _) = poller(&api, 5);

        poller.start("s1");
        let mut wait = tokio_test::task::spawn(poller.wait_settled());
        tokio_test::assert_pending!(wait.poll());

        tokio::time::sleep(Duration::from_secs(4)).await;
        tokio_test::assert_ready_eq!(
            wait.poll(),
            PollState::Settled { job_id: "s1".to_string(), status: Done }
        );
    }

    #[tokio::test]
    async fn test_wait_settled_when_idle() {
        let api = Arc::new(ScriptedApi::new());
        let (poller, _) = poller(&api, 5);
        assert_eq!(poller.wait_settled().await, PollState::Idle);
    }
}
