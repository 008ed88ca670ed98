//! Read-through cache of the user's booked appointments.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{FetchError, RefreshError};
use crate::models::appointment::AppointmentSnapshot;
use crate::source::RemoteAppointmentSource;
use crate::subscription::{SnapshotCallback, SubscriptionHandle, SubscriptionRegistry};

pub type RefreshResult = Result<Arc<AppointmentSnapshot>, RefreshError>;

type SharedRefresh = Shared<BoxFuture<'static, RefreshResult>>;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts per refresh, including the first.
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    /// Delay after failed attempt `attempt`, growing linearly.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub refreshing: bool,
    /// 0 until the first successful refresh.
    pub sequence: u64,
    pub refreshed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

struct InFlight {
    seq: u64,
    forced: bool,
    result: SharedRefresh,
}

#[derive(Default)]
struct CacheState {
    current: Arc<AppointmentSnapshot>,
    applied_seq: u64,
    next_seq: u64,
    in_flight: Option<InFlight>,
    refreshed_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

struct Inner {
    source: Arc<dyn RemoteAppointmentSource>,
    retry: RetryPolicy,
    state: Mutex<CacheState>,
    registry: SubscriptionRegistry,
    // Sequence of the last snapshot handed to subscribers.
    delivered: Mutex<u64>,
}

#[derive(Clone)]
pub struct AppointmentCache {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl AppointmentCache {
    pub fn with_retry(source: Arc<dyn RemoteAppointmentSource>, retry: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                retry: RetryPolicy {
                    max_attempts: retry.max_attempts.max(1),
                    ..retry
                },
                state: Mutex::new(CacheState::default()),
                registry: SubscriptionRegistry::new(),
                delivered: Mutex::new(0),
            }),
        }
    }

    pub fn read(&self) -> Arc<AppointmentSnapshot> {
        Arc::clone(&lock(&self.inner.state).current)
    }

    pub fn status(&self) -> CacheStatus {
        let state = lock(&self.inner.state);
        CacheStatus {
            refreshing: state.in_flight.is_some(),
            sequence: state.applied_seq,
            refreshed_at: state.refreshed_at,
            last_error: state.last_error.clone(),
        }
    }

    /// Joins the pending refresh if there is one. On failure the cache keeps
    /// its previous snapshot.
    pub async fn refresh(&self) -> RefreshResult {
        let pending = {
            let mut state = lock(&self.inner.state);
            match &state.in_flight {
                Some(in_flight) => {
                    debug!(seq = in_flight.seq, "joining in-flight appointment refresh");
                    in_flight.result.clone()
                }
                None => self.start(&mut state, false),
            }
        };
        pending.await
    }

    /// Supersedes a pending ordinary refresh. A pending forced one is joined.
    pub async fn force_refresh(&self) -> RefreshResult {
        let pending = {
            let mut state = lock(&self.inner.state);
            match &state.in_flight {
                Some(in_flight) if in_flight.forced => {
                    debug!(seq = in_flight.seq, "joining in-flight forced appointment refresh");
                    in_flight.result.clone()
                }
                _ => self.start(&mut state, true),
            }
        };
        pending.await
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(Arc<AppointmentSnapshot>) + Send + Sync + 'static,
    {
        let callback: SnapshotCallback = Arc::new(callback);
        self.inner.registry.subscribe(callback)
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.inner.registry.unsubscribe(handle);
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.registry.len()
    }

    fn start(&self, state: &mut CacheState, forced: bool) -> SharedRefresh {
        state.next_seq += 1;
        let seq = state.next_seq;
        info!(seq, forced, "starting appointment refresh");

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move { inner.run(seq).await });
        let result = async move {
            task.await
                .unwrap_or_else(|e| Err(RefreshError::Aborted(e.to_string())))
        }
        .boxed()
        .shared();

        state.in_flight = Some(InFlight {
            seq,
            forced,
            result: result.clone(),
        });
        result
    }
}

struct InFlightGuard<'a> {
    inner: &'a Inner,
    seq: u64,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut state = lock(&self.inner.state);
        if state.in_flight.as_ref().is_some_and(|f| f.seq == self.seq) {
            state.in_flight = None;
        }
    }
}

impl Inner {
    async fn run(&self, seq: u64) -> RefreshResult {
        let _guard = InFlightGuard { inner: self, seq };

        match self.fetch_with_retry(seq).await {
            Ok(snapshot) => Ok(self.apply(seq, snapshot)),
            Err(e) => {
                warn!(seq, error = %e, "appointment refresh failed, keeping cached data");
                let mut state = lock(&self.state);
                if seq > state.applied_seq {
                    state.last_error = Some(e.to_string());
                }
                Err(RefreshError::from(e))
            }
        }
    }

    async fn fetch_with_retry(&self, seq: u64) -> Result<AppointmentSnapshot, FetchError> {
        let mut attempt = 1;
        loop {
            match self.source.fetch().await {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay(attempt);
                    warn!(seq, attempt, ?delay, error = %e, "retrying appointment fetch");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn apply(&self, seq: u64, snapshot: AppointmentSnapshot) -> Arc<AppointmentSnapshot> {
        let applied = {
            let mut state = lock(&self.state);
            if seq <= state.applied_seq {
                debug!(
                    seq,
                    applied = state.applied_seq,
                    "discarding appointment snapshot older than the applied one"
                );
                return Arc::clone(&state.current);
            }
            state.current = Arc::new(snapshot);
            state.applied_seq = seq;
            state.refreshed_at = Some(Utc::now());
            state.last_error = None;
            Arc::clone(&state.current)
        };
        info!(seq, appointments = applied.len(), "appointment snapshot applied");

        self.deliver(seq, Arc::clone(&applied));
        applied
    }

    // Two applies can race past the state lock; the later sequence wins.
    fn deliver(&self, seq: u64, snapshot: Arc<AppointmentSnapshot>) {
        let mut delivered = lock(&self.delivered);
        if seq <= *delivered {
            debug!(seq, delivered = *delivered, "skipping delivery of superseded snapshot");
            return;
        }
        *delivered = seq;
        if self.registry.is_empty() {
            debug!(seq, "no subscribers to notify");
            return;
        }
        self.registry.notify_all(snapshot);
    }
}
