//! Request-coalescing cache with positive and negative entries.
//!
//! Lookup order is success entry, negative entry, in-flight fetch, new
//! fetch. A new fetch is spawned and its handle registered as a shared
//! future under the same lock that checked for an existing one, so one key
//! never has two fetches outstanding. The fetch runs to completion even when
//! every caller gives up waiting. The lock is never held across an `.await`.

mod bounded;

use bounded::{BoundedMap, Entry};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tickvault_domain::error::SyncError;
use tokio::task::JoinError;
use tokio::time::Instant;
use tracing::Instrument;

pub type ErrorClassifier<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

type SharedFetch<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

/// A background fetch or write that panicked or was cancelled before it
/// produced a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub message: String,
}

impl From<JoinError> for TaskFailure {
    fn from(err: JoinError) -> Self {
        let message = if err.is_panic() {
            "task panicked".to_string()
        } else {
            "task cancelled".to_string()
        };
        Self { message }
    }
}

impl std::fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<TaskFailure> for SyncError {
    fn from(err: TaskFailure) -> Self {
        SyncError::Internal(err.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOptions {
    /// `None` keeps successful values until evicted or invalidated.
    pub success_ttl: Option<Duration>,
    pub error_ttl: Duration,
    pub max_keys: usize,
    pub max_error_keys: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            success_ttl: None,
            error_ttl: Duration::from_secs(5 * 60),
            max_keys: 10_000,
            max_error_keys: 1_000,
        }
    }
}

impl CacheOptions {
    /// `success_ttl_secs = 0` never expires. `error_ttl_secs = 0` disables
    /// negative caching.
    pub fn from_secs(
        success_ttl_secs: u64,
        error_ttl_secs: u64,
        max_keys: usize,
        max_error_keys: usize,
    ) -> Self {
        Self {
            success_ttl: (success_ttl_secs > 0).then(|| Duration::from_secs(success_ttl_secs)),
            error_ttl: Duration::from_secs(error_ttl_secs),
            max_keys,
            max_error_keys,
        }
    }
}

struct CacheState<V, E> {
    success: BoundedMap<V>,
    errors: BoundedMap<E>,
    in_flight: HashMap<String, SharedFetch<V, E>>,
}

pub struct CoalescingCache<V, E> {
    name: &'static str,
    options: CacheOptions,
    is_cacheable: ErrorClassifier<E>,
    state: Arc<Mutex<CacheState<V, E>>>,
}

impl<V, E> Clone for CoalescingCache<V, E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            options: self.options.clone(),
            is_cacheable: Arc::clone(&self.is_cacheable),
            state: Arc::clone(&self.state),
        }
    }
}

impl<V, E> CoalescingCache<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + std::fmt::Display + From<TaskFailure> + 'static,
{
    /// Cache that negative-caches every failure.
    pub fn new(name: &'static str, options: CacheOptions) -> Self {
        Self::with_classifier(name, options, Arc::new(|_: &E| true))
    }

    pub fn with_classifier(
        name: &'static str,
        options: CacheOptions,
        is_cacheable: ErrorClassifier<E>,
    ) -> Self {
        let state = CacheState {
            success: BoundedMap::new(options.max_keys),
            errors: BoundedMap::new(options.max_error_keys),
            in_flight: HashMap::new(),
        };
        Self {
            name,
            options,
            is_cacheable,
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the cached value for `key`, or runs `fetch` at most once for
    /// all concurrent callers of the same key.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let pending = {
            let mut state = self.state.lock();
            let now = Instant::now();

            if let Some(value) = state.success.get_live(key, now) {
                let value = value.clone();
                self.record_lookup("hit");
                tracing::debug!(cache = self.name, key, "cache hit");
                return Ok(value);
            }

            if let Some(err) = state.errors.get_live(key, now) {
                let err = err.clone();
                self.record_lookup("negative_hit");
                tracing::debug!(cache = self.name, key, "error cache hit");
                return Err(err);
            }

            match state.in_flight.get(key) {
                Some(existing) => {
                    self.record_lookup("joined");
                    tracing::debug!(cache = self.name, key, "joining in-flight request");
                    existing.clone()
                }
                None => {
                    self.record_lookup("miss");
                    let shared = self.settling_fetch(key.to_string(), fetch).shared();
                    state.in_flight.insert(key.to_string(), shared.clone());
                    shared
                }
            }
        };

        pending.await
    }

    /// Drops both the success and the negative entry for `key`.
    pub fn invalidate(&self, key: &str) {
        let mut state = self.state.lock();
        state.success.remove(key);
        state.errors.remove(key);
    }

    pub fn clear_all(&self) {
        let mut state = self.state.lock();
        state.success.clear();
        state.errors.clear();
    }

    pub fn len(&self) -> usize {
        self.state.lock().success.live_len(Instant::now())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn error_len(&self) -> usize {
        self.state.lock().errors.live_len(Instant::now())
    }

    pub fn in_flight_len(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    /// Spawns `fetch` and returns a handle that resolves to its outcome.
    /// Must be called with the state lock held so the marker is registered
    /// before the task can try to remove it.
    fn settling_fetch<F, Fut>(&self, key: String, fetch: F) -> BoxFuture<'static, Result<V, E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let name = self.name;
        let options = self.options.clone();
        let is_cacheable = Arc::clone(&self.is_cacheable);
        let state = Arc::clone(&self.state);

        let task = async move {
            let mut marker = InFlightMarker {
                state: Arc::clone(&state),
                key: key.clone(),
                armed: true,
            };
            let result = fetch().await;

            let mut guard = state.lock();
            match &result {
                Ok(value) => {
                    let evicted = guard
                        .success
                        .insert(key.clone(), Entry::new(value.clone(), options.success_ttl));
                    guard.errors.remove(&key);
                    if evicted > 0 {
                        metrics::counter!("tickvault.cache.evictions_total", "cache" => name)
                            .increment(evicted as u64);
                    }
                }
                Err(err) => {
                    let cacheable = is_cacheable(err);
                    if cacheable && !options.error_ttl.is_zero() {
                        guard
                            .errors
                            .insert(key.clone(), Entry::new(err.clone(), Some(options.error_ttl)));
                    }
                    metrics::counter!(
                        "tickvault.cache.fetch_errors_total",
                        "cache" => name,
                        "cacheable" => if cacheable { "true" } else { "false" }
                    )
                    .increment(1);
                    tracing::warn!(cache = name, key = %key, cacheable, error = %err, "fetch failed");
                }
            }
            guard.in_flight.remove(&key);
            marker.armed = false;
            drop(guard);

            result
        };
        let handle = tokio::spawn(task.in_current_span());

        async move {
            match handle.await {
                Ok(result) => result,
                Err(err) => {
                    tracing::error!(cache = name, error = %err, "fetch task failed");
                    Err(E::from(TaskFailure::from(err)))
                }
            }
        }
        .boxed()
    }

    fn record_lookup(&self, outcome: &'static str) {
        metrics::counter!(
            "tickvault.cache.lookups_total",
            "cache" => self.name,
            "outcome" => outcome
        )
        .increment(1);
    }
}

/// Clears the in-flight entry if the fetch task unwinds or is dropped
/// before settling normally.
struct InFlightMarker<V, E> {
    state: Arc<Mutex<CacheState<V, E>>>,
    key: String,
    armed: bool,
}

impl<V, E> Drop for InFlightMarker<V, E> {
    fn drop(&mut self) {
        if self.armed {
            self.state.lock().in_flight.remove(&self.key);
        }
    }
}
