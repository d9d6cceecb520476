//! Lazily-populated, periodically-refreshed, stale-tolerant cache.
//!
//! A [`RefreshableCache`] is parameterized by a fetch function and an interval.
//! It publishes at most one value at a time and runs at most one fetch at a
//! time:
//!
//! - The first [`get`](RefreshableCache::get) fetches and waits. Concurrent
//!   first callers queue behind the same fetch instead of starting their own,
//!   and share its error when it fails.
//! - A background timer refetches every interval. A failed background refresh
//!   is logged and the last good value keeps being served.
//! - Until one fetch has succeeded, `get` returns the fetch error.
//!
//! Readers clone an `Arc` out of a read lock, so a published value is always a
//! complete generation.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{Error, Result};

/// Boxed fetch function producing a fresh value.
pub type FetchFn<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// A published value and when it was fetched.
struct Published<T> {
    value: Arc<T>,
    fetched_at: Instant,
}

/// Outcome of the most recent completed fetch.
#[derive(Default)]
struct LastAttempt {
    generation: u64,
    failure: Option<Error>,
}

struct Inner<T> {
    name: String,
    fetch: FetchFn<T>,
    current: RwLock<Option<Published<T>>>,
    last_attempt: Mutex<LastAttempt>,
    /// Held for the whole duration of a fetch; serializes writers.
    in_flight: tokio::sync::Mutex<()>,
}

impl<T: Send + Sync + 'static> Inner<T> {
    fn published(&self) -> Option<Arc<T>> {
        self.current.read().as_ref().map(|p| Arc::clone(&p.value))
    }

    /// Must be called with `in_flight` held.
    async fn fetch_and_publish(&self) -> Result<Arc<T>> {
        let started = Instant::now();
        let result = (self.fetch)().await;

        let mut last = self.last_attempt.lock();
        last.generation += 1;
        match result {
            Ok(value) => {
                last.failure = None;
                drop(last);
                let value = Arc::new(value);
                *self.current.write() = Some(Published {
                    value: Arc::clone(&value),
                    fetched_at: Instant::now(),
                });
                debug!(
                    cache = %self.name,
                    elapsed_ms = started.elapsed().as_millis(),
                    "Published fresh value"
                );
                Ok(value)
            }
            Err(e) => {
                last.failure = Some(e.replicate());
                Err(e)
            }
        }
    }

    async fn populate(&self) -> Result<Arc<T>> {
        let seen = self.last_attempt.lock().generation;
        let _guard = self.in_flight.lock().await;

        // Another caller may have published while we waited.
        if let Some(value) = self.published() {
            return Ok(value);
        }
        // Or failed: share its outcome instead of fetching again.
        {
            let last = self.last_attempt.lock();
            if last.generation != seen {
                if let Some(failure) = &last.failure {
                    return Err(failure.replicate());
                }
            }
        }
        self.fetch_and_publish().await
    }

    async fn refresh(&self) -> Result<Arc<T>> {
        let _guard = self.in_flight.lock().await;
        self.fetch_and_publish().await
    }
}

/// Generic TTL-refreshed cache. See the [module docs](self).
pub struct RefreshableCache<T> {
    inner: Arc<Inner<T>>,
    interval: Duration,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + Sync + 'static> RefreshableCache<T> {
    /// Create a cache and start its background refresh timer.
    ///
    /// Must be called from within a Tokio runtime. Nothing is fetched until the
    /// first `get` or the first timer tick.
    pub fn new<F>(name: impl Into<String>, interval: Duration, fetch: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<T>> + Send + Sync + 'static,
    {
        let cache = Self::stopped(name, interval, fetch);
        cache.start();
        cache
    }

    /// Create a cache without starting the background timer.
    pub fn stopped<F>(name: impl Into<String>, interval: Duration, fetch: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<T>> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                fetch: Arc::new(fetch),
                current: RwLock::new(None),
                last_attempt: Mutex::new(LastAttempt::default()),
                in_flight: tokio::sync::Mutex::new(()),
            }),
            interval,
            timer: Mutex::new(None),
        }
    }

    /// Return the published value, fetching it first if there is none yet.
    pub async fn get(&self) -> Result<Arc<T>> {
        if let Some(value) = self.inner.published() {
            return Ok(value);
        }
        self.inner.populate().await
    }

    /// Fetch now and publish on success. The error is returned to the caller and
    /// the previous value stays published.
    pub async fn refresh(&self) -> Result<Arc<T>> {
        self.inner.refresh().await
    }

    /// The published value without fetching
    #[must_use]
    pub fn peek(&self) -> Option<Arc<T>> {
        self.inner.published()
    }

    /// Age of the published value
    #[must_use]
    pub fn age(&self) -> Option<Duration> {
        self.inner
            .current
            .read()
            .as_ref()
            .map(|p| p.fetched_at.elapsed())
    }

    /// Refresh interval
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the background timer is running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.timer.lock().as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Start the background timer. No-op when already running.
    pub fn start(&self) {
        let mut timer = self.timer.lock();
        if timer.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        *timer = Some(spawn_timer(Arc::downgrade(&self.inner), self.interval));
    }

    /// Stop the background timer. The published value is kept.
    pub fn stop(&self) {
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
            info!(cache = %self.inner.name, "Stopped background refresh");
        }
    }
}

impl<T> Drop for RefreshableCache<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.get_mut().take() {
            handle.abort();
        }
    }
}

fn spawn_timer<T: Send + Sync + 'static>(inner: Weak<Inner<T>>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(inner) = inner.upgrade() else {
                break;
            };
            match inner.refresh().await {
                Ok(_) => debug!(cache = %inner.name, "Background refresh succeeded"),
                Err(e) if inner.published().is_some() => {
                    warn!(cache = %inner.name, error = %e, "Background refresh failed, serving last good value");
                }
                Err(e) => {
                    warn!(cache = %inner.name, error = %e, "Background refresh failed, nothing published yet");
                }
            }
        }
    })
}
