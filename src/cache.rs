//! TTL cache interface used for throttle bookkeeping.

use chrono::TimeDelta;
use std::future::Future;
use std::sync::Arc;

use crate::error::Result;

/// Value written under a throttled key.
pub const SENTINEL: &str = "1";

/// Outcome of [`TtlCache::fetch_or_compute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched<T> {
    /// A live entry existed; the computation did not run.
    Cached,
    /// No live entry; the computation ran and its result is here.
    Computed(T),
}

/// A key-value cache with per-entry expiry.
///
/// `fetch_or_compute` must be atomic per key: of any number of concurrent
/// callers with the same key, exactly one runs `compute` while the entry is
/// absent or expired; the rest observe [`Fetched::Cached`]. A failed
/// computation leaves no entry behind.
pub trait TtlCache: Send + Sync {
    fn fetch_or_compute<T, F, Fut>(
        &self,
        key: &str,
        ttl: TimeDelta,
        compute: F,
    ) -> impl Future<Output = Result<Fetched<T>>> + Send
    where
        T: Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send;

    /// Write or refresh an entry unconditionally.
    fn write(&self, key: &str, value: &str, ttl: TimeDelta)
    -> impl Future<Output = Result<()>> + Send;
}

impl<C: TtlCache> TtlCache for Arc<C> {
    fn fetch_or_compute<T, F, Fut>(
        &self,
        key: &str,
        ttl: TimeDelta,
        compute: F,
    ) -> impl Future<Output = Result<Fetched<T>>> + Send
    where
        T: Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
    {
        (**self).fetch_or_compute(key, ttl, compute)
    }

    fn write(
        &self,
        key: &str,
        value: &str,
        ttl: TimeDelta,
    ) -> impl Future<Output = Result<()>> + Send {
        (**self).write(key, value, ttl)
    }
}
