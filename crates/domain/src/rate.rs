//! Exchange-rate capability.
//!
//! Consumers depend only on [`RateService`]. [`CachedRateService`] is the
//! production implementation: it asks a chain of [`RateFetcher`]s in order
//! and keeps the first good value for a fixed time-to-live.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Default lifetime of a cached rate.
pub const DEFAULT_RATE_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

/// Errors produced while obtaining the current rate.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RateError {
    /// A single source failed (network, status code, response shape).
    #[error("rate source {source_name} failed: {message}")]
    Source {
        source_name: String,
        message: String,
    },

    /// A source answered with a value that is not a usable rate.
    #[error("rate source {source_name} returned unusable value {value}")]
    Invalid { source_name: String, value: f64 },

    /// Every configured source failed.
    #[error("no rate source available: {0}")]
    Unavailable(String),
}

/// Returns the current exchange rate.
#[async_trait]
pub trait RateService: Send + Sync {
    async fn get_rate(&self) -> Result<f64, RateError>;
}

/// A single upstream source of the rate.
#[async_trait]
pub trait RateFetcher: Send + Sync {
    /// Short name used in logs and metrics.
    fn name(&self) -> &str;

    async fn fetch(&self) -> Result<f64, RateError>;
}

#[derive(Debug, Clone, Copy)]
struct CachedRate {
    value: f64,
    fetched_at: Instant,
}

/// Rate service backed by a fetcher chain and a TTL cache.
pub struct CachedRateService {
    fetchers: Vec<Arc<dyn RateFetcher>>,
    ttl: Duration,
    cached: RwLock<Option<CachedRate>>,
}

impl CachedRateService {
    /// Creates a service that tries `fetchers` in order.
    pub fn new(fetchers: Vec<Arc<dyn RateFetcher>>, ttl: Duration) -> Self {
        Self {
            fetchers,
            ttl,
            cached: RwLock::new(None),
        }
    }

    fn fresh(&self, cached: Option<CachedRate>) -> Option<f64> {
        cached
            .filter(|c| c.fetched_at.elapsed() < self.ttl)
            .map(|c| c.value)
    }

    async fn fetch_from_chain(&self) -> Result<f64, RateError> {
        let mut failures = Vec::with_capacity(self.fetchers.len());
        for fetcher in &self.fetchers {
            let result = fetcher.fetch().await.and_then(|value| {
                if value.is_finite() && value > 0.0 {
                    Ok(value)
                } else {
                    Err(RateError::Invalid {
                        source_name: fetcher.name().to_string(),
                        value,
                    })
                }
            });

            match result {
                Ok(value) => {
                    tracing::debug!(source = fetcher.name(), value, "rate fetched");
                    return Ok(value);
                }
                Err(e) => {
                    tracing::warn!(source = fetcher.name(), error = %e, "rate source failed");
                    metrics::counter!(
                        "rate_fetch_failures_total",
                        "source" => fetcher.name().to_string()
                    )
                    .increment(1);
                    failures.push(e.to_string());
                }
            }
        }

        if failures.is_empty() {
            return Err(RateError::Unavailable("no sources configured".to_string()));
        }
        Err(RateError::Unavailable(failures.join("; ")))
    }
}

#[async_trait]
impl RateService for CachedRateService {
    #[tracing::instrument(skip(self))]
    async fn get_rate(&self) -> Result<f64, RateError> {
        if let Some(value) = self.fresh(*self.cached.read().await) {
            metrics::counter!("rate_cache_hits_total").increment(1);
            return Ok(value);
        }

        // Hold the write lock across the fetch so concurrent callers share one upstream call.
        let mut cached = self.cached.write().await;
        if let Some(value) = self.fresh(*cached) {
            return Ok(value);
        }

        let value = self.fetch_from_chain().await?;
        *cached = Some(CachedRate {
            value,
            fetched_at: Instant::now(),
        });
        Ok(value)
    }
}

/// Fixed-answer rate service for testing.
#[derive(Clone)]
pub struct StaticRateService {
    answer: Arc<RwLock<Result<f64, RateError>>>,
    calls: Arc<AtomicUsize>,
}

impl StaticRateService {
    /// Always returns `rate`.
    pub fn new(rate: f64) -> Self {
        Self {
            answer: Arc::new(RwLock::new(Ok(rate))),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Always fails with [`RateError::Unavailable`].
    pub fn failing(message: impl Into<String>) -> Self {
        let mut service = Self::new(0.0);
        service.answer = Arc::new(RwLock::new(Err(RateError::Unavailable(message.into()))));
        service
    }

    pub async fn set_rate(&self, rate: f64) {
        *self.answer.write().await = Ok(rate);
    }

    pub async fn set_failure(&self, message: impl Into<String>) {
        *self.answer.write().await = Err(RateError::Unavailable(message.into()));
    }

    /// Returns how many times the rate was requested.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RateService for StaticRateService {
    async fn get_rate(&self) -> Result<f64, RateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.read().await.clone()
    }
}
