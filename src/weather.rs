//! Caches the upstream weather call so the tick doesn't hit the network
//! every second, and keeps serving the last good reading if the upstream
//! call starts failing.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{Result, WeatherServiceSnafu};

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn current_temperature(&self) -> Result<f64>;
}

pub struct CachedWeather<P: WeatherProvider> {
    provider: P,
    ttl: Duration,
    cached: Option<(f64, DateTime<Utc>)>,
}

impl<P: WeatherProvider> CachedWeather<P> {
    pub fn new(provider: P, ttl: Duration) -> Self {
        Self { provider, ttl, cached: None }
    }

    /// Returns the cached reading if still fresh; otherwise attempts a
    /// refresh. On refresh failure, falls back to the stale cached reading.
    /// With no cache at all and a failing refresh, propagates the error.
    pub async fn get(&mut self, now: DateTime<Utc>) -> Result<f64> {
        if let Some((value, last_update)) = self.cached {
            if last_update + chrono::Duration::from_std(self.ttl).unwrap() >= now {
                return Ok(value);
            }
        }

        match self.provider.current_temperature().await {
            Ok(value) => {
                self.cached = Some((value, now));
                Ok(value)
            }
            Err(e) => match self.cached {
                Some((value, _)) => Ok(value),
                None => Err(e),
            },
        }
    }
}

/// A `now`-parameterised source of the outside temperature, shared
/// read-write across zone controllers so the underlying weather call is
/// deduplicated between them.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn current_temperature(&self, now: DateTime<Utc>) -> Result<f64>;
}

pub struct SharedCachedWeather<P: WeatherProvider> {
    inner: tokio::sync::Mutex<CachedWeather<P>>,
}

impl<P: WeatherProvider> SharedCachedWeather<P> {
    pub fn new(provider: P, ttl: Duration) -> Self {
        Self { inner: tokio::sync::Mutex::new(CachedWeather::new(provider, ttl)) }
    }
}

#[async_trait]
impl<P: WeatherProvider> WeatherSource for SharedCachedWeather<P> {
    async fn current_temperature(&self, now: DateTime<Utc>) -> Result<f64> {
        self.inner.lock().await.get(now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    struct FlakyProvider {
        calls: Arc<AtomicUsize>,
        fail_after: usize,
        value: f64,
    }

    #[async_trait]
    impl WeatherProvider for FlakyProvider {
        async fn current_temperature(&self) -> Result<f64> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n >= self.fail_after {
                WeatherServiceSnafu.fail()
            } else {
                Ok(self.value)
            }
        }
    }

    #[tokio::test]
    async fn first_call_with_no_cache_and_failing_upstream_is_an_error() {
        let provider = FlakyProvider { calls: Arc::new(AtomicUsize::new(0)), fail_after: 0, value: 10.0 };
        let mut weather = CachedWeather::new(provider, Duration::from_secs(600));
        assert!(weather.get(t(0)).await.is_err());
    }

    #[tokio::test]
    async fn stale_reading_is_served_when_refresh_fails() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = FlakyProvider { calls: calls.clone(), fail_after: 1, value: 10.0 };
        let mut weather = CachedWeather::new(provider, Duration::from_secs(600));

        assert_eq!(weather.get(t(0)).await.unwrap(), 10.0);
        // Cache expired, refresh fails, but we still get the stale value.
        assert_eq!(weather.get(t(10_000)).await.unwrap(), 10.0);
    }

    #[tokio::test]
    async fn fresh_cache_avoids_a_second_network_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = FlakyProvider { calls: calls.clone(), fail_after: 100, value: 10.0 };
        let mut weather = CachedWeather::new(provider, Duration::from_secs(600));

        weather.get(t(0)).await.unwrap();
        weather.get(t(1)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
