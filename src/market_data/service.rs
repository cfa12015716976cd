use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::PriceConfig;

use super::{FeedQuote, FeedQuotes, PriceSource};

#[derive(Debug, Default)]
struct CacheState {
    quotes: FeedQuotes,
    last_fetch: Option<DateTime<Utc>>,
}

/// Clears an in-flight flag when the guarded work ends, including by cancellation.
pub(crate) struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    pub(crate) fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Shared spot-price cache in front of a [`PriceSource`].
///
/// At most one upstream request runs at a time. Callers arriving while one is
/// in flight, or while the cache is younger than the freshness window, get the
/// cache as it stands. A failed request leaves the cache untouched.
pub struct PriceService {
    source: Arc<dyn PriceSource>,
    clock: Arc<dyn Clock>,
    freshness_window: Duration,
    /// USD value of one unit of local currency.
    fiat_conversion_rate: Decimal,
    cache: RwLock<CacheState>,
    in_flight: AtomicBool,
}

impl PriceService {
    pub fn new(source: Arc<dyn PriceSource>) -> Self {
        let defaults = PriceConfig::default();
        Self {
            source,
            clock: Arc::new(SystemClock),
            freshness_window: defaults.freshness_window,
            fiat_conversion_rate: defaults.fiat_conversion_rate,
            cache: RwLock::new(CacheState::default()),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn from_config(source: Arc<dyn PriceSource>, config: &PriceConfig) -> Self {
        Self::new(source)
            .with_freshness_window(config.freshness_window)
            .with_fiat_conversion_rate(config.fiat_conversion_rate)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_freshness_window(mut self, window: Duration) -> Self {
        self.freshness_window = window;
        self
    }

    pub fn with_fiat_conversion_rate(mut self, rate: Decimal) -> Self {
        self.fiat_conversion_rate = rate;
        self
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Current cache contents without touching the network.
    pub fn cached(&self) -> FeedQuotes {
        self.read_cache().quotes.clone()
    }

    pub fn last_fetch(&self) -> Option<DateTime<Utc>> {
        self.read_cache().last_fetch
    }

    /// Drop every cached quote and forget the last fetch time.
    pub fn clear(&self) {
        let mut cache = self.write_cache();
        *cache = CacheState::default();
    }

    pub fn is_refreshing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Refresh quotes for `ids`, issuing at most one upstream request.
    ///
    /// Never fails: on any upstream error the previous cache is returned.
    pub async fn refresh(&self, ids: &[String]) -> FeedQuotes {
        if self.is_fresh() {
            debug!("price cache is fresh; skipping fetch");
            return self.cached();
        }

        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            debug!("price refresh already in flight; serving cache");
            return self.cached();
        };

        let mut ids: Vec<String> = ids
            .iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        ids.sort();
        ids.dedup();

        match self.source.fetch_usd_prices(&ids).await {
            Ok(prices) => {
                let now = self.clock.now();
                let quotes: FeedQuotes = prices
                    .into_iter()
                    .map(|(id, price_usd)| {
                        let quote = FeedQuote {
                            price_usd,
                            price_local: self.to_local(price_usd),
                            fetched_at: now,
                        };
                        (id, quote)
                    })
                    .collect();

                info!(
                    source = %self.source.name(),
                    requested = ids.len(),
                    received = quotes.len(),
                    "price cache refreshed"
                );

                let mut cache = self.write_cache();
                cache.quotes = quotes;
                cache.last_fetch = Some(now);
                cache.quotes.clone()
            }
            Err(err) => {
                warn!(
                    source = %self.source.name(),
                    error = %err,
                    "price fetch failed; keeping cached quotes"
                );
                self.cached()
            }
        }
    }

    fn to_local(&self, price_usd: Decimal) -> Decimal {
        price_usd
            .checked_div(self.fiat_conversion_rate)
            .unwrap_or(Decimal::ZERO)
    }

    fn is_fresh(&self) -> bool {
        let cache = self.read_cache();
        let Some(last_fetch) = cache.last_fetch else {
            return false;
        };
        if cache.quotes.is_empty() {
            return false;
        }
        let age = (self.clock.now() - last_fetch)
            .to_std()
            .unwrap_or(Duration::MAX);
        age < self.freshness_window
    }

    fn read_cache(&self) -> std::sync::RwLockReadGuard<'_, CacheState> {
        self.cache.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_cache(&self) -> std::sync::RwLockWriteGuard<'_, CacheState> {
        self.cache.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;

    use anyhow::{anyhow, Result};
    use chrono::TimeZone;
    use tokio::sync::Notify;

    use super::*;
    use crate::clock::FixedClock;

    struct CountingSource {
        calls: AtomicUsize,
        prices: HashMap<String, Decimal>,
        fail: AtomicBool,
    }

    impl CountingSource {
        fn new(prices: &[(&str, i64)]) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                prices: prices
                    .iter()
                    .map(|(id, p)| (id.to_string(), Decimal::from(*p)))
                    .collect(),
                fail: AtomicBool::new(false),
            }
        }
    }

    #[async_trait::async_trait]
    impl PriceSource for CountingSource {
        async fn fetch_usd_prices(&self, _ids: &[String]) -> Result<HashMap<String, Decimal>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(anyhow!("upstream down"));
            }
            Ok(self.prices.clone())
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 5, 12, 0, 0).unwrap()
    }

    fn ids() -> Vec<String> {
        vec!["bitcoin".to_string(), "ethereum".to_string()]
    }

    #[tokio::test]
    async fn converts_to_local_currency_with_fixed_rate() {
        let source = Arc::new(CountingSource::new(&[("bitcoin", 50_000)]));
        let service = PriceService::new(source).with_fiat_conversion_rate(Decimal::new(125, 4));

        let quotes = service.refresh(&ids()).await;
        let btc = &quotes["bitcoin"];
        assert_eq!(btc.price_usd, Decimal::from(50_000));
        assert_eq!(btc.price_local, Decimal::from(4_000_000));
    }

    #[tokio::test]
    async fn second_call_inside_window_is_served_from_cache() {
        let clock = Arc::new(FixedClock::new(start()));
        let source = Arc::new(CountingSource::new(&[("bitcoin", 1)]));
        let service = PriceService::new(source.clone())
            .with_clock(clock.clone())
            .with_freshness_window(Duration::from_secs(60));

        service.refresh(&ids()).await;
        clock.advance(chrono::Duration::seconds(10));
        service.refresh(&ids()).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        clock.advance(chrono::Duration::seconds(60));
        service.refresh(&ids()).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_cache_is_never_fresh() {
        let clock = Arc::new(FixedClock::new(start()));
        let source = Arc::new(CountingSource::new(&[]));
        let service = PriceService::new(source.clone()).with_clock(clock);

        service.refresh(&ids()).await;
        service.refresh(&ids()).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failure_keeps_previous_cache() {
        let clock = Arc::new(FixedClock::new(start()));
        let source = Arc::new(CountingSource::new(&[("bitcoin", 42)]));
        let service = PriceService::new(source.clone()).with_clock(clock.clone());

        let first = service.refresh(&ids()).await;
        assert_eq!(first.len(), 1);

        source.fail.store(true, Ordering::SeqCst);
        clock.advance(chrono::Duration::minutes(5));
        let after_failure = service.refresh(&ids()).await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(after_failure, first);
        assert_eq!(service.last_fetch(), Some(start()));
    }

    #[tokio::test]
    async fn clear_forces_next_fetch() {
        let source = Arc::new(CountingSource::new(&[("bitcoin", 1)]));
        let service = PriceService::new(source.clone());

        service.refresh(&ids()).await;
        service.clear();
        assert!(service.cached().is_empty());
        service.refresh(&ids()).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    struct GatedSource {
        started: Notify,
        release: Notify,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl PriceSource for GatedSource {
        async fn fetch_usd_prices(&self, _ids: &[String]) -> Result<HashMap<String, Decimal>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.started.notify_one();
            self.release.notified().await;
            Ok(HashMap::from([("bitcoin".to_string(), Decimal::from(7))]))
        }

        fn name(&self) -> &str {
            "gated"
        }
    }

    #[tokio::test]
    async fn concurrent_caller_gets_current_cache_while_in_flight() {
        let source = Arc::new(GatedSource {
            started: Notify::new(),
            release: Notify::new(),
            calls: AtomicUsize::new(0),
        });
        let service = Arc::new(PriceService::new(source.clone()));

        let first = {
            let service = service.clone();
            tokio::spawn(async move { service.refresh(&ids()).await })
        };
        source.started.notified().await;
        assert!(service.is_refreshing());

        let concurrent = service.refresh(&ids()).await;
        assert!(concurrent.is_empty(), "in-flight callers see the old cache");

        source.release.notify_one();
        let fetched = first.await.unwrap();
        assert_eq!(fetched["bitcoin"].price_usd, Decimal::from(7));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(!service.is_refreshing());
    }

    #[tokio::test]
    async fn cancelled_refresh_releases_in_flight_flag() {
        let source = Arc::new(GatedSource {
            started: Notify::new(),
            release: Notify::new(),
            calls: AtomicUsize::new(0),
        });
        let service = Arc::new(PriceService::new(source.clone()));

        let task = {
            let service = service.clone();
            tokio::spawn(async move { service.refresh(&ids()).await })
        };
        source.started.notified().await;
        task.abort();
        let _ = task.await;

        assert!(!service.is_refreshing());
    }
}
