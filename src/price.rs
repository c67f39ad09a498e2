//! Price oracle: upstream quote seam plus a caching layer.
//!
//! The upstream source is an external collaborator; only its contract lives
//! here. The oracle caches the last good quote per currency with a bounded
//! freshness window and serves the stale quote when the upstream fails. It
//! never returns a non-positive or NaN price.

use crate::errors::{EngineError, EngineResult};
use crate::round::Currency;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Upstream USD quote source for a supported asset.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch_usd_price(&self, currency: Currency) -> EngineResult<f64>;
}

#[derive(Clone, Copy)]
struct CachedQuote {
    price: f64,
    fetched_at: Instant,
}

/// Caching price oracle over a [`PriceSource`].
pub struct PriceOracle {
    source: Arc<dyn PriceSource>,
    cache: DashMap<Currency, CachedQuote>,
    max_age: Duration,
}

impl PriceOracle {
    pub fn new(source: Arc<dyn PriceSource>, max_age: Duration) -> Self {
        Self {
            source,
            cache: DashMap::new(),
            max_age,
        }
    }

    /// Current USD price for `currency`.
    ///
    /// Serves the cached quote while fresh; otherwise refetches. On upstream
    /// failure the last cached quote (of any age) is returned, and only an
    /// empty cache surfaces `PriceUnavailable`.
    pub async fn usd_price(&self, currency: Currency) -> EngineResult<f64> {
        if let Some(quote) = self.cache.get(&currency) {
            if quote.fetched_at.elapsed() < self.max_age {
                return Ok(quote.price);
            }
        }

        match self.source.fetch_usd_price(currency).await {
            Ok(price) if price.is_finite() && price > 0.0 => {
                self.cache.insert(
                    currency,
                    CachedQuote {
                        price,
                        fetched_at: Instant::now(),
                    },
                );
                Ok(price)
            }
            Ok(bad) => {
                tracing::warn!(%currency, price = bad, "Upstream returned unusable price");
                self.stale_or_unavailable(currency)
            }
            Err(e) => {
                tracing::warn!(%currency, error = %e, "Upstream price fetch failed");
                self.stale_or_unavailable(currency)
            }
        }
    }

    fn stale_or_unavailable(&self, currency: Currency) -> EngineResult<f64> {
        match self.cache.get(&currency) {
            Some(quote) => {
                tracing::warn!(%currency, price = quote.price, "Serving stale cached price");
                Ok(quote.price)
            }
            None => Err(EngineError::PriceUnavailable(currency)),
        }
    }
}

/// Convert a USD amount into crypto at the given price.
pub fn usd_to_crypto(usd_amount: f64, price: f64) -> EngineResult<f64> {
    if !usd_amount.is_finite() || usd_amount <= 0.0 {
        return Err(EngineError::InvalidInput(
            "USD amount must be a positive number".to_string(),
        ));
    }
    check_price(price)?;
    Ok(usd_amount / price)
}

/// Convert a crypto amount into USD at the given price.
pub fn crypto_to_usd(crypto_amount: f64, price: f64) -> EngineResult<f64> {
    if !crypto_amount.is_finite() || crypto_amount < 0.0 {
        return Err(EngineError::InvalidInput(
            "Crypto amount cannot be negative".to_string(),
        ));
    }
    check_price(price)?;
    Ok(crypto_amount * price)
}

fn check_price(price: f64) -> EngineResult<()> {
    if !price.is_finite() || price <= 0.0 {
        return Err(EngineError::InvalidInput(
            "Price must be a positive number".to_string(),
        ));
    }
    Ok(())
}

/// Fixed-quote source for development and tests. Upstream availability can
/// be toggled to exercise the oracle's fallback path.
pub struct FixedPriceSource {
    prices: DashMap<Currency, f64>,
    available: AtomicBool,
}

impl FixedPriceSource {
    pub fn new() -> Self {
        Self {
            prices: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }

    /// Typical development quotes.
    pub fn with_defaults() -> Self {
        let source = Self::new();
        source.set_price(Currency::Btc, 60_000.0);
        source.set_price(Currency::Eth, 3_000.0);
        source
    }

    pub fn set_price(&self, currency: Currency, price: f64) {
        self.prices.insert(currency, price);
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

impl Default for FixedPriceSource {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[async_trait]
impl PriceSource for FixedPriceSource {
    async fn fetch_usd_price(&self, currency: Currency) -> EngineResult<f64> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(EngineError::PriceUnavailable(currency));
        }
        self.prices
            .get(&currency)
            .map(|p| *p)
            .ok_or(EngineError::PriceUnavailable(currency))
    }
}
