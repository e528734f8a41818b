//! Oracle cache with a freshness contract

use crate::error::{OracleError, Result};
use crate::response::{parse_price_response, parse_utxo_response, Asset, ExternalUtxo};
use crate::source::OracleSource;
use covenant_core::{Amount, Clock, Fixed, Height, Timestamp};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Oracle refresh and freshness settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleSettings {
    /// Minimum seconds between two real refreshes
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: i64,
    /// Per-request timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Age after which a price is reported stale
    #[serde(default = "default_price_max_age")]
    pub price_max_age_secs: i64,
    /// Age after which a UTXO record is reported stale
    #[serde(default = "default_utxo_max_age")]
    pub utxo_max_age_secs: i64,
}

fn default_refresh_interval() -> i64 {
    3_600
}

fn default_request_timeout() -> u64 {
    30
}

fn default_price_max_age() -> i64 {
    4 * 3_600
}

fn default_utxo_max_age() -> i64 {
    4 * 3_600
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval(),
            request_timeout_secs: default_request_timeout(),
            price_max_age_secs: default_price_max_age(),
            utxo_max_age_secs: default_utxo_max_age(),
        }
    }
}

/// Cached value tagged with its freshness
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Freshness<T> {
    Fresh(T),
    Stale(T),
    Missing,
}

impl<T> Freshness<T> {
    /// The value if it is fresh
    pub fn fresh(self) -> Option<T> {
        match self {
            Self::Fresh(v) => Some(v),
            _ => None,
        }
    }

    /// The value regardless of age
    pub fn any(self) -> Option<T> {
        match self {
            Self::Fresh(v) | Self::Stale(v) => Some(v),
            Self::Missing => None,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh(_))
    }
}

/// What a `refresh` call did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Inside the rate-limit window; nothing fetched
    Skipped { next_in_secs: i64 },
    /// Round-trip performed
    Refreshed { utxos: usize, prices: usize },
}

#[derive(Clone, Debug)]
struct Stamped<T> {
    value: T,
    fetched_at: Timestamp,
}

/// External UTXO and price cache
pub struct OracleCache {
    settings: OracleSettings,
    clock: Arc<dyn Clock>,
    utxos: RwLock<HashMap<String, Stamped<ExternalUtxo>>>,
    prices: RwLock<HashMap<Asset, Stamped<Fixed>>>,
    last_refresh: Mutex<Option<Timestamp>>,
}

impl OracleCache {
    pub fn new(settings: OracleSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings,
            clock,
            utxos: RwLock::new(HashMap::new()),
            prices: RwLock::new(HashMap::new()),
            last_refresh: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &OracleSettings {
        &self.settings
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.settings.request_timeout_secs)
    }

    async fn bounded<T>(&self, request: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout(), request).await {
            Ok(result) => result,
            Err(_) => Err(OracleError::Timeout(self.settings.request_timeout_secs)),
        }
    }

    /// Fetch the UTXO list and every price, at most once per refresh interval.
    ///
    /// The interval is claimed before the round-trip, so a failing oracle is
    /// not hammered. On failure previously cached data is kept.
    pub async fn refresh(&self, source: &dyn OracleSource, height: Height) -> Result<RefreshOutcome> {
        let now = self.clock.now();
        {
            let mut last = self.last_refresh.lock();
            if let Some(previous) = *last {
                let elapsed = now - previous;
                if elapsed < self.settings.refresh_interval_secs {
                    return Ok(RefreshOutcome::Skipped {
                        next_in_secs: self.settings.refresh_interval_secs - elapsed,
                    });
                }
            }
            *last = Some(now);
        }

        let body = match self.bounded(source.fetch_utxos(height)).await {
            Ok(body) => body,
            Err(e) => {
                warn!(height, error = %e, "Oracle UTXO refresh failed; keeping cached data");
                return Err(e);
            }
        };
        let utxos = self.ingest_utxos(&body, now);

        let mut prices = 0;
        for asset in Asset::ALL {
            match self.bounded(source.fetch_price(asset)).await {
                Ok(body) => match parse_price_response(&body) {
                    Some(price) => {
                        self.set_price(asset, price, now);
                        prices += 1;
                    }
                    None => warn!(%asset, "Malformed price quote"),
                },
                Err(e) => warn!(%asset, error = %e, "Price refresh failed"),
            }
        }

        info!(height, utxos, prices, "Oracle cache refreshed");
        Ok(RefreshOutcome::Refreshed { utxos, prices })
    }

    /// Fetch one external UTXO outside the refresh cycle
    pub async fn refresh_utxo(&self, source: &dyn OracleSource, id: &str) -> Result<ExternalUtxo> {
        let body = self.bounded(source.fetch_utxo(id)).await?;
        let now = self.clock.now();
        self.ingest_utxos(&body, now);
        self.query_utxo(id)
            .any()
            .ok_or_else(|| OracleError::Malformed(format!("no record for {id}")))
    }

    /// Decode and store a UTXO list; returns the number of records kept
    pub fn ingest_utxos(&self, body: &str, fetched_at: Timestamp) -> usize {
        let records = parse_utxo_response(body);
        let count = records.len();
        let mut utxos = self.utxos.write();
        for utxo in records {
            debug!(id = %utxo.id, amount = utxo.amount, spent = utxo.spent, "External UTXO");
            utxos.insert(
                utxo.id.clone(),
                Stamped {
                    value: utxo,
                    fetched_at,
                },
            );
        }
        count
    }

    pub fn set_price(&self, asset: Asset, price: Fixed, fetched_at: Timestamp) {
        self.prices.write().insert(
            asset,
            Stamped {
                value: price,
                fetched_at,
            },
        );
    }

    fn classify<T: Clone>(&self, stamped: Option<&Stamped<T>>, max_age: i64) -> Freshness<T> {
        match stamped {
            None => Freshness::Missing,
            Some(s) if self.clock.now() - s.fetched_at > max_age => Freshness::Stale(s.value.clone()),
            Some(s) => Freshness::Fresh(s.value.clone()),
        }
    }

    /// Cached UTXO record. Never touches the network.
    pub fn query_utxo(&self, id: &str) -> Freshness<ExternalUtxo> {
        let utxos = self.utxos.read();
        self.classify(utxos.get(id.trim()), self.settings.utxo_max_age_secs)
    }

    /// Cached price. Never touches the network.
    pub fn price(&self, asset: Asset) -> Freshness<Fixed> {
        let prices = self.prices.read();
        self.classify(prices.get(&asset), self.settings.price_max_age_secs)
    }

    /// Unspent amount backing `id`, zero when unknown or spent. Stale data is
    /// used as-is.
    pub fn resolve_amount(&self, id: &str) -> (Amount, String) {
        match self.query_utxo(id).any() {
            Some(utxo) => (utxo.live_amount(), utxo.address),
            None => (0, String::new()),
        }
    }

    pub fn utxo_count(&self) -> usize {
        self.utxos.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ScriptedSource;
    use covenant_core::{ManualClock, COIN};

    const ID: &str = "8a1f0c2e9d7b6a5f4e3d2c1b0a99887766554433221100ffeeddccbbaa998877-1";

    fn utxo_body() -> String {
        format!(
            "<utxo><hash>{ID}</hash><amount>2.5</amount><address>Xowner</address>\
             <network>dash</network><spent>0</spent></utxo>"
        )
    }

    fn scripted() -> ScriptedSource {
        let source = ScriptedSource::new();
        source.set_utxos(utxo_body());
        source.set_price(Asset::Native, "0.00000020");
        source.set_price(Asset::Dash, "0.0025");
        source.set_price(Asset::Btc, "40000");
        source
    }

    fn cache(clock: Arc<ManualClock>) -> OracleCache {
        OracleCache::new(OracleSettings::default(), clock)
    }

    #[tokio::test]
    async fn test_refresh_populates_cache() {
        let clock = Arc::new(ManualClock::new(10_000));
        let oracle = cache(clock.clone());
        let source = scripted();

        let outcome = oracle.refresh(&source, 100).await.unwrap();
        assert_eq!(outcome, RefreshOutcome::Refreshed { utxos: 1, prices: 3 });
        assert_eq!(oracle.resolve_amount(ID), (250_000_000, "Xowner".to_string()));
        assert_eq!(oracle.price(Asset::Btc), Freshness::Fresh(Fixed::from_int(40_000)));
    }

    #[tokio::test]
    async fn test_refresh_is_rate_limited() {
        let clock = Arc::new(ManualClock::new(10_000));
        let oracle = cache(clock.clone());
        let source = scripted();

        oracle.refresh(&source, 100).await.unwrap();
        let calls = source.calls();
        clock.advance(600);
        assert_eq!(
            oracle.refresh(&source, 101).await.unwrap(),
            RefreshOutcome::Skipped { next_in_secs: 3_000 }
        );
        assert_eq!(source.calls(), calls);

        clock.advance(3_000);
        assert!(matches!(
            oracle.refresh(&source, 102).await.unwrap(),
            RefreshOutcome::Refreshed { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_times_out_and_keeps_data() {
        let clock = Arc::new(ManualClock::new(10_000));
        let oracle = cache(clock.clone());
        let source = scripted();
        oracle.refresh(&source, 100).await.unwrap();

        source.set_delay(Some(Duration::from_secs(120)));
        clock.advance(3_600);
        let err = oracle.refresh(&source, 101).await.unwrap_err();
        assert_eq!(err, OracleError::Timeout(30));
        assert!(err.is_recoverable());
        assert_eq!(oracle.resolve_amount(ID).0, 250_000_000);
    }

    #[tokio::test]
    async fn test_source_failure_is_reported() {
        let clock = Arc::new(ManualClock::new(10_000));
        let oracle = cache(clock);
        let source = scripted();
        source.set_failing(true);
        assert!(matches!(
            oracle.refresh(&source, 1).await,
            Err(OracleError::Source(_))
        ));
        assert_eq!(oracle.query_utxo(ID), Freshness::Missing);
    }

    #[test]
    fn test_freshness_ages_out() {
        let clock = Arc::new(ManualClock::new(10_000));
        let oracle = cache(clock.clone());
        oracle.set_price(Asset::Dash, Fixed::parse("0.0025").unwrap(), 10_000);
        assert!(oracle.price(Asset::Dash).is_fresh());

        clock.advance(4 * 3_600 + 1);
        let stale = oracle.price(Asset::Dash);
        assert!(!stale.is_fresh());
        assert_eq!(stale.clone().fresh(), None);
        assert_eq!(stale.any(), Fixed::parse("0.0025"));
        assert_eq!(oracle.price(Asset::Btc), Freshness::Missing);
    }

    #[test]
    fn test_spent_utxo_resolves_to_zero() {
        let clock = Arc::new(ManualClock::new(10_000));
        let oracle = cache(clock);
        let body = format!("<utxo><hash>{ID}</hash><amount>3</amount><spent>1</spent></utxo>");
        assert_eq!(oracle.ingest_utxos(&body, 10_000), 1);
        assert_eq!(oracle.resolve_amount(ID).0, 0);
        assert_eq!(oracle.query_utxo(ID).any().map(|u| u.amount), Some(3 * COIN));
        assert_eq!(oracle.resolve_amount("unknown").0, 0);
    }

    #[tokio::test]
    async fn test_refresh_single_utxo() {
        let clock = Arc::new(ManualClock::new(10_000));
        let oracle = cache(clock);
        let source = scripted();
        let utxo = oracle.refresh_utxo(&source, ID).await.unwrap();
        assert_eq!(utxo.amount, 250_000_000);
        assert_eq!(oracle.utxo_count(), 1);
    }
}
