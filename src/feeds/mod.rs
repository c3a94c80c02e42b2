//! Price sources for the keeper.
//!
//! Defines the `PriceSource` trait and two implementations: a fixed or
//! scripted source for local runs and tests, and CoinGecko's simple-price
//! endpoint for live spot prices.
//!
//! Prices are oracle integers: the quote scaled by `10^price_decimals` and
//! rounded half-up at that precision.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::{Decimal, RoundingStrategy};
use secrecy::{ExposeSecret, SecretString};
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::{AppConfig, PriceSourceKind};
use crate::types::{to_base_units, Price};

/// Abstraction over spot price feeds.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Latest price as an oracle integer.
    async fn latest_price(&self) -> Result<Price>;

    /// Source identifier for logs.
    fn name(&self) -> &'static str;
}

/// Scale a decimal quote into an oracle integer.
pub fn scale_price(quote: Decimal, price_decimals: u32) -> Result<Price> {
    if quote <= Decimal::ZERO {
        anyhow::bail!("price must be positive: {quote}");
    }
    let rounded = quote.round_dp_with_strategy(price_decimals, RoundingStrategy::MidpointAwayFromZero);
    to_base_units(rounded, price_decimals)
}

/// Build the source selected in `[keeper]`.
pub fn build_source(config: &AppConfig) -> Result<Box<dyn PriceSource>> {
    let keeper = &config.keeper;
    match keeper.source {
        PriceSourceKind::Fixed => {
            let quote = keeper
                .fixed_price
                .context("keeper.fixed_price is required for the fixed price source")?;
            Ok(Box::new(FixedPriceSource::new(scale_price(quote, keeper.price_decimals)?)))
        }
        PriceSourceKind::CoinGecko => Ok(Box::new(CoinGeckoSource::new(
            keeper.coin_id.clone(),
            keeper.vs_currency.clone(),
            keeper.price_decimals,
            config.price_api_key(),
        )?)),
    }
}

// ---------------------------------------------------------------------------
// Fixed / scripted
// ---------------------------------------------------------------------------

/// Serves queued prices in order, then repeats the last one forever.
pub struct FixedPriceSource {
    queue: Mutex<VecDeque<Price>>,
    last: Mutex<Price>,
}

impl FixedPriceSource {
    pub fn new(price: Price) -> Self {
        Self::scripted(price, Vec::new())
    }

    /// `first` is served, then each of `then`, then the final price repeats.
    pub fn scripted(first: Price, then: Vec<Price>) -> Self {
        let mut queue = VecDeque::with_capacity(then.len() + 1);
        queue.push_back(first);
        queue.extend(then);
        Self {
            queue: Mutex::new(queue),
            last: Mutex::new(first),
        }
    }
}

#[async_trait]
impl PriceSource for FixedPriceSource {
    async fn latest_price(&self) -> Result<Price> {
        let mut last = self.last.lock().await;
        if let Some(next) = self.queue.lock().await.pop_front() {
            *last = next;
        }
        Ok(*last)
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

// ---------------------------------------------------------------------------
// CoinGecko
// ---------------------------------------------------------------------------

const COINGECKO_BASE: &str = "https://api.coingecko.com/api/v3";

/// `{"bitcoin": {"usd": 65000.12}}`
type SimplePriceResponse = HashMap<String, HashMap<String, Decimal>>;

pub struct CoinGeckoSource {
    http: Client,
    base_url: String,
    coin_id: String,
    vs_currency: String,
    price_decimals: u32,
    api_key: Option<SecretString>,
}

impl CoinGeckoSource {
    pub fn new(
        coin_id: String,
        vs_currency: String,
        price_decimals: u32,
        api_key: Option<SecretString>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .user_agent("binary-options/0.1.0 (keeper)")
            .build()
            .context("Failed to build HTTP client for CoinGecko")?;
        Ok(Self {
            http,
            base_url: COINGECKO_BASE.to_string(),
            coin_id,
            vs_currency,
            price_decimals,
            api_key,
        })
    }

    /// Point at a different host (self-hosted proxy or test server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn url(&self) -> String {
        format!(
            "{}/simple/price?ids={}&vs_currencies={}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(&self.coin_id),
            urlencoding::encode(&self.vs_currency),
        )
    }

    fn extract(&self, body: &SimplePriceResponse) -> Result<Decimal> {
        body.get(&self.coin_id)
            .and_then(|quotes| quotes.get(&self.vs_currency))
            .copied()
            .with_context(|| format!("No {} quote for {} in response", self.vs_currency, self.coin_id))
    }
}

#[async_trait]
impl PriceSource for CoinGeckoSource {
    async fn latest_price(&self) -> Result<Price> {
        let url = self.url();
        let mut req = self.http.get(&url);
        if let Some(key) = &self.api_key {
            req = req.header("x-cg-demo-api-key", key.expose_secret().as_str());
        }

        let resp = req.send().await
            .context("CoinGecko request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("CoinGecko API error {status}: {text}");
        }

        let body: SimplePriceResponse = resp.json().await
            .context("Failed to parse CoinGecko response")?;
        let quote = self.extract(&body)?;
        let price = scale_price(quote, self.price_decimals)?;

        debug!(coin = %self.coin_id, %quote, price, "CoinGecko price fetched");
        Ok(price)
    }

    fn name(&self) -> &'static str {
        "coingecko"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
