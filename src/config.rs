//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Human amounts (`min_bet`, faucet grants, seed liquidity) are decimal
//! strings in whole tokens and are converted to base units on use. Secrets
//! are referenced by env-var name and resolved at runtime.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;

use crate::market::settlement::{PayoutModel, TiePolicy};
use crate::market::timeframe::{self, Timeframe};
use crate::types::{to_base_units, Address, Amount, BPS_DENOMINATOR};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub market: MarketConfig,
    pub timeframes: Vec<Timeframe>,
    pub token: TokenConfig,
    pub vault: VaultConfig,
    pub chain: ChainConfig,
    pub keeper: KeeperConfig,
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MarketConfig {
    pub name: String,
    pub address: Address,
    pub owner: Address,
    pub operator: Address,
    pub treasury: Address,
    /// Minimum stake in whole tokens.
    pub min_bet: Decimal,
    pub fee_bps: u16,
    #[serde(default)]
    pub payout_model: PayoutModel,
    #[serde(default)]
    pub tie_policy: TiePolicy,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TokenConfig {
    pub symbol: String,
    pub decimals: u32,
    /// Balances minted at bootstrap.
    #[serde(default)]
    pub faucet: Vec<FaucetGrant>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FaucetGrant {
    pub address: Address,
    pub amount: Decimal,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VaultConfig {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    /// Minimum deposit in base units.
    #[serde(default = "default_dust_floor")]
    pub dust_floor: Amount,
    /// Liquidity the market owner deposits at bootstrap, in whole tokens.
    #[serde(default)]
    pub seed_liquidity: Option<Decimal>,
}

fn default_dust_floor() -> Amount {
    crate::vault::DEFAULT_DUST_FLOOR
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChainConfig {
    pub block_time_secs: u64,
    /// Defaults to the wall clock at bootstrap.
    #[serde(default)]
    pub genesis_timestamp: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PriceSourceKind {
    Fixed,
    CoinGecko,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KeeperConfig {
    pub interval_secs: u64,
    pub source: PriceSourceKind,
    /// Used by the `fixed` source.
    #[serde(default)]
    pub fixed_price: Option<Decimal>,
    #[serde(default = "default_coin_id")]
    pub coin_id: String,
    #[serde(default = "default_vs_currency")]
    pub vs_currency: String,
    /// Oracle prices are stored as integers scaled by 10^price_decimals.
    pub price_decimals: u32,
    #[serde(default)]
    pub api_key_env: Option<String>,
}

fn default_coin_id() -> String {
    "bitcoin".to_string()
}

fn default_vs_currency() -> String {
    "usd".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub state_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { state_file: crate::storage::DEFAULT_STATE_FILE.to_string() }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents).context("Invalid TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Cross-field checks serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if u128::from(self.market.fee_bps) > BPS_DENOMINATOR {
            anyhow::bail!("market.fee_bps must be at most {BPS_DENOMINATOR}");
        }
        if self.timeframes.is_empty() {
            anyhow::bail!("at least one [[timeframes]] entry is required");
        }
        timeframe::validate_batch(&self.timeframes).context("Invalid timeframes")?;
        self.min_bet_units()?;
        if self.keeper.source == PriceSourceKind::Fixed && self.keeper.fixed_price.is_none() {
            anyhow::bail!("keeper.fixed_price is required for the fixed price source");
        }
        if self.keeper.interval_secs == 0 {
            anyhow::bail!("keeper.interval_secs must be positive");
        }
        Ok(())
    }

    pub fn min_bet_units(&self) -> Result<Amount> {
        to_base_units(self.market.min_bet, self.token.decimals).context("Invalid market.min_bet")
    }

    /// Faucet grants converted to base units.
    pub fn faucet_units(&self) -> Result<Vec<(Address, Amount)>> {
        self.token
            .faucet
            .iter()
            .map(|g| {
                let amount = to_base_units(g.amount, self.token.decimals)
                    .with_context(|| format!("Invalid faucet amount for {}", g.address))?;
                Ok((g.address, amount))
            })
            .collect()
    }

    pub fn seed_liquidity_units(&self) -> Result<Option<Amount>> {
        self.vault
            .seed_liquidity
            .map(|v| to_base_units(v, self.token.decimals).context("Invalid vault.seed_liquidity"))
            .transpose()
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// API key for the price source, if one is configured and set.
    pub fn price_api_key(&self) -> Option<SecretString> {
        let name = self.keeper.api_key_env.as_deref()?;
        Self::resolve_env(name).ok().map(SecretString::new)
    }
}

/// Complete configuration used by unit tests across the crate.
#[cfg(test)]
pub(crate) const SAMPLE_CONFIG: &str = r#"
[market]
name = "BTC/USDT"
address = "0x00000000000000000000000000000000000000c8"
owner = "0x0000000000000000000000000000000000000001"
operator = "0x0000000000000000000000000000000000000002"
treasury = "0x0000000000000000000000000000000000000005"
min_bet = "0.1"
fee_bps = 1000
payout_model = "parimutuel"
tie_policy = "refund"

[[timeframes]]
id = 0
interval_seconds = 60
interval_blocks = 4
buffer_blocks = 3

[[timeframes]]
id = 1
interval_seconds = 300
interval_blocks = 20
buffer_blocks = 5

[token]
symbol = "USDT"
decimals = 18

[[token.faucet]]
address = "0x0000000000000000000000000000000000000003"
amount = "100"

[vault]
address = "0x0000000000000000000000000000000000000064"
name = "BTC/USDT Vault"
symbol = "BTCUSDT"
seed_liquidity = "10"

[chain]
block_time_secs = 2
genesis_timestamp = 1700000000

[keeper]
interval_secs = 5
source = "fixed"
fixed_price = "65000.5"
price_decimals = 8

[dashboard]
enabled = false
port = 3000
"#;
