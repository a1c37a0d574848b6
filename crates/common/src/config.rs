use anyhow::{bail, Result};
use serde::Deserialize;
use std::str::FromStr;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub general: General,
    pub rpc: Rpc,
    pub registry: Registry,
    #[serde(default)]
    pub transfers: Transfers,
    #[serde(default)]
    pub leaderboard: Leaderboard,
    #[serde(default)]
    pub optimistic: Optimistic,
    pub wallet: Option<Wallet>,
    pub observability: Observability,
    pub web: Option<Web>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct General {
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Rpc {
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Registry {
    pub contract: String,
    pub selector: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Transfers {
    pub from_block: String,
    pub to_block: String,
    pub category: Vec<String>,
    pub max_count: u32,
    pub max_pages: u32,
}

impl Default for Transfers {
    fn default() -> Self {
        Self {
            from_block: "0x0".to_string(),
            to_block: "latest".to_string(),
            category: vec!["external".to_string()],
            max_count: 1000,
            max_pages: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Leaderboard {
    pub max_concurrent_resolutions: usize,
    pub refresh_interval_secs: u64,
}

impl Default for Leaderboard {
    fn default() -> Self {
        Self {
            max_concurrent_resolutions: 8,
            refresh_interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Optimistic {
    /// Power of ten applied to native-unit deltas before they are added to a volume.
    /// 0 adds the delta as-is; 18 converts ether into wei.
    pub delta_decimals: u32,
    /// Re-parse the display string instead of using the stored volume projection.
    pub reparse_display: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Wallet {
    pub rpc_url: String,
    #[serde(default = "default_tx_count")]
    pub tx_count: u32,
    pub tx_value_wei: String,
    pub delta_per_tx: f64,
    #[serde(default = "default_receipt_poll_ms")]
    pub receipt_poll_ms: u64,
    #[serde(default = "default_receipt_timeout_secs")]
    pub receipt_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Observability {
    pub prometheus_port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Web {
    pub port: u16,
    pub host: String,
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_tx_count() -> u32 {
    5
}

fn default_receipt_poll_ms() -> u64 {
    1000
}

fn default_receipt_timeout_secs() -> u64 {
    120
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from("config/default.toml")
    }

    pub fn load_from(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {path}: {e}"))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rpc.url.trim().is_empty() {
            bail!("rpc.url must not be empty");
        }
        if self.leaderboard.max_concurrent_resolutions == 0 {
            bail!("leaderboard.max_concurrent_resolutions must be at least 1");
        }
        if self.transfers.max_pages == 0 {
            bail!("transfers.max_pages must be at least 1");
        }
        if self.optimistic.delta_decimals > 30 {
            bail!("optimistic.delta_decimals must be <= 30");
        }
        if let Some(wallet) = &self.wallet {
            if wallet.rpc_url.trim().is_empty() {
                bail!("wallet.rpc_url must not be empty");
            }
            if wallet.tx_count == 0 {
                bail!("wallet.tx_count must be at least 1");
            }
            if !wallet.delta_per_tx.is_finite() || wallet.delta_per_tx < 0.0 {
                bail!("wallet.delta_per_tx must be a non-negative number");
            }
        }
        Ok(())
    }
}

impl FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_toml_str(s)
    }
}
