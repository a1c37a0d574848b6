use chrono::{DateTime, Utc};
use num_bigint::BigUint;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Wallet address, lowercased and trimmed so lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Address {
    fn from(raw: String) -> Self {
        Self::new(&raw)
    }
}

impl From<&str> for Address {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<Address> for String {
    fn from(addr: Address) -> Self {
        addr.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Project an exact raw volume into `f64`, saturating at `f64::MAX`.
pub fn project_volume(raw: &BigUint) -> f64 {
    match raw.to_f64() {
        Some(v) if v.is_finite() => v,
        _ => f64::MAX,
    }
}

fn serialize_decimal<S: Serializer>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_str_radix(10))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    pub address: Address,
    /// Exact total as of the last completed build.
    #[serde(serialize_with = "serialize_decimal")]
    pub raw_volume: BigUint,
    /// Floating-point projection used for scoring; includes any optimistic delta.
    pub volume: f64,
    pub display_volume: String,
    pub score: u32,
    /// True once a speculative delta has been applied since the last build.
    pub optimistic: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEntry {
    pub rank: usize,
    #[serde(flatten)]
    pub entry: Entry,
}

/// One complete leaderboard; replaced wholesale by every successful build.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardSnapshot {
    pub generation: u64,
    pub built_at: DateTime<Utc>,
    pub entries: Vec<RankedEntry>,
}

impl LeaderboardSnapshot {
    pub fn get(&self, address: &Address) -> Option<&RankedEntry> {
        self.entries.iter().find(|e| &e.entry.address == address)
    }

    pub fn get_mut(&mut self, address: &Address) -> Option<&mut RankedEntry> {
        self.entries.iter_mut().find(|e| &e.entry.address == address)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferDirection {
    From(Address),
    To(Address),
}

impl TransferDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::From(_) => "from",
            Self::To(_) => "to",
        }
    }

    pub fn address(&self) -> &Address {
        match self {
            Self::From(a) | Self::To(a) => a,
        }
    }
}

/// Query for `alchemy_getAssetTransfers`, minus the page key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferFilter {
    pub from_block: String,
    pub to_block: String,
    pub category: Vec<String>,
    pub direction: TransferDirection,
    pub max_count: u32,
}

/// Transfer from `alchemy_getAssetTransfers`. Only `value` feeds the volume sum.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiAssetTransfer {
    pub hash: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    pub asset: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiAssetTransfersPage {
    #[serde(default)]
    pub transfers: Vec<ApiAssetTransfer>,
    #[serde(rename = "pageKey")]
    pub page_key: Option<String>,
}

/// Receipt from `eth_getTransactionReceipt`; `status` is "0x1" on success.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiTxReceipt {
    #[serde(rename = "transactionHash")]
    pub transaction_hash: Option<String>,
    #[serde(rename = "blockNumber")]
    pub block_number: Option<String>,
    pub status: Option<String>,
}

impl ApiTxReceipt {
    pub fn succeeded(&self) -> bool {
        self.status.as_deref() == Some("0x1")
    }
}
