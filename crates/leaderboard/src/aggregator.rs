use anyhow::Result;
use common::types::TransferFilter;
use num_bigint::BigUint;
use num_traits::{FromPrimitive, Zero};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::sources::TransfersPager;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueParseError {
    #[error("empty value")]
    Empty,
    #[error("invalid hex value {0:?}")]
    Hex(String),
    #[error("invalid decimal value {0:?}")]
    Decimal(String),
    #[error("value {0} is not a non-negative integer")]
    NotInteger(String),
    #[error("unsupported value type: {0}")]
    Unsupported(String),
}

/// Parse a transfer `value` into an exact integer.
///
/// Accepts `0x`-prefixed hex strings, decimal strings and non-negative JSON integers
/// (including integral floats such as `1e20`).
pub fn parse_transfer_value(value: &Value) -> Result<BigUint, ValueParseError> {
    match value {
        Value::String(s) => parse_value_str(s),
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                return Ok(BigUint::from(u));
            }
            match n.as_f64() {
                Some(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 => {
                    BigUint::from_f64(f).ok_or_else(|| ValueParseError::NotInteger(n.to_string()))
                }
                _ => Err(ValueParseError::NotInteger(n.to_string())),
            }
        }
        other => Err(ValueParseError::Unsupported(other.to_string())),
    }
}

fn parse_value_str(raw: &str) -> Result<BigUint, ValueParseError> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(ValueParseError::Empty);
    }

    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ValueParseError::Hex(raw.to_string()));
        }
        return BigUint::parse_bytes(hex.as_bytes(), 16)
            .ok_or_else(|| ValueParseError::Hex(raw.to_string()));
    }

    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ValueParseError::Decimal(raw.to_string()));
    }
    BigUint::parse_bytes(s.as_bytes(), 10).ok_or_else(|| ValueParseError::Decimal(raw.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransferSum {
    pub total: BigUint,
    pub pages: u32,
    pub counted: u64,
    pub skipped: u64,
}

/// Page through every transfer matching `filter` and sum the parsed values.
///
/// Stops when a page carries no page key, when the service hands back a page key
/// it already issued, or after `max_pages` requests. Unparsable values are skipped.
pub async fn sum_transfers<P: TransfersPager + Sync>(
    pager: &P,
    filter: &TransferFilter,
    max_pages: u32,
) -> Result<TransferSum> {
    let mut sum = TransferSum::default();
    let mut page_key: Option<String> = None;
    let mut seen_keys = HashSet::new();

    loop {
        let page = pager.fetch_transfers_page(filter, page_key.as_deref()).await?;
        sum.pages += 1;
        metrics::counter!("leaderboard_transfer_pages_total").increment(1);

        for transfer in &page.transfers {
            let Some(value) = transfer.value.as_ref().filter(|v| !v.is_null()) else {
                continue;
            };
            match parse_transfer_value(value) {
                Ok(v) => {
                    sum.total += v;
                    sum.counted += 1;
                }
                Err(e) => {
                    warn!(
                        address = %filter.direction.address(),
                        direction = filter.direction.as_str(),
                        tx = transfer.hash.as_deref().unwrap_or(""),
                        error = %e,
                        "skipping unparsable transfer value"
                    );
                    metrics::counter!("leaderboard_transfer_values_skipped_total").increment(1);
                    sum.skipped += 1;
                }
            }
        }

        let Some(next) = page.page_key else {
            break;
        };
        if !seen_keys.insert(next.clone()) {
            warn!(
                address = %filter.direction.address(),
                page_key = %next,
                "transfer service repeated page key, stopping pagination"
            );
            break;
        }
        if sum.pages >= max_pages {
            warn!(
                address = %filter.direction.address(),
                max_pages,
                "page limit reached, stopping pagination"
            );
            break;
        }
        page_key = Some(next);
    }

    if sum.total.is_zero() {
        debug!(address = %filter.direction.address(), pages = sum.pages, "no transfer volume");
    }
    Ok(sum)
}
