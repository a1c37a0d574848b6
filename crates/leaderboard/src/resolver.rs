use common::config::Transfers;
use common::types::{project_volume, Address, TransferDirection, TransferFilter};
use num_bigint::BigUint;
use tracing::{debug, warn};

use crate::aggregator::sum_transfers;
use crate::sources::TransfersPager;

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedVolume {
    pub address: Address,
    pub raw: BigUint,
    pub volume: f64,
    /// Either direction failed and the volume was zeroed for this build.
    pub failed: bool,
}

fn filter_for(cfg: &Transfers, direction: TransferDirection) -> TransferFilter {
    TransferFilter {
        from_block: cfg.from_block.clone(),
        to_block: cfg.to_block.clone(),
        category: cfg.category.clone(),
        direction,
        max_count: cfg.max_count,
    }
}

/// Sent plus received volume for one address. Never fails: any aggregation
/// error is logged and the address resolves to zero.
pub async fn resolve_volume<P: TransfersPager + Sync>(
    pager: &P,
    address: &Address,
    cfg: &Transfers,
) -> ResolvedVolume {
    let sent_filter = filter_for(cfg, TransferDirection::From(address.clone()));
    let received_filter = filter_for(cfg, TransferDirection::To(address.clone()));

    let (sent, received) = tokio::join!(
        sum_transfers(pager, &sent_filter, cfg.max_pages),
        sum_transfers(pager, &received_filter, cfg.max_pages),
    );

    match (sent, received) {
        (Ok(sent), Ok(received)) => {
            let raw = sent.total + received.total;
            let volume = project_volume(&raw);
            debug!(
                address = %address,
                pages = sent.pages + received.pages,
                skipped = sent.skipped + received.skipped,
                volume,
                "resolved volume"
            );
            ResolvedVolume {
                address: address.clone(),
                raw,
                volume,
                failed: false,
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            warn!(address = %address, error = %e, "volume resolution failed, using zero");
            metrics::counter!("leaderboard_resolution_failures_total").increment(1);
            ResolvedVolume {
                address: address.clone(),
                raw: BigUint::default(),
                volume: 0.0,
                failed: true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::tests::page;
    use anyhow::Result;
    use common::types::ApiAssetTransfersPage;
    use serde_json::json;

    /// One page per direction; the received side can be made to fail.
    struct DirectionalPager {
        sent: Vec<serde_json::Value>,
        received: Vec<serde_json::Value>,
        fail_received: bool,
    }

    impl TransfersPager for DirectionalPager {
        async fn fetch_transfers_page(
            &self,
            filter: &TransferFilter,
            _page_key: Option<&str>,
        ) -> Result<ApiAssetTransfersPage> {
            match &filter.direction {
                TransferDirection::From(_) => Ok(page(self.sent.clone(), None)),
                TransferDirection::To(_) if self.fail_received => {
                    anyhow::bail!("502 bad gateway")
                }
                TransferDirection::To(_) => Ok(page(self.received.clone(), None)),
            }
        }
    }

    #[tokio::test]
    async fn test_resolve_sums_both_directions() {
        let pager = DirectionalPager {
            sent: vec![json!("0x3e8")],
            received: vec![json!("500"), json!("250")],
            fail_received: false,
        };
        let resolved = resolve_volume(&pager, &Address::new("0xA"), &Transfers::default()).await;
        assert_eq!(resolved.raw, BigUint::from(1750u32));
        assert!((resolved.volume - 1750.0).abs() < f64::EPSILON);
        assert!(!resolved.failed);
        assert_eq!(resolved.address.as_str(), "0xa");
    }

    #[tokio::test]
    async fn test_resolve_failure_yields_zero() {
        let pager = DirectionalPager {
            sent: vec![json!("0x3e8")],
            received: vec![],
            fail_received: true,
        };
        let resolved = resolve_volume(&pager, &Address::new("0xb"), &Transfers::default()).await;
        assert!(resolved.failed);
        assert_eq!(resolved.raw, BigUint::default());
        assert_eq!(resolved.volume, 0.0);
    }
}
