use anyhow::{Context, Result};
use chrono::Utc;
use common::config::{Config, Transfers};
use common::format::format_compact;
use common::types::{Address, Entry, LeaderboardSnapshot, RankedEntry};
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{error, info};

use crate::resolver::{resolve_volume, ResolvedVolume};
use crate::scoring::compute_scores;
use crate::session::{BuildGuard, SessionHandle};
use crate::sources::{AddressRegistry, TransfersPager};

#[derive(Debug, Clone)]
pub struct BuildSettings {
    pub transfers: Transfers,
    pub max_concurrent_resolutions: usize,
}

impl BuildSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            transfers: cfg.transfers.clone(),
            max_concurrent_resolutions: cfg.leaderboard.max_concurrent_resolutions,
        }
    }
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            transfers: Transfers::default(),
            max_concurrent_resolutions: 8,
        }
    }
}

/// Keep the first occurrence of each address, preserving registry order.
fn dedup_addresses(addresses: Vec<Address>) -> Vec<Address> {
    let mut seen = HashSet::new();
    addresses
        .into_iter()
        .filter(|a| seen.insert(a.clone()))
        .collect()
}

/// Stable sort by descending score and assign 1-based ranks.
pub fn rank_entries(mut entries: Vec<Entry>) -> Vec<RankedEntry> {
    entries.sort_by(|a, b| b.score.cmp(&a.score));
    entries
        .into_iter()
        .enumerate()
        .map(|(i, entry)| RankedEntry { rank: i + 1, entry })
        .collect()
}

fn to_entries(resolved: Vec<ResolvedVolume>, scores: &[u32]) -> Vec<Entry> {
    resolved
        .into_iter()
        .zip(scores)
        .map(|(r, score)| Entry {
            display_volume: format_compact(r.volume),
            address: r.address,
            raw_volume: r.raw,
            volume: r.volume,
            score: *score,
            optimistic: false,
        })
        .collect()
}

/// Registry read, per-address volume resolution, scoring and ranking.
///
/// Only the registry read can fail; per-address failures resolve to zero volume.
pub async fn build_leaderboard<R, P>(
    registry: &R,
    pager: &P,
    settings: &BuildSettings,
    generation: u64,
) -> Result<LeaderboardSnapshot>
where
    R: AddressRegistry + Sync,
    P: TransfersPager + Sync,
{
    let addresses = registry
        .fetch_addresses()
        .await
        .context("failed to read tracked addresses from registry")?;
    let addresses = dedup_addresses(addresses);
    metrics::gauge!("leaderboard_tracked_addresses").set(addresses.len() as f64);

    // Futures are created up front so the stream holds no borrowing closure and
    // the build future stays `Send`. `buffered` keeps registry order while
    // bounding in-flight resolutions.
    let pending: Vec<_> = addresses
        .iter()
        .map(|address| resolve_volume(pager, address, &settings.transfers))
        .collect();
    let resolved: Vec<ResolvedVolume> = stream::iter(pending)
        .buffered(settings.max_concurrent_resolutions.max(1))
        .collect()
        .await;

    let failed = resolved.iter().filter(|r| r.failed).count();
    let volumes: Vec<f64> = resolved.iter().map(|r| r.volume).collect();
    let scores = compute_scores(&volumes);
    let entries = rank_entries(to_entries(resolved, &scores));

    info!(
        generation,
        addresses = entries.len(),
        failed,
        "leaderboard built"
    );

    Ok(LeaderboardSnapshot {
        generation,
        built_at: Utc::now(),
        entries,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshOutcome {
    Applied,
    /// A newer refresh started before this one finished; its result was discarded.
    Stale,
    Failed,
}

impl RefreshOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Stale => "stale",
            Self::Failed => "failed",
        }
    }
}

/// Run one build against the session. Never returns an error: a failed build is
/// logged and the previously displayed snapshot stays in place. Dropping the
/// returned future clears the loading flag like a failed build.
pub async fn refresh<R, P>(
    session: &SessionHandle,
    registry: &R,
    pager: &P,
    settings: &BuildSettings,
) -> RefreshOutcome
where
    R: AddressRegistry + Sync,
    P: TransfersPager + Sync,
{
    let build = BuildGuard::begin(session);
    let generation = build.ticket().generation();
    let start = Instant::now();
    let result = build_leaderboard(registry, pager, settings, generation).await;
    metrics::histogram!("leaderboard_build_duration_ms")
        .record(start.elapsed().as_secs_f64() * 1000.0);

    let outcome = match result {
        Ok(snapshot) => {
            if build.complete(snapshot) {
                RefreshOutcome::Applied
            } else {
                info!(generation, "discarding stale leaderboard build");
                RefreshOutcome::Stale
            }
        }
        Err(e) => {
            error!(generation, error = %format!("{e:#}"), "leaderboard build failed");
            if build.fail() {
                RefreshOutcome::Failed
            } else {
                RefreshOutcome::Stale
            }
        }
    };
    metrics::counter!("leaderboard_builds_total", "status" => outcome.as_str()).increment(1);
    outcome
}
