//! Speculative volume updates applied between full leaderboard builds.

use common::config::Optimistic;
use common::format::{format_compact, parse_compact};
use common::types::{Address, Entry, LeaderboardSnapshot};
use serde::Serialize;
use tracing::info;

use crate::scoring::{max_volume, score_for};

/// Where the reconciler reads current volumes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeSource {
    /// The stored floating-point projection of the exact total.
    Exact,
    /// The display string, re-parsed with [`parse_compact`].
    DisplayReparse,
}

impl VolumeSource {
    fn volume_of(self, entry: &Entry) -> f64 {
        match self {
            Self::Exact => entry.volume,
            Self::DisplayReparse => parse_compact(&entry.display_volume),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimisticSettings {
    /// Multiplier converting native-unit deltas into volume units.
    pub delta_scale: f64,
    pub source: VolumeSource,
}

impl Default for OptimisticSettings {
    fn default() -> Self {
        Self {
            delta_scale: 1.0,
            source: VolumeSource::Exact,
        }
    }
}

impl OptimisticSettings {
    pub fn from_config(cfg: &Optimistic) -> Self {
        Self {
            delta_scale: 10_f64.powi(cfg.delta_decimals as i32),
            source: if cfg.reparse_display {
                VolumeSource::DisplayReparse
            } else {
                VolumeSource::Exact
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ApplyOutcome {
    Applied { volume: f64, score: u32 },
    /// The address has no entry in the displayed snapshot; nothing changed.
    NotListed,
    InvalidDelta,
}

/// Add `delta` to one entry and rescore it against the displayed maximum.
///
/// Only the matching entry changes; ranks are left as they are until the next
/// full build replaces the snapshot.
pub fn apply_optimistic_delta(
    snapshot: &mut LeaderboardSnapshot,
    address: &Address,
    delta: f64,
    settings: &OptimisticSettings,
) -> ApplyOutcome {
    if !delta.is_finite() || delta < 0.0 {
        return ApplyOutcome::InvalidDelta;
    }

    let Some(idx) = snapshot
        .entries
        .iter()
        .position(|e| &e.entry.address == address)
    else {
        info!(address = %address, delta, "address not on leaderboard, optimistic delta dropped");
        return ApplyOutcome::NotListed;
    };

    let source = settings.source;
    let updated = source.volume_of(&snapshot.entries[idx].entry) + delta * settings.delta_scale;

    let others_max = max_volume(
        snapshot
            .entries
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != idx)
            .map(|(_, e)| source.volume_of(&e.entry)),
    );
    let score = score_for(updated, others_max.max(updated));

    let entry = &mut snapshot.entries[idx].entry;
    entry.volume = updated;
    entry.display_volume = format_compact(updated);
    entry.score = score;
    entry.optimistic = true;

    ApplyOutcome::Applied {
        volume: updated,
        score,
    }
}
