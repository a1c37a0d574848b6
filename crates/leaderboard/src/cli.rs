use common::types::{Address, LeaderboardSnapshot};
use std::fmt::Write;

use crate::resolver::ResolvedVolume;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run,
    Build,
    Volume { address: Address },
}

pub fn parse_args<I>(mut args: I) -> std::result::Result<Command, String>
where
    I: Iterator<Item = String>,
{
    // Drop argv[0].
    let _ = args.next();

    let Some(cmd) = args.next() else {
        return Ok(Command::Run);
    };

    match cmd.as_str() {
        "run" => Ok(Command::Run),
        "build" => Ok(Command::Build),
        "volume" => {
            let address = args
                .next()
                .ok_or_else(|| "usage: leaderboard volume <address>".to_string())?;
            Ok(Command::Volume {
                address: Address::from(address),
            })
        }
        other => Err(format!("unknown command: {other}")),
    }
}

pub fn render_table(snapshot: &LeaderboardSnapshot) -> String {
    let mut out = format!(
        "Leaderboard (generation {}, built {}):\n",
        snapshot.generation,
        snapshot.built_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if snapshot.is_empty() {
        out.push_str("  (no tracked addresses)\n");
        return out;
    }
    for r in &snapshot.entries {
        let _ = writeln!(
            out,
            "{rank:>4}  {score:>6}  {volume:>8}  {address}",
            rank = r.rank,
            score = r.entry.score,
            volume = r.entry.display_volume,
            address = r.entry.address,
        );
    }
    out
}

pub fn render_volume(resolved: &ResolvedVolume) -> String {
    if resolved.failed {
        return format!("{}  volume unavailable (lookup failed)", resolved.address);
    }
    format!(
        "{}  raw={}  volume={}",
        resolved.address,
        resolved.raw,
        common::format::format_compact(resolved.volume)
    )
}
