use anyhow::Result;
use metrics::describe_gauge;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub fn describe() {
    describe_gauge!(
        "leaderboard_web_build_info",
        "Build info for the leaderboard web server (value is always 1)."
    );
    leaderboard::metrics::describe();
}

/// Install a global Prometheus recorder once and return a handle for rendering `/metrics`.
///
/// `install_recorder` leaves upkeep to the caller; the `/metrics` handler runs it.
pub fn init_global() -> Result<PrometheusHandle> {
    if let Some(handle) = PROM_HANDLE.get() {
        return Ok(handle.clone());
    }

    let installed = PrometheusBuilder::new().install_recorder()?;
    let handle = PROM_HANDLE.get_or_init(|| installed).clone();
    describe();

    let git_sha = std::env::var("GIT_SHA").unwrap_or_else(|_| "unknown".to_string());
    ::metrics::gauge!(
        "leaderboard_web_build_info",
        "version" => env!("CARGO_PKG_VERSION"),
        "git_sha" => git_sha,
    )
    .set(1.0);

    Ok(handle)
}
