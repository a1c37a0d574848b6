use anyhow::Result;
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

pub fn describe() {
    describe_histogram!(
        "leaderboard_api_latency_ms",
        "JSON-RPC request latency in milliseconds."
    );
    describe_counter!(
        "leaderboard_api_requests_total",
        "JSON-RPC requests made, by method and status."
    );
    describe_counter!(
        "leaderboard_api_errors_total",
        "JSON-RPC request failures, by method and error kind."
    );
    describe_counter!(
        "leaderboard_transfer_pages_total",
        "Asset transfer pages fetched."
    );
    describe_counter!(
        "leaderboard_transfer_values_skipped_total",
        "Transfer values that could not be parsed and were left out of a sum."
    );
    describe_counter!(
        "leaderboard_resolution_failures_total",
        "Addresses whose volume fell back to zero after a lookup failure."
    );
    describe_counter!(
        "leaderboard_builds_total",
        "Leaderboard builds, by outcome."
    );
    describe_histogram!(
        "leaderboard_build_duration_ms",
        "Wall time of a full leaderboard build in milliseconds."
    );
    describe_gauge!(
        "leaderboard_tracked_addresses",
        "Addresses in the most recent leaderboard."
    );
    describe_counter!(
        "leaderboard_play_batches_total",
        "Wallet transaction batches, by outcome."
    );
}

pub fn install_prometheus(port: u16) -> Result<PrometheusHandle> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    Ok(PrometheusBuilder::new()
        .with_http_listener(addr)
        .install_recorder()?)
}
