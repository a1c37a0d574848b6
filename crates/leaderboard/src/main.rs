use anyhow::Result;
use common::config::Config;
use common::rpc::RpcClient;
use leaderboard::builder::{self, BuildSettings};
use leaderboard::cli::{self, Command};
use leaderboard::session::SessionHandle;
use leaderboard::sources::RegistryContract;
use leaderboard::{metrics, resolver, scheduler};
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    let _otel_guard = common::observability::init_global("leaderboard", &config.general.log_level)?;

    let cmd = cli::parse_args(std::env::args()).map_err(anyhow::Error::msg)?;

    let rpc = Arc::new(RpcClient::from_config(&config.rpc)?);
    let registry = RegistryContract::new(rpc.clone(), &config.registry);
    let settings = BuildSettings::from_config(&config);

    match cmd {
        Command::Build => {
            let snapshot = builder::build_leaderboard(&registry, rpc.as_ref(), &settings, 1).await?;
            print!("{}", cli::render_table(&snapshot));
            Ok(())
        }
        Command::Volume { address } => {
            let resolved = resolver::resolve_volume(rpc.as_ref(), &address, &settings.transfers).await;
            println!("{}", cli::render_volume(&resolved));
            Ok(())
        }
        Command::Run => run(&config, rpc, registry, settings).await,
    }
}

async fn run(
    config: &Config,
    rpc: Arc<RpcClient>,
    registry: RegistryContract,
    settings: BuildSettings,
) -> Result<()> {
    metrics::install_prometheus(config.observability.prometheus_port)?;
    metrics::describe();

    tracing::info!(rpc = %rpc.url(), "leaderboard starting");

    let session = SessionHandle::new();
    let (refresh_tx, mut refresh_rx) = tokio::sync::mpsc::channel::<()>(8);

    // Spawn the worker before the scheduler so the immediate tick has a receiver.
    tokio::spawn({
        let session = session.clone();
        async move {
            while refresh_rx.recv().await.is_some() {
                let span = tracing::info_span!("job_run", job = "leaderboard_refresh");
                let outcome = builder::refresh(&session, &registry, rpc.as_ref(), &settings)
                    .instrument(span)
                    .await;
                let entries = session.with(|s| s.snapshot().map_or(0, |l| l.len()));
                tracing::info!(
                    outcome = outcome.as_str(),
                    entries,
                    "leaderboard_refresh done"
                );
            }
        }
    });

    let _handles = scheduler::start(vec![scheduler::JobSpec {
        name: "leaderboard_refresh".to_string(),
        interval: Duration::from_secs(config.leaderboard.refresh_interval_secs.max(1)),
        run_immediately: true,
        tick: refresh_tx,
    }]);

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    Ok(())
}
