mod metrics;

use anyhow::Result;
use askama::Template;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use common::config::Config;
use common::rpc::RpcClient;
use common::types::{Address, RankedEntry};
use leaderboard::builder::{self, BuildSettings, RefreshOutcome};
use leaderboard::play::{self, PlayError, PlayReport, PlaySettings};
use leaderboard::reconciler::OptimisticSettings;
use leaderboard::scheduler;
use leaderboard::session::{SessionHandle, SessionView};
use leaderboard::sources::RegistryContract;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

pub struct AppState {
    pub session: SessionHandle,
    pub rpc: Arc<RpcClient>,
    pub registry: RegistryContract,
    /// Wallet provider endpoint; `None` when no `[wallet]` section is configured.
    pub wallet: Option<RpcClient>,
    pub build: BuildSettings,
    pub play: Option<PlaySettings>,
    pub optimistic: OptimisticSettings,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    pub fn from_config(config: &Config, prometheus: Option<PrometheusHandle>) -> Result<Self> {
        let rpc = Arc::new(RpcClient::from_config(&config.rpc)?);
        let (wallet, play) = match &config.wallet {
            Some(w) => {
                let client = RpcClient::new(
                    &w.rpc_url,
                    Duration::from_secs(config.rpc.timeout_secs),
                    config.rpc.max_retries,
                    Duration::from_millis(config.rpc.backoff_base_ms),
                )?;
                (Some(client), Some(PlaySettings::from_config(w)?))
            }
            None => (None, None),
        };
        Ok(Self {
            session: SessionHandle::new(),
            registry: RegistryContract::new(rpc.clone(), &config.registry),
            rpc,
            wallet,
            build: BuildSettings::from_config(config),
            play,
            optimistic: OptimisticSettings::from_config(&config.optimistic),
            started_at: chrono::Utc::now(),
            prometheus,
        })
    }

    async fn refresh(&self) -> RefreshOutcome {
        builder::refresh(&self.session, &self.registry, self.rpc.as_ref(), &self.build).await
    }
}

// --- Errors ---

struct ApiError(PlayError);

impl From<PlayError> for ApiError {
    fn from(e: PlayError) -> Self {
        Self(e)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            PlayError::NoProvider => StatusCode::SERVICE_UNAVAILABLE,
            PlayError::NotConnected | PlayError::Rejected => StatusCode::BAD_REQUEST,
            PlayError::AlreadySubmitting => StatusCode::CONFLICT,
            PlayError::ReceiptTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            PlayError::NoAccounts | PlayError::Reverted { .. } | PlayError::Provider(_) => {
                StatusCode::BAD_GATEWAY
            }
        };
        if self.0.is_client_error() {
            tracing::info!(error = %self.0, "wallet request refused");
        } else {
            tracing::error!(error = %self.0, "wallet request failed");
        }
        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

// --- Templates ---

#[derive(Template)]
#[template(path = "leaderboard.html")]
struct LeaderboardTemplate {
    loading: bool,
    submitting: bool,
    connected: String,
    has_snapshot: bool,
    generation: u64,
    built_at: String,
    entries: Vec<RankedEntry>,
}

impl From<SessionView> for LeaderboardTemplate {
    fn from(view: SessionView) -> Self {
        let connected = view.connected.map(String::from).unwrap_or_default();
        match view.leaderboard {
            Some(snapshot) => Self {
                loading: view.loading,
                submitting: view.submitting,
                connected,
                has_snapshot: true,
                generation: snapshot.generation,
                built_at: snapshot.built_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
                entries: snapshot.entries,
            },
            None => Self {
                loading: view.loading,
                submitting: view.submitting,
                connected,
                has_snapshot: false,
                generation: view.generation,
                built_at: String::new(),
                entries: Vec::new(),
            },
        }
    }
}

// --- Handlers ---

async fn index(State(state): State<Arc<AppState>>) -> Response {
    match LeaderboardTemplate::from(state.session.view()).render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to render leaderboard page");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_secs: i64,
    generation: u64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime = chrono::Utc::now()
        .signed_duration_since(state.started_at)
        .num_seconds();

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: uptime,
        generation: state.session.with(|s| s.latest_generation()),
    })
}

async fn get_leaderboard(State(state): State<Arc<AppState>>) -> Json<SessionView> {
    Json(state.session.view())
}

#[derive(Serialize)]
struct RefreshResponse {
    outcome: RefreshOutcome,
    #[serde(flatten)]
    view: SessionView,
}

async fn post_refresh(State(state): State<Arc<AppState>>) -> Json<RefreshResponse> {
    let outcome = state.refresh().await;
    Json(RefreshResponse {
        outcome,
        view: state.session.view(),
    })
}

#[derive(Serialize)]
struct ConnectResponse {
    address: Address,
}

async fn post_connect(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ConnectResponse>, ApiError> {
    let address = play::connect_wallet(state.wallet.as_ref(), &state.session).await?;
    Ok(Json(ConnectResponse { address }))
}

async fn post_play(State(state): State<Arc<AppState>>) -> Result<Json<PlayReport>, ApiError> {
    let settings = state.play.as_ref().ok_or(PlayError::NoProvider)?;
    let report = play::play(
        state.wallet.as_ref(),
        &state.session,
        settings,
        &state.optimistic,
    )
    .await?;
    Ok(Json(report))
}

async fn get_metrics(State(state): State<Arc<AppState>>) -> Response {
    let Some(handle) = &state.prometheus else {
        return StatusCode::NOT_FOUND.into_response();
    };
    handle.run_upkeep();
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    )
        .into_response()
}

// --- Router ---

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/health", get(health))
        .route("/api/leaderboard", get(get_leaderboard))
        .route("/api/refresh", post(post_refresh))
        .route("/api/connect", post(post_connect))
        .route("/api/play", post(post_play))
        .route("/metrics", get(get_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Refresh on startup and then every `interval`.
fn spawn_refresh_loop(state: Arc<AppState>, interval: Duration) {
    let (tx, mut rx) = tokio::sync::mpsc::channel::<()>(8);
    tokio::spawn(async move {
        while rx.recv().await.is_some() {
            let span = tracing::info_span!("job_run", job = "leaderboard_refresh");
            let outcome = state.refresh().instrument(span).await;
            tracing::info!(outcome = outcome.as_str(), "leaderboard_refresh done");
        }
    });
    let _handles = scheduler::start(vec![scheduler::JobSpec {
        name: "leaderboard_refresh".to_string(),
        interval,
        run_immediately: true,
        tick: tx,
    }]);
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    let _otel_guard = common::observability::init_global("leaderboard-web", &config.general.log_level)?;

    let web_port = config.web.as_ref().map_or(8080, |w| w.port);
    let web_host = config
        .web
        .as_ref()
        .map_or("0.0.0.0".to_string(), |w| w.host.clone());

    let prometheus = metrics::init_global()?;
    let state = Arc::new(AppState::from_config(&config, Some(prometheus))?);
    if state.wallet.is_none() {
        tracing::warn!("no [wallet] section configured, connect and play are disabled");
    }

    spawn_refresh_loop(
        state.clone(),
        Duration::from_secs(config.leaderboard.refresh_interval_secs.max(1)),
    );

    let app = create_router(state);
    let addr: SocketAddr = format!("{web_host}:{web_port}").parse()?;
    tracing::info!("leaderboard listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use common::types::{Entry, LeaderboardSnapshot};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tower::ServiceExt;

    const UNREACHABLE: &str = "http://127.0.0.1:1";

    fn test_config(with_wallet: bool) -> Config {
        let wallet = if with_wallet {
            format!(
                r#"
[wallet]
rpc_url = "{UNREACHABLE}"
tx_count = 5
tx_value_wei = "5000000000000"
delta_per_tx = 0.000005
receipt_poll_ms = 10
receipt_timeout_secs = 1
"#
            )
        } else {
            String::new()
        };
        Config::from_toml_str(&format!(
            r#"
[general]
log_level = "info"

[rpc]
url = "{UNREACHABLE}"
timeout_secs = 1
max_retries = 0

[registry]
contract = "0x0000000000000000000000000000000000000001"
selector = "0x00000000"

[observability]
prometheus_port = 9095
{wallet}"#
        ))
        .unwrap()
    }

    fn test_state(with_wallet: bool) -> Arc<AppState> {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        Arc::new(AppState::from_config(&test_config(with_wallet), Some(handle)).unwrap())
    }

    fn seed(state: &AppState) {
        state.session.with(|s| {
            let ticket = s.begin_build();
            s.complete_build(
                ticket,
                LeaderboardSnapshot {
                    generation: ticket.generation(),
                    built_at: chrono::Utc::now(),
                    entries: vec![RankedEntry {
                        rank: 1,
                        entry: Entry {
                            address: Address::new("0xabc"),
                            raw_volume: 1500u32.into(),
                            volume: 1500.0,
                            display_volume: "1.5k".to_string(),
                            score: 100_000,
                            optimistic: false,
                        },
                    }],
                },
            );
        });
    }

    async fn send(app: Router, method: &str, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn json(body: &str) -> serde_json::Value {
        serde_json::from_str(body).unwrap()
    }

    #[tokio::test]
    async fn test_health_returns_ok() {
        let (status, body) = send(create_router(test_state(false)), "GET", "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        let v = json(&body);
        assert_eq!(v["status"], "ok");
        assert_eq!(v["generation"], 0);
    }

    #[tokio::test]
    async fn test_leaderboard_before_first_build() {
        let (status, body) = send(create_router(test_state(false)), "GET", "/api/leaderboard").await;
        assert_eq!(status, StatusCode::OK);
        let v = json(&body);
        assert_eq!(v["loading"], false);
        assert!(v["leaderboard"].is_null());
    }

    #[tokio::test]
    async fn test_leaderboard_serves_snapshot() {
        let state = test_state(false);
        seed(&state);
        let (_, body) = send(create_router(state), "GET", "/api/leaderboard").await;
        let v = json(&body);
        let entry = &v["leaderboard"]["entries"][0];
        assert_eq!(entry["rank"], 1);
        assert_eq!(entry["address"], "0xabc");
        assert_eq!(entry["raw_volume"], "1500");
        assert_eq!(entry["display_volume"], "1.5k");
        assert_eq!(entry["score"], 100_000);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_snapshot() {
        let state = test_state(false);
        seed(&state);
        let (status, body) = send(create_router(state), "POST", "/api/refresh").await;
        assert_eq!(status, StatusCode::OK);
        let v = json(&body);
        assert_eq!(v["outcome"], "failed");
        assert_eq!(v["loading"], false);
        assert_eq!(v["generation"], 2);
        assert_eq!(v["leaderboard"]["generation"], 1);
    }

    #[tokio::test]
    async fn test_connect_without_wallet_is_unavailable() {
        let (status, body) = send(create_router(test_state(false)), "POST", "/api/connect").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json(&body)["error"], "no wallet provider configured");
    }

    #[tokio::test]
    async fn test_play_requires_connected_wallet() {
        let state = test_state(true);
        let (status, body) = send(create_router(state.clone()), "POST", "/api/play").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json(&body)["error"], "no wallet connected");
        assert!(!state.session.view().submitting);
    }

    #[tokio::test]
    async fn test_play_provider_failure_clears_submitting() {
        let state = test_state(true);
        seed(&state);
        state.session.with(|s| s.connect(Address::new("0xabc")));

        let (status, body) = send(create_router(state.clone()), "POST", "/api/play").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(json(&body)["error"].as_str().unwrap().contains("wallet provider error"));

        let view = state.session.view();
        assert!(!view.submitting);
        assert!(!view.leaderboard.unwrap().entries[0].entry.optimistic);
    }

    #[tokio::test]
    async fn test_index_renders_table() {
        let state = test_state(false);
        let (status, body) = send(create_router(state.clone()), "GET", "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("No leaderboard yet."));

        seed(&state);
        let (_, body) = send(create_router(state), "GET", "/").await;
        assert!(body.contains("<code>0xabc</code>"));
        assert!(body.contains("1.5k"));
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (status, _) = send(create_router(test_state(false)), "GET", "/metrics").await;
        assert_eq!(status, StatusCode::OK);

        let state = AppState::from_config(&test_config(false), None).unwrap();
        let (status, _) = send(create_router(Arc::new(state)), "GET", "/metrics").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
