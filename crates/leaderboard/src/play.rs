//! Wallet connect and the "play" transaction batch.

use anyhow::Context;
use common::config::Wallet;
use common::rpc::RpcError;
use common::types::Address;
use num_bigint::BigUint;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

use crate::reconciler::{ApplyOutcome, OptimisticSettings};
use crate::session::{PlayGuard, SessionHandle};
use crate::sources::WalletProvider;

/// EIP-1193 "user rejected request".
const USER_REJECTED_CODE: i64 = 4001;

#[derive(Debug, thiserror::Error)]
pub enum PlayError {
    #[error("no wallet provider configured")]
    NoProvider,
    #[error("no wallet connected")]
    NotConnected,
    #[error("a transaction batch is already being submitted")]
    AlreadySubmitting,
    #[error("wallet returned no accounts")]
    NoAccounts,
    #[error("request rejected in wallet")]
    Rejected,
    #[error("transaction {hash} reverted")]
    Reverted { hash: String },
    #[error("timed out waiting for receipt of {hash}")]
    ReceiptTimeout { hash: String },
    #[error("wallet provider error: {0:#}")]
    Provider(anyhow::Error),
}

impl PlayError {
    /// True for errors caused by the caller's state rather than the wallet.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotConnected | Self::AlreadySubmitting | Self::Rejected
        )
    }
}

fn classify(err: anyhow::Error) -> PlayError {
    let rejected = err
        .downcast_ref::<RpcError>()
        .and_then(RpcError::rpc_code)
        == Some(USER_REJECTED_CODE);
    if rejected {
        PlayError::Rejected
    } else {
        PlayError::Provider(err)
    }
}

#[derive(Debug, Clone)]
pub struct PlaySettings {
    pub tx_count: u32,
    pub tx_value_hex: String,
    pub delta_per_tx: f64,
    pub receipt_poll: Duration,
    pub receipt_timeout: Duration,
}

impl PlaySettings {
    pub fn from_config(cfg: &Wallet) -> anyhow::Result<Self> {
        let value = BigUint::parse_bytes(cfg.tx_value_wei.trim().as_bytes(), 10)
            .with_context(|| format!("wallet.tx_value_wei is not an integer: {}", cfg.tx_value_wei))?;
        Ok(Self {
            tx_count: cfg.tx_count,
            tx_value_hex: format!("0x{value:x}"),
            delta_per_tx: cfg.delta_per_tx,
            receipt_poll: Duration::from_millis(cfg.receipt_poll_ms),
            receipt_timeout: Duration::from_secs(cfg.receipt_timeout_secs),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayReport {
    pub address: Address,
    pub tx_hashes: Vec<String>,
    pub delta: f64,
    pub optimistic: ApplyOutcome,
}

/// Ask the wallet for account access and remember the first account.
pub async fn connect_wallet<W: WalletProvider + Sync>(
    wallet: Option<&W>,
    session: &SessionHandle,
) -> Result<Address, PlayError> {
    let wallet = wallet.ok_or(PlayError::NoProvider)?;
    let accounts = wallet.request_accounts().await.map_err(classify)?;
    let address = accounts.into_iter().next().ok_or(PlayError::NoAccounts)?;
    info!(address = %address, "wallet connected");
    session.with(|s| s.connect(address.clone()));
    Ok(address)
}

async fn wait_for_receipt<W: WalletProvider + Sync>(
    wallet: &W,
    hash: &str,
    settings: &PlaySettings,
) -> Result<(), PlayError> {
    let poll = async {
        loop {
            match wallet.transaction_receipt(hash).await.map_err(classify)? {
                Some(receipt) if receipt.succeeded() => return Ok(()),
                Some(_) => {
                    return Err(PlayError::Reverted {
                        hash: hash.to_string(),
                    })
                }
                None => tokio::time::sleep(settings.receipt_poll).await,
            }
        }
    };
    tokio::time::timeout(settings.receipt_timeout, poll)
        .await
        .map_err(|_elapsed| PlayError::ReceiptTimeout {
            hash: hash.to_string(),
        })?
}

async fn submit_batch<W: WalletProvider + Sync>(
    wallet: &W,
    from: &Address,
    settings: &PlaySettings,
) -> Result<Vec<String>, PlayError> {
    let mut hashes = Vec::with_capacity(settings.tx_count as usize);
    for i in 0..settings.tx_count {
        let hash = wallet
            .send_transaction(from, from, &settings.tx_value_hex)
            .await
            .map_err(classify)?;
        wait_for_receipt(wallet, &hash, settings).await?;
        info!(address = %from, tx = %hash, n = i + 1, of = settings.tx_count, "transaction confirmed");
        hashes.push(hash);
    }
    Ok(hashes)
}

/// Send the self-transfer batch one transaction at a time, each confirmed before
/// the next, then apply the optimistic volume delta for the connected address.
///
/// The session's `submitting` flag is set for the duration and cleared on every
/// exit path. A partially sent batch applies no delta.
pub async fn play<W: WalletProvider + Sync>(
    wallet: Option<&W>,
    session: &SessionHandle,
    settings: &PlaySettings,
    optimistic: &OptimisticSettings,
) -> Result<PlayReport, PlayError> {
    let wallet = wallet.ok_or(PlayError::NoProvider)?;
    let from = session
        .with(|s| s.connected().cloned())
        .ok_or(PlayError::NotConnected)?;
    let _guard = PlayGuard::acquire(session).ok_or(PlayError::AlreadySubmitting)?;

    let tx_hashes = match submit_batch(wallet, &from, settings).await {
        Ok(hashes) => hashes,
        Err(e) => {
            warn!(address = %from, error = %e, "transaction batch failed");
            metrics::counter!("leaderboard_play_batches_total", "status" => "error").increment(1);
            return Err(e);
        }
    };

    let delta = settings.delta_per_tx * f64::from(settings.tx_count);
    let outcome = session.with(|s| s.apply_optimistic(&from, delta, optimistic));
    metrics::counter!("leaderboard_play_batches_total", "status" => "ok").increment(1);
    info!(address = %from, delta, ?outcome, "transaction batch complete");

    Ok(PlayReport {
        address: from,
        tx_hashes,
        delta,
        optimistic: outcome,
    })
}
