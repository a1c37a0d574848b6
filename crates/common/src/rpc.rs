use crate::types::{Address, ApiAssetTransfersPage, ApiTxReceipt, TransferDirection, TransferFilter};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Coarse error bucket used as a metrics label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    Timeout,
    Connect,
    HttpStatus,
    Rpc,
    Decode,
    Other,
}

impl ApiErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::HttpStatus => "http_status",
            Self::Rpc => "rpc",
            Self::Decode => "decode",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("transport error calling {method}: {source}")]
    Transport {
        method: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{method} returned HTTP {status}: {body}")]
    Status {
        method: &'static str,
        status: u16,
        body: String,
    },
    #[error("{method} returned JSON-RPC error {code}: {message}")]
    JsonRpc {
        method: &'static str,
        code: i64,
        message: String,
    },
    #[error("failed to decode {method} response: {reason}")]
    Decode { method: &'static str, reason: String },
}

impl RpcError {
    pub fn kind(&self) -> ApiErrorKind {
        match self {
            Self::Transport { source, .. } if source.is_timeout() => ApiErrorKind::Timeout,
            Self::Transport { source, .. } if source.is_connect() => ApiErrorKind::Connect,
            Self::Transport { .. } => ApiErrorKind::Other,
            Self::Status { .. } => ApiErrorKind::HttpStatus,
            Self::JsonRpc { .. } => ApiErrorKind::Rpc,
            Self::Decode { .. } => ApiErrorKind::Decode,
        }
    }

    /// Errors worth retrying: transport failures, rate limiting and 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::JsonRpc { .. } | Self::Decode { .. } => false,
        }
    }

    /// JSON-RPC error code, if the node answered with an error object.
    pub fn rpc_code(&self) -> Option<i64> {
        match self {
            Self::JsonRpc { code, .. } => Some(*code),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Value,
    error: Option<JsonRpcErrorObject>,
}

/// Minimal Ethereum JSON-RPC client over HTTP.
pub struct RpcClient {
    url: String,
    client: reqwest::Client,
    max_retries: u32,
    backoff_base: Duration,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(
        url: &str,
        timeout: Duration,
        max_retries: u32,
        backoff_base: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            client,
            max_retries,
            backoff_base,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn from_config(cfg: &crate::config::Rpc) -> anyhow::Result<Self> {
        Self::new(
            &cfg.url,
            Duration::from_secs(cfg.timeout_secs),
            cfg.max_retries,
            Duration::from_millis(cfg.backoff_base_ms),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Call with retries on transient failures. Only use for idempotent methods.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<T, RpcError> {
        let mut attempt = 0;
        loop {
            match self.call_once(method, params.clone()).await {
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = self.backoff_base * 2_u32.saturating_pow(attempt);
                    warn!(method, attempt, error = %e, delay_ms = delay.as_millis() as u64, "rpc call failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Single attempt with latency / request / error metrics.
    pub async fn call_once<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<T, RpcError> {
        let start = Instant::now();
        let res = self.send(method, params).await;
        let ms = start.elapsed().as_secs_f64() * 1000.0;
        metrics::histogram!("leaderboard_api_latency_ms", "method" => method).record(ms);
        match res {
            Ok(v) => {
                metrics::counter!("leaderboard_api_requests_total", "method" => method, "status" => "ok").increment(1);
                Ok(v)
            }
            Err(e) => {
                metrics::counter!("leaderboard_api_requests_total", "method" => method, "status" => "error").increment(1);
                metrics::counter!(
                    "leaderboard_api_errors_total",
                    "method" => method,
                    "kind" => e.kind().as_str()
                )
                .increment(1);
                Err(e)
            }
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<T, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        debug!(method, id, "rpc request");

        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|source| RpcError::Transport { method, source })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RpcError::Status {
                method,
                status: status.as_u16(),
                body,
            });
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|source| RpcError::Transport { method, source })?;
        decode_response(method, &bytes)
    }

    pub async fn get_asset_transfers(
        &self,
        filter: &TransferFilter,
        page_key: Option<&str>,
    ) -> Result<ApiAssetTransfersPage, RpcError> {
        self.call("alchemy_getAssetTransfers", transfer_params(filter, page_key))
            .await
    }

    /// Read the registry's address list with a no-argument `eth_call`.
    pub async fn registry_addresses(
        &self,
        contract: &str,
        selector: &str,
    ) -> Result<Vec<Address>, RpcError> {
        let data: String = self
            .call(
                "eth_call",
                json!([{ "to": contract, "data": selector }, "latest"]),
            )
            .await?;
        decode_address_array(&data).map_err(|reason| RpcError::Decode {
            method: "eth_call",
            reason,
        })
    }

    pub async fn request_accounts(&self) -> Result<Vec<Address>, RpcError> {
        let accounts: Vec<String> = self.call_once("eth_requestAccounts", json!([])).await?;
        Ok(accounts.into_iter().map(Address::from).collect())
    }

    /// Submit a transaction for the provider to sign. Never retried.
    pub async fn send_transaction(
        &self,
        from: &Address,
        to: &Address,
        value_hex: &str,
    ) -> Result<String, RpcError> {
        self.call_once(
            "eth_sendTransaction",
            json!([{ "from": from.as_str(), "to": to.as_str(), "value": value_hex }]),
        )
        .await
    }

    pub async fn transaction_receipt(&self, hash: &str) -> Result<Option<ApiTxReceipt>, RpcError> {
        self.call("eth_getTransactionReceipt", json!([hash])).await
    }
}

fn decode_response<T: DeserializeOwned>(method: &'static str, bytes: &[u8]) -> Result<T, RpcError> {
    let resp: JsonRpcResponse = serde_json::from_slice(bytes).map_err(|e| RpcError::Decode {
        method,
        reason: e.to_string(),
    })?;
    if let Some(err) = resp.error {
        return Err(RpcError::JsonRpc {
            method,
            code: err.code,
            message: err.message,
        });
    }
    serde_json::from_value(resp.result).map_err(|e| RpcError::Decode {
        method,
        reason: e.to_string(),
    })
}

pub fn transfer_params(filter: &TransferFilter, page_key: Option<&str>) -> Value {
    let mut query = json!({
        "fromBlock": filter.from_block,
        "toBlock": filter.to_block,
        "category": filter.category,
        "maxCount": format!("0x{:x}", filter.max_count),
        "excludeZeroValue": false,
        "withMetadata": false,
    });
    match &filter.direction {
        TransferDirection::From(addr) => query["fromAddress"] = json!(addr.as_str()),
        TransferDirection::To(addr) => query["toAddress"] = json!(addr.as_str()),
    }
    if let Some(key) = page_key {
        query["pageKey"] = json!(key);
    }
    json!([query])
}

/// Decode an ABI-encoded dynamic `address[]` return value.
pub fn decode_address_array(data: &str) -> Result<Vec<Address>, String> {
    let bytes = hex::decode(data.trim_start_matches("0x")).map_err(|e| e.to_string())?;
    let tokens = ethers::abi::decode(
        &[ethers::abi::ParamType::Array(Box::new(
            ethers::abi::ParamType::Address,
        ))],
        &bytes,
    )
    .map_err(|e| format!("invalid address[] return data: {e}"))?;

    let Some(ethers::abi::Token::Array(items)) = tokens.into_iter().next() else {
        return Err("return data is not an address array".to_string());
    };
    items
        .into_iter()
        .map(|token| match token {
            ethers::abi::Token::Address(addr) => Ok(Address::new(&format!("{addr:#x}"))),
            other => Err(format!("unexpected token in address array: {other:?}")),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(n: u64) -> String {
        format!("{n:064x}")
    }

    fn addr_word(hex_addr: &str) -> String {
        format!("{:0>64}", hex_addr.trim_start_matches("0x"))
    }

    #[test]
    fn test_decode_address_array() {
        let data = format!(
            "0x{}{}{}{}",
            word(32),
            word(2),
            addr_word("0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA"),
            addr_word("0x00000000000000000000000000000000000000bb"),
        );
        let addrs = decode_address_array(&data).unwrap();
        assert_eq!(addrs.len(), 2);
        assert_eq!(addrs[0].as_str(), "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
        assert_eq!(addrs[1].as_str(), "0x00000000000000000000000000000000000000bb");
    }

    #[test]
    fn test_decode_empty_address_array() {
        let data = format!("0x{}{}", word(32), word(0));
        assert!(decode_address_array(&data).unwrap().is_empty());
    }

    #[test]
    fn test_decode_rejects_truncated_data() {
        assert!(decode_address_array("0x").is_err());
        let data = format!("0x{}{}", word(32), word(3));
        assert!(decode_address_array(&data).is_err());
        let data = format!("0x{}{}", word(4096), word(0));
        assert!(decode_address_array(&data).is_err());
        assert!(decode_address_array("0xzz").is_err());
    }

    #[test]
    fn test_decode_address_array_from_registry_call() {
        // Offset word not pointing directly after itself, as some compilers emit.
        let data = format!(
            "0x{}{}{}{}",
            word(64),
            word(0),
            word(1),
            addr_word("0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045"),
        );
        let addrs = decode_address_array(&data).unwrap();
        assert_eq!(
            addrs,
            vec![Address::new("0xd8da6bf26964af9d7eed9e03e53415d37aa96045")]
        );
    }

    #[test]
    fn test_transfer_params_direction_and_page_key() {
        let filter = TransferFilter {
            from_block: "0x0".to_string(),
            to_block: "latest".to_string(),
            category: vec!["external".to_string()],
            direction: TransferDirection::To(Address::new("0xAB")),
            max_count: 1000,
        };
        let params = transfer_params(&filter, Some("next"));
        assert_eq!(params[0]["toAddress"], "0xab");
        assert!(params[0].get("fromAddress").is_none());
        assert_eq!(params[0]["pageKey"], "next");
        assert_eq!(params[0]["maxCount"], "0x3e8");
        assert_eq!(params[0]["category"][0], "external");

        let first = transfer_params(&filter, None);
        assert!(first[0].get("pageKey").is_none());
    }

    #[test]
    fn test_decode_response_error_object() {
        let body = br#"{"jsonrpc":"2.0","id":1,"error":{"code":4001,"message":"User rejected the request."}}"#;
        let err = decode_response::<String>("eth_sendTransaction", body).unwrap_err();
        assert_eq!(err.rpc_code(), Some(4001));
        assert_eq!(err.kind(), ApiErrorKind::Rpc);
        assert!(!err.is_transient());
    }

    #[test]
    fn test_decode_response_null_result() {
        let body = br#"{"jsonrpc":"2.0","id":1,"result":null}"#;
        let receipt: Option<ApiTxReceipt> =
            decode_response("eth_getTransactionReceipt", body).unwrap();
        assert!(receipt.is_none());

        let err = decode_response::<ApiAssetTransfersPage>("alchemy_getAssetTransfers", body)
            .unwrap_err();
        assert_eq!(err.kind(), ApiErrorKind::Decode);
    }

    #[test]
    fn test_status_errors_transient_classification() {
        let rate_limited = RpcError::Status {
            method: "eth_call",
            status: 429,
            body: String::new(),
        };
        assert!(rate_limited.is_transient());
        let bad_request = RpcError::Status {
            method: "eth_call",
            status: 400,
            body: String::new(),
        };
        assert!(!bad_request.is_transient());
        assert_eq!(bad_request.kind().as_str(), "http_status");
    }
}
