use common::rpc::RpcClient;
use common::types::{Address, TransferDirection, TransferFilter};
use std::time::Duration;

fn live_client() -> RpcClient {
    let url = std::env::var("LEADERBOARD_RPC_URL")
        .unwrap_or_else(|_| "https://eth-mainnet.g.alchemy.com/v2/demo".to_string());
    RpcClient::new(&url, Duration::from_secs(30), 1, Duration::from_millis(500)).unwrap()
}

#[tokio::test]
#[ignore] // requires network
async fn test_fetch_real_transfer_page_parses() {
    let client = live_client();
    let filter = TransferFilter {
        from_block: "0x0".to_string(),
        to_block: "latest".to_string(),
        category: vec!["external".to_string()],
        // Vitalik's public address: long history, always paginates.
        direction: TransferDirection::From(Address::new(
            "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045",
        )),
        max_count: 10,
    };
    let page = client.get_asset_transfers(&filter, None).await.unwrap();
    assert!(!page.transfers.is_empty());
    assert!(page.page_key.is_some());
}

#[tokio::test]
#[ignore] // requires network
async fn test_fetch_real_registry_addresses() {
    let Ok(contract) = std::env::var("LEADERBOARD_REGISTRY") else {
        return;
    };
    let selector = std::env::var("LEADERBOARD_REGISTRY_SELECTOR").unwrap();
    let addrs = live_client()
        .registry_addresses(&contract, &selector)
        .await
        .unwrap();
    assert!(addrs.iter().all(|a| a.as_str().starts_with("0x")));
}
