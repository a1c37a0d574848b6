use anyhow::Result;
use common::rpc::RpcClient;
use common::types::{Address, ApiAssetTransfersPage, ApiTxReceipt, TransferFilter};
use std::sync::Arc;

pub trait TransfersPager {
    fn fetch_transfers_page(
        &self,
        filter: &TransferFilter,
        page_key: Option<&str>,
    ) -> impl std::future::Future<Output = Result<ApiAssetTransfersPage>> + Send;
}

pub trait AddressRegistry {
    fn fetch_addresses(&self) -> impl std::future::Future<Output = Result<Vec<Address>>> + Send;
}

pub trait WalletProvider {
    fn request_accounts(&self) -> impl std::future::Future<Output = Result<Vec<Address>>> + Send;

    fn send_transaction(
        &self,
        from: &Address,
        to: &Address,
        value_hex: &str,
    ) -> impl std::future::Future<Output = Result<String>> + Send;

    fn transaction_receipt(
        &self,
        hash: &str,
    ) -> impl std::future::Future<Output = Result<Option<ApiTxReceipt>>> + Send;
}

impl TransfersPager for RpcClient {
    async fn fetch_transfers_page(
        &self,
        filter: &TransferFilter,
        page_key: Option<&str>,
    ) -> Result<ApiAssetTransfersPage> {
        Ok(self.get_asset_transfers(filter, page_key).await?)
    }
}

impl WalletProvider for RpcClient {
    async fn request_accounts(&self) -> Result<Vec<Address>> {
        Ok(RpcClient::request_accounts(self).await?)
    }

    async fn send_transaction(&self, from: &Address, to: &Address, value_hex: &str) -> Result<String> {
        Ok(RpcClient::send_transaction(self, from, to, value_hex).await?)
    }

    async fn transaction_receipt(&self, hash: &str) -> Result<Option<ApiTxReceipt>> {
        Ok(RpcClient::transaction_receipt(self, hash).await?)
    }
}

/// The on-chain registry listing tracked addresses, read through `eth_call`.
pub struct RegistryContract {
    client: Arc<RpcClient>,
    contract: String,
    selector: String,
}

impl RegistryContract {
    pub fn new(client: Arc<RpcClient>, cfg: &common::config::Registry) -> Self {
        Self {
            client,
            contract: cfg.contract.clone(),
            selector: cfg.selector.clone(),
        }
    }
}

impl AddressRegistry for RegistryContract {
    async fn fetch_addresses(&self) -> Result<Vec<Address>> {
        Ok(self
            .client
            .registry_addresses(&self.contract, &self.selector)
            .await?)
    }
}
