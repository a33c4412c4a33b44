use alloy::eips::BlockNumberOrTag;
use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes};
use alloy::providers::{DynProvider, Provider};
use alloy::rpc::types::eth::TransactionRequest;
use async_trait::async_trait;
use mockall::automock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Ethereum RPC error: {0}")]
    Rpc(String),

    #[error("Read call to {to} failed: {reason}")]
    Call { to: Address, reason: String },

    #[error("Latest block is unavailable")]
    MissingBlock,
}

/// Read access to the connected chain.
#[automock]
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Numeric identifier of the connected chain
    async fn chain_id(&self) -> Result<u64, ChainError>;

    /// Timestamp (seconds) of the latest block
    async fn latest_block_timestamp(&self) -> Result<u64, ChainError>;

    /// Whether code is deployed at `address`
    async fn has_code(&self, address: Address) -> Result<bool, ChainError>;

    /// Executes a read-only call and returns the raw return data
    async fn call(&self, to: Address, calldata: Bytes) -> Result<Bytes, ChainError>;
}

pub struct AlloyChainClient {
    provider: DynProvider,
}

impl AlloyChainClient {
    pub fn new(provider: DynProvider) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl ChainClient for AlloyChainClient {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        self.provider.get_chain_id().await.map_err(|e| ChainError::Rpc(e.to_string()))
    }

    async fn latest_block_timestamp(&self) -> Result<u64, ChainError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?
            .ok_or(ChainError::MissingBlock)?;
        Ok(block.header.timestamp)
    }

    async fn has_code(&self, address: Address) -> Result<bool, ChainError> {
        let code = self.provider.get_code_at(address).await.map_err(|e| ChainError::Rpc(e.to_string()))?;
        Ok(!code.is_empty())
    }

    async fn call(&self, to: Address, calldata: Bytes) -> Result<Bytes, ChainError> {
        let request = TransactionRequest::default().with_to(to).with_input(calldata);
        self.provider.call(request).await.map_err(|e| ChainError::Call { to, reason: e.to_string() })
    }
}
