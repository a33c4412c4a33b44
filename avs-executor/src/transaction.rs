use std::time::Duration;

use alloy::network::{Ethereum, EthereumWallet, NetworkWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, B256};
use alloy::providers::{DynProvider, Provider};
use alloy::rpc::types::eth::{TransactionReceipt, TransactionRequest};
use alloy::transports::{RpcError, TransportErrorKind};
use async_trait::async_trait;
use mockall::automock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Failed to build transaction for {method}: {reason}")]
    Build { method: String, reason: String },

    #[error("No wallet configured to sign the transaction for {0}")]
    Unsigned(String),

    #[error("Failed to broadcast transaction {tx_hash}: {reason}")]
    Broadcast { tx_hash: B256, reason: String },

    #[error("Failed waiting for receipt of {tx_hash}: {reason}")]
    Receipt { tx_hash: B256, reason: String },

    #[error("Transaction {0} reverted")]
    Reverted(B256),
}

/// A write call on a bound contract, already ABI encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractTransaction {
    pub to: Address,
    pub method: String,
    pub calldata: Bytes,
}

#[derive(Debug, Clone)]
pub struct TransactionOutcome {
    pub tx_hash: B256,
    /// `None` in dry-run mode, where nothing is broadcast.
    pub receipt: Option<TransactionReceipt>,
}

impl TransactionOutcome {
    pub fn is_dry_run(&self) -> bool {
        self.receipt.is_none()
    }
}

/// Signs, submits and waits for write transactions.
#[automock]
#[async_trait]
pub trait TransactionManager: Send + Sync {
    async fn call_and_wait_for_receipt(&self, tx: ContractTransaction) -> Result<TransactionOutcome, TransactionError>;
}

pub struct AlloyTransactionManager {
    provider: DynProvider,
    /// Operator wallet. Without one every write fails before touching the chain.
    wallet: Option<EthereumWallet>,
    dry_run: bool,
    receipt_timeout: Duration,
}

impl AlloyTransactionManager {
    pub fn new(
        provider: DynProvider,
        wallet: Option<EthereumWallet>,
        dry_run: bool,
        receipt_timeout: Duration,
    ) -> Self {
        Self { provider, wallet, dry_run, receipt_timeout }
    }

    /// Fills nonce, chain id, gas and EIP-1559 fees for a call from `from`.
    async fn fill(&self, from: Address, tx: &ContractTransaction) -> Result<TransactionRequest, TransactionError> {
        let build_error = |e: RpcError<TransportErrorKind>| TransactionError::Build {
            method: tx.method.clone(),
            reason: e.to_string(),
        };
        let request =
            TransactionRequest::default().with_from(from).with_to(tx.to).with_input(tx.calldata.clone());

        let nonce = self.provider.get_transaction_count(from).pending().await.map_err(build_error)?;
        let chain_id = self.provider.get_chain_id().await.map_err(build_error)?;
        let gas_limit = self.provider.estimate_gas(request.clone()).await.map_err(build_error)?;
        let fees = self.provider.estimate_eip1559_fees().await.map_err(build_error)?;

        Ok(request
            .with_nonce(nonce)
            .with_chain_id(chain_id)
            .with_gas_limit(gas_limit)
            .with_max_fee_per_gas(fees.max_fee_per_gas)
            .with_max_priority_fee_per_gas(fees.max_priority_fee_per_gas))
    }
}

#[async_trait]
impl TransactionManager for AlloyTransactionManager {
    async fn call_and_wait_for_receipt(&self, tx: ContractTransaction) -> Result<TransactionOutcome, TransactionError> {
        let wallet = self.wallet.as_ref().ok_or_else(|| TransactionError::Unsigned(tx.method.clone()))?;
        let from = NetworkWallet::<Ethereum>::default_signer_address(wallet);

        let request = self.fill(from, &tx).await?;
        let envelope = request
            .build(wallet)
            .await
            .map_err(|e| TransactionError::Build { method: tx.method.clone(), reason: e.to_string() })?;
        let tx_hash = *envelope.tx_hash();

        if self.dry_run {
            tracing::info!(method = %tx.method, tx_hash = %tx_hash, "Dry run, transaction signed but not broadcast");
            return Ok(TransactionOutcome { tx_hash, receipt: None });
        }

        let pending = self
            .provider
            .send_tx_envelope(envelope)
            .await
            .map_err(|e| TransactionError::Broadcast { tx_hash, reason: e.to_string() })?;
        tracing::info!(method = %tx.method, tx_hash = %tx_hash, "Transaction broadcast, waiting for receipt");

        let receipt = pending
            .with_timeout(Some(self.receipt_timeout))
            .get_receipt()
            .await
            .map_err(|e| TransactionError::Receipt { tx_hash, reason: e.to_string() })?;

        if !receipt.status() {
            return Err(TransactionError::Reverted(tx_hash));
        }
        tracing::info!(tx_hash = %tx_hash, block = ?receipt.block_number, "Transaction included");
        Ok(TransactionOutcome { tx_hash, receipt: Some(receipt) })
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{address, U64};
    use alloy::providers::ProviderBuilder;
    use alloy::rpc::types::FeeHistory;
    use alloy::signers::local::PrivateKeySigner;
    use alloy::transports::mock::Asserter;
    use assert_matches::assert_matches;

    use super::*;

    // First anvil development key.
    const OPERATOR_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn contract_transaction() -> ContractTransaction {
        ContractTransaction {
            to: address!("0000000000000000000000000000000000000a11"),
            method: "deregisterOperatorFromAVS(address)".to_string(),
            calldata: Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]),
        }
    }

    fn manager(asserter: &Asserter, wallet: Option<EthereumWallet>, dry_run: bool) -> AlloyTransactionManager {
        let provider = ProviderBuilder::new().connect_mocked_client(asserter.clone()).erased();
        AlloyTransactionManager::new(provider, wallet, dry_run, Duration::from_secs(1))
    }

    /// Queues the responses for nonce, chain id, gas and fee history, in that order.
    fn push_fill_responses(asserter: &Asserter) {
        asserter.push_success(&U64::from(7));
        asserter.push_success(&U64::from(17_000));
        asserter.push_success(&U64::from(60_000));
        asserter.push_success(&FeeHistory {
            oldest_block: 100,
            base_fee_per_gas: vec![1_000_000_000, 1_000_000_000],
            gas_used_ratio: vec![0.5],
            reward: Some(vec![vec![1_000_000]]),
            ..Default::default()
        });
    }

    #[tokio::test]
    async fn dry_run_signs_without_broadcasting() {
        let asserter = Asserter::new();
        push_fill_responses(&asserter);
        let signer: PrivateKeySigner = OPERATOR_KEY.parse().unwrap();
        let manager = manager(&asserter, Some(EthereumWallet::from(signer)), true);

        let outcome = manager.call_and_wait_for_receipt(contract_transaction()).await.unwrap();

        assert!(outcome.is_dry_run());
        assert_ne!(outcome.tx_hash, B256::ZERO);
        // Nothing left queued and nothing else requested: a broadcast would have
        // failed on the empty queue.
        assert!(asserter.read_q().is_empty());
    }

    #[tokio::test]
    async fn broadcast_failure_reports_the_signed_hash() {
        let asserter = Asserter::new();
        push_fill_responses(&asserter);
        asserter.push_failure_msg("insufficient funds for gas");
        let signer: PrivateKeySigner = OPERATOR_KEY.parse().unwrap();
        let manager = manager(&asserter, Some(EthereumWallet::from(signer)), false);

        let err = manager.call_and_wait_for_receipt(contract_transaction()).await.unwrap_err();
        assert_matches!(err, TransactionError::Broadcast { tx_hash, .. } if tx_hash != B256::ZERO);
    }

    #[tokio::test]
    async fn missing_wallet_fails_before_any_request() {
        let asserter = Asserter::new();
        let manager = manager(&asserter, None, true);

        let err = manager.call_and_wait_for_receipt(contract_transaction()).await.unwrap_err();
        assert_matches!(err, TransactionError::Unsigned(method) if method == "deregisterOperatorFromAVS(address)");
    }
}
