use alloy::{
    network::{EthereumWallet, ReceiptResponse},
    primitives::{Address, B256, Bytes, TxHash, U256},
    providers::{DynProvider, Provider, ProviderBuilder, WsConnect},
    rpc::types::TransactionReceipt,
    signers::local::PrivateKeySigner,
    sol,
    sol_types::SolCall,
};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::{
    cfg::RelayerConfig,
    submitter::{DestinationLedger, InclusionReceipt, RelayCall},
};

sol! {
    #[sol(rpc)]
    interface IMiddleware {
        function sendCurrentOperatorsKeys(uint64 targetEra, uint128 executionFee, uint128 relayerFee) external payable;
        function authorizedSubmitter() external view returns (address);
    }

    interface IGateway {
        event OutboundMessageAccepted(bytes32 indexed channelID, uint64 nonce, bytes32 indexed messageID, bytes payload);
    }
}

/// Client for the destination chain, signing with the relayer's key.
#[derive(Clone)]
pub struct DestinationClient {
    pub rpc_url: String,
    pub provider: DynProvider,
    pub middleware_address: Address,
    pub gateway_address: Address,
    pub chain_id: u64,
    pub signer: PrivateKeySigner,
}

impl DestinationClient {
    pub async fn new(config: &RelayerConfig) -> Result<Self> {
        let rpc_url = &config.destination.rpc_url;
        info!("Connecting to destination chain at {rpc_url}");
        let wallet = EthereumWallet::from(config.signer.clone());
        let provider = ProviderBuilder::new()
            .wallet(wallet)
            .on_ws(WsConnect::new(rpc_url))
            .await?
            .erased();

        let chain_id = provider.get_chain_id().await?;
        if let Some(expected) = config.destination.chain_id {
            if chain_id != expected {
                return Err(anyhow!(
                    "Chain id mismatch - {rpc_url} wanted chain id {expected} but got {chain_id}"
                ));
            }
        }

        Ok(DestinationClient {
            rpc_url: rpc_url.clone(),
            provider,
            middleware_address: config.middleware_address,
            gateway_address: config.gateway_address,
            chain_id,
            signer: config.signer.clone(),
        })
    }

    /// The account the middleware accepts validator set submissions from.
    pub async fn authorized_submitter(&self) -> Result<Address> {
        let middleware = IMiddleware::new(self.middleware_address, self.provider.clone());
        Ok(middleware.authorizedSubmitter().call().await?._0)
    }

    /// Fail unless our signer is the middleware's authorized submitter.
    pub async fn ensure_authorized(&self) -> Result<()> {
        let authorized = self.authorized_submitter().await?;
        let ours = self.signer.address();
        if authorized != ours {
            return Err(anyhow!(
                "Signer {ours} is not the authorized submitter {authorized} of middleware {}",
                self.middleware_address
            ));
        }
        info!(signer = %ours, "Signer is the authorized submitter");
        Ok(())
    }

    fn accepted_message_ids(&self, receipt: &TransactionReceipt) -> Vec<B256> {
        receipt
            .inner
            .logs()
            .iter()
            .filter(|log| log.address() == self.gateway_address)
            .filter_map(|log| {
                log.log_decode::<IGateway::OutboundMessageAccepted>()
                    .ok()
                    .map(|decoded| decoded.inner.data.messageID)
            })
            .collect()
    }
}

#[async_trait]
impl DestinationLedger for DestinationClient {
    fn calldata(&self, call: &RelayCall) -> Bytes {
        IMiddleware::sendCurrentOperatorsKeysCall {
            targetEra: call.target_era,
            executionFee: call.execution_fee,
            relayerFee: call.relayer_fee,
        }
        .abi_encode()
        .into()
    }

    async fn simulate(&self, call: &RelayCall) -> Result<()> {
        let middleware = IMiddleware::new(self.middleware_address, self.provider.clone());
        middleware
            .sendCurrentOperatorsKeys(call.target_era, call.execution_fee, call.relayer_fee)
            .from(self.signer.address())
            .value(U256::from(call.value()))
            .call()
            .await?;
        Ok(())
    }

    async fn broadcast(&self, call: &RelayCall) -> Result<TxHash> {
        let middleware = IMiddleware::new(self.middleware_address, self.provider.clone());
        let pending = middleware
            .sendCurrentOperatorsKeys(call.target_era, call.execution_fee, call.relayer_fee)
            .value(U256::from(call.value()))
            .send()
            .await?;
        Ok(*pending.tx_hash())
    }

    async fn inclusion(&self, tx_hash: TxHash) -> Result<Option<InclusionReceipt>> {
        let Some(receipt) = self.provider.get_transaction_receipt(tx_hash).await? else {
            debug!(%tx_hash, "Transaction not yet included");
            return Ok(None);
        };
        Ok(Some(InclusionReceipt {
            tx_hash,
            block_number: receipt.block_number,
            success: receipt.status(),
            accepted_message_ids: self.accepted_message_ids(&receipt),
        }))
    }
}
