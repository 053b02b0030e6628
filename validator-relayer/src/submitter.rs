//! Builds, sends and checks the destination chain transaction for a single era.

use std::{fmt, sync::Arc, time::Duration};

use alloy::{
    hex,
    primitives::{B256, Bytes, TxHash},
};
use anyhow::Result;
use async_trait::async_trait;
use tokio::time::{self, Instant};
use tracing::{error, info, warn};

use crate::{
    fees::{FeeSchedule, RetryState},
    oracle::{EraIndex, EraOracle},
    shutdown::Shutdown,
};

/// The arguments of one validator set submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayCall {
    pub target_era: EraIndex,
    pub execution_fee: u128,
    pub relayer_fee: u128,
}

impl RelayCall {
    /// Value attached to the transaction, paying for both fees.
    pub fn value(&self) -> u128 {
        self.execution_fee.saturating_add(self.relayer_fee)
    }
}

/// What we learned about a transaction once it was included in a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InclusionReceipt {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
    pub success: bool,
    /// Message ids of `OutboundMessageAccepted` events emitted by the bridge gateway.
    pub accepted_message_ids: Vec<B256>,
}

/// Write side of the destination chain.
#[async_trait]
pub trait DestinationLedger: Send + Sync {
    /// ABI encoded calldata of `call`.
    fn calldata(&self, call: &RelayCall) -> Bytes;

    /// Execute `call` without broadcasting it. Fails if the call would revert.
    async fn simulate(&self, call: &RelayCall) -> Result<()>;

    /// Sign and broadcast `call`.
    async fn broadcast(&self, call: &RelayCall) -> Result<TxHash>;

    /// The receipt of `tx_hash`, or `None` if it has not been included yet.
    async fn inclusion(&self, tx_hash: TxHash) -> Result<Option<InclusionReceipt>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The active era already reached the target era.
    WindowClosed,
    /// The transaction was included but reverted.
    Reverted,
    /// The transaction succeeded but the gateway did not queue a message.
    NotAccepted,
    /// The dry run simulation of the call failed.
    SimulationFailed,
    /// Shutdown was requested before the attempt completed.
    Cancelled,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            FailureReason::WindowClosed => "era window closed",
            FailureReason::Reverted => "transaction reverted",
            FailureReason::NotAccepted => "outbound message not accepted by gateway",
            FailureReason::SimulationFailed => "simulation failed",
            FailureReason::Cancelled => "cancelled",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Accepted { tx_hash: TxHash },
    /// Broadcast, but no receipt arrived before the receipt timeout. The transaction may still be
    /// included, so it has to be tracked like an accepted one.
    InFlight { tx_hash: TxHash },
    AlreadyConfirmed,
    Failed(FailureReason),
}

/// Submits the validator set for an era. Every call sends at most one transaction and never retries.
/// A broadcast transaction without a receipt is reported as [SubmissionOutcome::InFlight].
#[async_trait]
pub trait Submitter: Send {
    async fn submit_for_era(
        &mut self,
        target_era: EraIndex,
        shutdown: &mut Shutdown,
    ) -> Result<SubmissionOutcome>;
}

#[derive(Debug, Clone, Copy)]
pub struct ExecutorOptions {
    pub fees: FeeSchedule,
    pub dry_run: bool,
    pub receipt_poll_interval: Duration,
    pub receipt_timeout: Duration,
}

pub struct SubmissionExecutor<O, D> {
    oracle: Arc<O>,
    destination: D,
    options: ExecutorOptions,
    retry: Option<RetryState>,
}

impl<O: EraOracle, D: DestinationLedger> SubmissionExecutor<O, D> {
    pub fn new(oracle: Arc<O>, destination: D, options: ExecutorOptions) -> Self {
        SubmissionExecutor {
            oracle,
            destination,
            options,
            retry: None,
        }
    }

    pub fn retry_state(&self) -> Option<&RetryState> {
        self.retry.as_ref()
    }

    pub fn destination(&self) -> &D {
        &self.destination
    }

    async fn wait_for_inclusion(
        &self,
        tx_hash: TxHash,
        shutdown: &mut Shutdown,
    ) -> Option<InclusionReceipt> {
        let deadline = Instant::now() + self.options.receipt_timeout;
        loop {
            // The transaction is already out, so a failed receipt query must not end the wait.
            match self.destination.inclusion(tx_hash).await {
                Ok(Some(receipt)) => return Some(receipt),
                Ok(None) => {}
                Err(e) => warn!(%tx_hash, "Failed to query receipt: {e}"),
            }
            if Instant::now() >= deadline {
                return None;
            }
            tokio::select! {
                _ = time::sleep(self.options.receipt_poll_interval) => {}
                _ = shutdown.triggered() => {
                    warn!(%tx_hash, "Shutdown while waiting for inclusion; transaction was already broadcast");
                    return None;
                }
            }
        }
    }
}

#[async_trait]
impl<O: EraOracle, D: DestinationLedger> Submitter for SubmissionExecutor<O, D> {
    async fn submit_for_era(
        &mut self,
        target_era: EraIndex,
        shutdown: &mut Shutdown,
    ) -> Result<SubmissionOutcome> {
        // The caller's view may be stale by now, so check again.
        if let Some(active_era) = self.oracle.active_era().await? {
            if active_era.index >= target_era {
                warn!(
                    target_era,
                    active_era = active_era.index,
                    "Active era already reached target era, abandoning submission"
                );
                return Ok(SubmissionOutcome::Failed(FailureReason::WindowClosed));
            }
        }
        let external_index = self.oracle.external_index().await?;
        if external_index >= target_era {
            info!(target_era, external_index, "Era already confirmed");
            return Ok(SubmissionOutcome::AlreadyConfirmed);
        }

        if shutdown.is_triggered() {
            return Ok(SubmissionOutcome::Failed(FailureReason::Cancelled));
        }

        let retry = RetryState::next_attempt(self.retry.take(), target_era, &self.options.fees);
        let call = RelayCall {
            target_era,
            execution_fee: retry.execution_fee,
            relayer_fee: retry.relayer_fee,
        };
        let attempt = retry.attempt;
        self.retry = Some(retry);

        if self.options.dry_run {
            let payload = hex::encode_prefixed(self.destination.calldata(&call));
            let simulation = self.destination.simulate(&call).await;
            let simulation_result = match &simulation {
                Ok(()) => "success".to_owned(),
                Err(e) => format!("{e:#}"),
            };
            info!(
                target_era,
                attempt,
                execution_fee = call.execution_fee,
                relayer_fee = call.relayer_fee,
                value = call.value(),
                %payload,
                simulation = %simulation_result,
                "Dry run: simulated submission, not broadcasting"
            );
            return Ok(match simulation {
                Ok(()) => SubmissionOutcome::Accepted {
                    tx_hash: TxHash::ZERO,
                },
                Err(_) => SubmissionOutcome::Failed(FailureReason::SimulationFailed),
            });
        }

        let tx_hash = self.destination.broadcast(&call).await?;
        if let Some(retry) = self.retry.as_mut() {
            retry.last_tx_hash = Some(tx_hash);
        }
        info!(
            target_era,
            attempt,
            execution_fee = call.execution_fee,
            relayer_fee = call.relayer_fee,
            %tx_hash,
            "Submitted validator set"
        );

        let Some(receipt) = self.wait_for_inclusion(tx_hash, shutdown).await else {
            if shutdown.is_triggered() {
                return Ok(SubmissionOutcome::Failed(FailureReason::Cancelled));
            }
            warn!(
                target_era,
                %tx_hash,
                "Transaction not included before the receipt timeout, tracking it until the era ends"
            );
            return Ok(SubmissionOutcome::InFlight { tx_hash });
        };

        if !receipt.success {
            error!(target_era, %tx_hash, block = ?receipt.block_number, "Submission reverted");
            return Ok(SubmissionOutcome::Failed(FailureReason::Reverted));
        }
        if receipt.accepted_message_ids.is_empty() {
            error!(
                target_era,
                %tx_hash,
                block = ?receipt.block_number,
                fees_paid = call.value(),
                "Submission succeeded but the gateway did not accept an outbound message"
            );
            return Ok(SubmissionOutcome::Failed(FailureReason::NotAccepted));
        }

        info!(
            target_era,
            %tx_hash,
            block = ?receipt.block_number,
            message_ids = ?receipt.accepted_message_ids,
            "Outbound message accepted"
        );
        Ok(SubmissionOutcome::Accepted { tx_hash })
    }
}
