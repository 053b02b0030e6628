//! The polling loop which decides when to submit and tracks the submission in flight.

use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use alloy::primitives::TxHash;
use anyhow::Result;
use tokio::time;
use tracing::{debug, error, info, trace, warn};

use crate::{
    oracle::{EraIndex, EraOracle, compute_target_era},
    shutdown::Shutdown,
    submitter::{SubmissionOutcome, Submitter},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSubmission {
    pub target_era: EraIndex,
    pub tx_hash: TxHash,
    pub submitted_at_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RelayState {
    /// Nothing in flight.
    #[default]
    Idle,
    /// One submission sent and accepted, waiting for the source chain to confirm it.
    Pending(PendingSubmission),
}

/// What a single tick did, mostly useful for tests and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The source chain has not started tracking eras yet.
    NoActiveEra,
    /// The next era is already confirmed.
    UpToDate,
    /// The last session of the era has not started yet.
    OutsideWindow,
    /// Shutdown was requested before anything was submitted.
    Cancelled,
    Submitted(SubmissionOutcome),
    StillPending,
    Confirmed(EraIndex),
    Expired(EraIndex),
}

pub struct Relayer<O, S> {
    oracle: Arc<O>,
    submitter: S,
    poll_interval: Duration,
    state: RelayState,
    shutdown: Shutdown,
}

impl<O: EraOracle, S: Submitter> Relayer<O, S> {
    pub fn new(oracle: Arc<O>, submitter: S, poll_interval: Duration, shutdown: Shutdown) -> Self {
        Relayer {
            oracle,
            submitter,
            poll_interval,
            state: RelayState::Idle,
            shutdown,
        }
    }

    pub fn state(&self) -> &RelayState {
        &self.state
    }

    pub fn submitter(&self) -> &S {
        &self.submitter
    }

    /// Run ticks until shutdown is requested. Errors inside a tick are logged and the loop carries on.
    pub async fn run(mut self) -> Result<()> {
        info!(poll_interval = ?self.poll_interval, "Starting relayer loop");
        loop {
            if self.shutdown.is_triggered() {
                break;
            }

            match self.tick().await {
                Ok(outcome) => trace!(?outcome, "Tick complete"),
                Err(e) => error!("Tick failed, retrying after the poll interval: {e:#}"),
            }

            if self.shutdown.is_triggered() {
                break;
            }
            tokio::select! {
                _ = time::sleep(self.poll_interval) => {}
                _ = self.shutdown.triggered() => break,
            }
        }

        if let RelayState::Pending(pending) = &self.state {
            warn!(
                target_era = pending.target_era,
                tx_hash = %pending.tx_hash,
                "Shutting down with an unconfirmed submission"
            );
        }
        info!("Relayer loop stopped");
        Ok(())
    }

    pub async fn tick(&mut self) -> Result<TickOutcome> {
        match self.state.clone() {
            RelayState::Idle => self.tick_idle().await,
            RelayState::Pending(pending) => self.tick_pending(pending).await,
        }
    }

    async fn tick_idle(&mut self) -> Result<TickOutcome> {
        let Some(active_era) = self.oracle.active_era().await? else {
            debug!("No active era yet");
            return Ok(TickOutcome::NoActiveEra);
        };
        let target_era = compute_target_era(active_era.index);

        let external_index = self.oracle.external_index().await?;
        if external_index >= target_era {
            debug!(target_era, external_index, "Validator set already relayed");
            return Ok(TickOutcome::UpToDate);
        }

        if !self.oracle.is_last_session_of_era().await? {
            debug!(target_era, "Not in the last session of the era yet");
            return Ok(TickOutcome::OutsideWindow);
        }

        if self.shutdown.is_triggered() {
            debug!(target_era, "Shutdown requested, not submitting");
            return Ok(TickOutcome::Cancelled);
        }

        info!(target_era, external_index, "Submitting validator set");
        let outcome = self
            .submitter
            .submit_for_era(target_era, &mut self.shutdown)
            .await?;
        match outcome {
            SubmissionOutcome::Accepted { tx_hash } | SubmissionOutcome::InFlight { tx_hash } => {
                info!(target_era, %tx_hash, "Submission pending confirmation");
                self.state = RelayState::Pending(PendingSubmission {
                    target_era,
                    tx_hash,
                    submitted_at_ms: now_ms(),
                });
            }
            SubmissionOutcome::AlreadyConfirmed => {
                info!(target_era, "Era was confirmed by someone else");
            }
            SubmissionOutcome::Failed(reason) => {
                error!(target_era, %reason, "Submission failed");
            }
        }
        Ok(TickOutcome::Submitted(outcome))
    }

    async fn tick_pending(&mut self, pending: PendingSubmission) -> Result<TickOutcome> {
        let target_era = pending.target_era;

        let external_index = self.oracle.external_index().await?;
        if external_index >= target_era {
            info!(
                target_era,
                external_index,
                tx_hash = %pending.tx_hash,
                elapsed_ms = now_ms().saturating_sub(pending.submitted_at_ms),
                "Validator set confirmed"
            );
            self.state = RelayState::Idle;
            return Ok(TickOutcome::Confirmed(target_era));
        }

        if let Some(active_era) = self.oracle.active_era().await? {
            if active_era.index >= target_era {
                error!(
                    target_era,
                    active_era = active_era.index,
                    external_index,
                    tx_hash = %pending.tx_hash,
                    "Era started before the submission was confirmed, validator set update missed"
                );
                self.state = RelayState::Idle;
                return Ok(TickOutcome::Expired(target_era));
            }
        }

        debug!(target_era, tx_hash = %pending.tx_hash, "Waiting for confirmation");
        Ok(TickOutcome::StillPending)
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}
