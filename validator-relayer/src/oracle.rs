//! Read-only view of the source chain's era bookkeeping.

use anyhow::Result;
use async_trait::async_trait;

pub type EraIndex = u64;
pub type SessionIndex = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveEra {
    pub index: EraIndex,
}

/// Queries against the source ledger. None of these have side effects.
#[async_trait]
pub trait EraOracle: Send + Sync {
    /// The currently active era, or `None` if the source chain has not started tracking eras yet.
    async fn active_era(&self) -> Result<Option<ActiveEra>>;

    /// The last era whose validator set has been relayed and accepted.
    async fn external_index(&self) -> Result<EraIndex>;

    /// Whether the source chain is in the final session of the active era.
    async fn is_last_session_of_era(&self) -> Result<bool>;
}

/// The era we prepare a validator set for: always the one after the active era.
pub fn compute_target_era(active_era_index: EraIndex) -> EraIndex {
    active_era_index.saturating_add(1)
}

/// `true` if `current_session` is the last session of an era that started at `era_start_session`.
pub fn is_last_session(
    current_session: SessionIndex,
    era_start_session: SessionIndex,
    sessions_per_era: SessionIndex,
) -> bool {
    if current_session < era_start_session {
        return false;
    }
    let sessions_into_era = current_session - era_start_session + 1;
    sessions_into_era >= sessions_per_era.max(1)
}
