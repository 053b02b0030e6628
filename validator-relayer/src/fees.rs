use alloy::primitives::{TxHash, U256};

use crate::oracle::EraIndex;

/// Fixed-point scale of the accumulator in [compute_bumped_fee]; 18 decimal digits.
const FIXED_POINT_SCALE: u64 = 1_000_000_000_000_000_000;

/// Escalate `base_fee` by `bump_percent` percent per `attempt`, capped at `base_fee * cap_multiplier`.
///
/// All arithmetic is integer fixed-point, so the same inputs give the same fee on every platform. The
/// accumulator is only floored back to whole units once, at the end. At `attempt == 0` the result is
/// exactly `base_fee`.
pub fn compute_bumped_fee(
    base_fee: u128,
    attempt: u32,
    bump_percent: u32,
    cap_multiplier: u32,
) -> u128 {
    let cap = base_fee.saturating_mul(u128::from(cap_multiplier.max(1)));
    if attempt == 0 || bump_percent == 0 || base_fee == 0 {
        return base_fee.min(cap);
    }

    let scale = U256::from(FIXED_POINT_SCALE);
    let cap_scaled = U256::from(cap) * scale;
    let numerator = U256::from(100u64 + u64::from(bump_percent));
    let denominator = U256::from(100u64);

    let mut bumped = U256::from(base_fee) * scale;
    for _ in 0..attempt {
        bumped = bumped * numerator / denominator;
        // Growth is monotonic, so there is nothing left to do once the cap is reached.
        if bumped >= cap_scaled {
            return cap;
        }
    }

    let whole: u128 = (bumped / scale).to::<u128>();
    whole.min(cap)
}

/// Fee parameters shared by every submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSchedule {
    pub execution_fee: u128,
    pub relayer_fee: u128,
    pub bump_percent: u32,
    pub cap_multiplier: u32,
}

impl FeeSchedule {
    pub fn execution_fee_for(&self, attempt: u32) -> u128 {
        compute_bumped_fee(
            self.execution_fee,
            attempt,
            self.bump_percent,
            self.cap_multiplier,
        )
    }

    pub fn relayer_fee_for(&self, attempt: u32) -> u128 {
        compute_bumped_fee(
            self.relayer_fee,
            attempt,
            self.bump_percent,
            self.cap_multiplier,
        )
    }
}

/// Attempt bookkeeping for the era currently being submitted. Lives only in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    pub target_era: EraIndex,
    pub attempt: u32,
    pub execution_fee: u128,
    pub relayer_fee: u128,
    pub last_tx_hash: Option<TxHash>,
}

impl RetryState {
    pub fn new(target_era: EraIndex, schedule: &FeeSchedule) -> Self {
        RetryState {
            target_era,
            attempt: 0,
            execution_fee: schedule.execution_fee_for(0),
            relayer_fee: schedule.relayer_fee_for(0),
            last_tx_hash: None,
        }
    }

    /// Move on to the next attempt for the same era. Fees are derived from the base fees again rather
    /// than from the previous attempt's fees.
    pub fn bump(&mut self, schedule: &FeeSchedule) {
        self.attempt = self.attempt.saturating_add(1);
        self.execution_fee = schedule.execution_fee_for(self.attempt);
        self.relayer_fee = schedule.relayer_fee_for(self.attempt);
    }

    /// Returns the state to use for an attempt at `target_era`, starting over if the era has changed.
    pub fn next_attempt(
        previous: Option<RetryState>,
        target_era: EraIndex,
        schedule: &FeeSchedule,
    ) -> RetryState {
        match previous {
            Some(mut state) if state.target_era == target_era => {
                state.bump(schedule);
                state
            }
            _ => RetryState::new(target_era, schedule),
        }
    }

    pub fn total_fee(&self) -> u128 {
        self.execution_fee.saturating_add(self.relayer_fee)
    }
}
