use std::{path::PathBuf, time::Duration};

use alloy::{primitives::Address, signers::local::PrivateKeySigner};
use anyhow::{Result, anyhow};
use serde::Deserialize;

use crate::{
    deployment::DeploymentRecord, fees::FeeSchedule, serde_util::num_as_str,
    submitter::ExecutorOptions,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    pub rpc_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DestinationConfig {
    // Must be ws:// or wss://.
    pub rpc_url: String,
    /// Name of the deployment record to take contract addresses from.
    #[serde(default = "network_default")]
    pub network: String,
    /// Directory holding `<network>.json` deployment records.
    #[serde(default = "deployments_dir_default")]
    pub deployments_dir: PathBuf,
    /// Overrides the middleware address from the deployment record.
    #[serde(default)]
    pub middleware_address: Option<Address>,
    /// Overrides the gateway address from the deployment record.
    #[serde(default)]
    pub gateway_address: Option<Address>,
    /// If set, startup fails when the endpoint reports a different chain id.
    #[serde(default)]
    pub chain_id: Option<u64>,
    #[serde(default = "receipt_poll_interval_default")]
    pub receipt_poll_interval: Duration,
    /// How long to wait for a broadcast transaction to be included. Defaults to 3 minutes.
    #[serde(default = "receipt_timeout_default")]
    pub receipt_timeout: Duration,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeeConfig {
    /// Base execution fee, in wei.
    #[serde(with = "num_as_str")]
    pub execution_fee: u128,
    /// Base relayer fee, in wei.
    #[serde(with = "num_as_str")]
    pub relayer_fee: u128,
    /// Percentage added to both fees on every retry of the same era.
    #[serde(default = "bump_percent_default")]
    pub bump_percent: u32,
    /// Fees never exceed their base value times this multiplier.
    #[serde(default = "cap_multiplier_default")]
    pub cap_multiplier: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub source: SourceConfig,
    pub destination: DestinationConfig,
    pub fees: FeeConfig,
    /// Time between two ticks of the relayer loop. Defaults to 6 seconds.
    #[serde(default = "poll_interval_default")]
    pub poll_interval: Duration,
    /// Simulate submissions instead of broadcasting them.
    #[serde(default)]
    pub dry_run: bool,
}

pub fn network_default() -> String {
    "local".to_owned()
}

pub fn deployments_dir_default() -> PathBuf {
    PathBuf::from("deployments")
}

pub fn receipt_poll_interval_default() -> Duration {
    Duration::from_secs(2)
}

pub fn receipt_timeout_default() -> Duration {
    Duration::from_secs(180)
}

pub fn bump_percent_default() -> u32 {
    10
}

pub fn cap_multiplier_default() -> u32 {
    5
}

pub fn poll_interval_default() -> Duration {
    Duration::from_secs(6)
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.fees.cap_multiplier == 0 {
            return Err(anyhow!("fees.cap_multiplier must be at least 1"));
        }
        if self.poll_interval.is_zero() {
            return Err(anyhow!("poll_interval must not be zero"));
        }
        if self.destination.receipt_poll_interval.is_zero() {
            return Err(anyhow!("destination.receipt_poll_interval must not be zero"));
        }
        Ok(())
    }
}

/// Everything the relayer needs, assembled once at startup and never changed afterwards.
#[derive(Debug, Clone)]
pub struct RelayerConfig {
    pub source: SourceConfig,
    pub destination: DestinationConfig,
    pub signer: PrivateKeySigner,
    pub middleware_address: Address,
    pub gateway_address: Address,
    pub fees: FeeSchedule,
    pub poll_interval: Duration,
    pub dry_run: bool,
}

impl RelayerConfig {
    /// Combine the file configuration with the signer, filling in contract addresses from the
    /// deployment record when the configuration leaves them out.
    pub fn new(config: Config, signer: PrivateKeySigner) -> Result<Self> {
        config.validate()?;

        let destination = config.destination;
        let (middleware_address, gateway_address) =
            match (destination.middleware_address, destination.gateway_address) {
                (Some(middleware), Some(gateway)) => (middleware, gateway),
                (middleware, gateway) => {
                    let record =
                        DeploymentRecord::load(&destination.deployments_dir, &destination.network)?;
                    (
                        middleware.unwrap_or(record.middleware),
                        gateway.unwrap_or(record.gateway),
                    )
                }
            };

        Ok(RelayerConfig {
            source: config.source,
            destination,
            signer,
            middleware_address,
            gateway_address,
            fees: FeeSchedule {
                execution_fee: config.fees.execution_fee,
                relayer_fee: config.fees.relayer_fee,
                bump_percent: config.fees.bump_percent,
                cap_multiplier: config.fees.cap_multiplier,
            },
            poll_interval: config.poll_interval,
            dry_run: config.dry_run,
        })
    }

    pub fn executor_options(&self) -> ExecutorOptions {
        ExecutorOptions {
            fees: self.fees,
            dry_run: self.dry_run,
            receipt_poll_interval: self.destination.receipt_poll_interval,
            receipt_timeout: self.destination.receipt_timeout,
        }
    }
}
