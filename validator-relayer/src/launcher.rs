//! Startup checks and wiring of the real source and destination clients.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::{
    cfg::RelayerConfig,
    destination::DestinationClient,
    oracle::EraOracle,
    relayer::Relayer,
    shutdown::Shutdown,
    source::SourceClient,
    submitter::SubmissionExecutor,
};

pub type LiveRelayer = Relayer<SourceClient, SubmissionExecutor<SourceClient, DestinationClient>>;

/// Connect to both chains and check that we are allowed to submit. Any failure here is fatal.
pub async fn launch(config: RelayerConfig, shutdown: Shutdown) -> Result<LiveRelayer> {
    info!(
        signer = %config.signer.address(),
        middleware = %config.middleware_address,
        gateway = %config.gateway_address,
        dry_run = config.dry_run,
        "Starting validator relayer"
    );

    let source = Arc::new(SourceClient::new(&config.source).await?);
    let external_index = source.external_index().await?;
    let active_era = source.active_era().await?.map(|era| era.index);
    info!(external_index, ?active_era, "Source chain reachable");

    let destination = DestinationClient::new(&config).await?;
    info!(chain_id = destination.chain_id, "Connected to destination chain");
    destination.ensure_authorized().await?;

    let executor = SubmissionExecutor::new(source.clone(), destination, config.executor_options());
    Ok(Relayer::new(source, executor, config.poll_interval, shutdown))
}
