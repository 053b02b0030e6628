use anyhow::{Result, anyhow};
use async_trait::async_trait;
use subxt::{
    OnlineClient, PolkadotConfig,
    dynamic::{self, Value},
    ext::scale_value::At,
};
use tracing::{debug, info};

use crate::{
    cfg::SourceConfig,
    oracle::{ActiveEra, EraIndex, EraOracle, SessionIndex, is_last_session},
};

const EXTERNAL_VALIDATORS: &str = "ExternalValidators";
const SESSION: &str = "Session";

/// [EraOracle] backed by the `ExternalValidators` and `Session` pallets of a Substrate chain.
#[derive(Clone)]
pub struct SourceClient {
    pub rpc_url: String,
    client: OnlineClient<PolkadotConfig>,
    sessions_per_era: SessionIndex,
}

impl SourceClient {
    pub async fn new(config: &SourceConfig) -> Result<Self> {
        info!("Connecting to source chain at {}", config.rpc_url);
        let client = OnlineClient::<PolkadotConfig>::from_insecure_url(&config.rpc_url).await?;

        // Doubles as a check that the runtime actually has the pallet we need.
        let sessions_per_era = client
            .constants()
            .at(&dynamic::constant(EXTERNAL_VALIDATORS, "SessionsPerEra"))?
            .to_value()?
            .as_u128()
            .ok_or_else(|| anyhow!("SessionsPerEra is not an integer"))?;
        let sessions_per_era = SessionIndex::try_from(sessions_per_era)?;
        info!(sessions_per_era, "Connected to source chain");

        Ok(SourceClient {
            rpc_url: config.rpc_url.clone(),
            client,
            sessions_per_era,
        })
    }

    pub fn sessions_per_era(&self) -> SessionIndex {
        self.sessions_per_era
    }

    async fn fetch(
        &self,
        pallet: &str,
        entry: &str,
        keys: Vec<Value>,
    ) -> Result<Option<Value<u32>>> {
        let address = dynamic::storage(pallet, entry, keys);
        let value = self
            .client
            .storage()
            .at_latest()
            .await?
            .fetch(&address)
            .await?;
        match value {
            Some(thunk) => Ok(Some(thunk.to_value()?)),
            None => Ok(None),
        }
    }

    async fn fetch_u64(&self, pallet: &str, entry: &str, keys: Vec<Value>) -> Result<Option<u64>> {
        let Some(value) = self.fetch(pallet, entry, keys).await? else {
            return Ok(None);
        };
        let value = value
            .as_u128()
            .ok_or_else(|| anyhow!("{pallet}::{entry} is not an integer: {value}"))?;
        Ok(Some(u64::try_from(value)?))
    }

    async fn current_session(&self) -> Result<SessionIndex> {
        Ok(self
            .fetch_u64(SESSION, "CurrentIndex", vec![])
            .await?
            .unwrap_or_default())
    }

    async fn era_start_session(&self, era: EraIndex) -> Result<Option<SessionIndex>> {
        self.fetch_u64(
            EXTERNAL_VALIDATORS,
            "ErasStartSessionIndex",
            vec![Value::u128(u128::from(era))],
        )
        .await
    }
}

#[async_trait]
impl EraOracle for SourceClient {
    async fn active_era(&self) -> Result<Option<ActiveEra>> {
        let Some(value) = self.fetch(EXTERNAL_VALIDATORS, "ActiveEra", vec![]).await? else {
            return Ok(None);
        };
        let index = value
            .at("index")
            .and_then(|index| index.as_u128())
            .ok_or_else(|| anyhow!("ActiveEra has no integer index: {value}"))?;
        Ok(Some(ActiveEra {
            index: EraIndex::try_from(index)?,
        }))
    }

    async fn external_index(&self) -> Result<EraIndex> {
        Ok(self
            .fetch_u64(EXTERNAL_VALIDATORS, "ExternalIndex", vec![])
            .await?
            .unwrap_or_default())
    }

    async fn is_last_session_of_era(&self) -> Result<bool> {
        let Some(active_era) = self.active_era().await? else {
            return Ok(false);
        };
        let Some(era_start) = self.era_start_session(active_era.index).await? else {
            debug!(era = active_era.index, "No start session recorded for active era");
            return Ok(false);
        };
        let current = self.current_session().await?;
        Ok(is_last_session(current, era_start, self.sessions_per_era))
    }
}
