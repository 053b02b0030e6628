use std::{fs, path::Path};

use alloy::primitives::Address;
use anyhow::{Context, Result};
use serde::Deserialize;

/// Contract addresses of one network's deployment, stored as `<network>.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DeploymentRecord {
    pub middleware: Address,
    pub gateway: Address,
}

impl DeploymentRecord {
    pub fn load(dir: &Path, network: &str) -> Result<Self> {
        let path = dir.join(format!("{network}.json"));
        let content = fs::read_to_string(&path)
            .with_context(|| format!("No deployment record for network {network} at {path:?}"))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid deployment record {path:?}"))
    }
}
