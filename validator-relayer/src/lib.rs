use std::{fs, path::Path};

use anyhow::{Context, Result};

pub mod cfg;
pub mod deployment;
pub mod destination;
pub mod fees;
pub mod launcher;
pub mod oracle;
pub mod relayer;
pub mod serde_util;
pub mod shutdown;
pub mod source;
pub mod submitter;

pub fn read_config(config_file: &Path) -> Result<cfg::Config> {
    let config_content = fs::read_to_string(config_file)
        .with_context(|| format!("Please specify a config file, could not read {config_file:?}"))?;

    Ok(toml::from_str(&config_content)?)
}
