pub mod heartbeat;
pub mod query;

use std::path::Path;

use anyhow::Context;
use discovery_client::DiscoveryConfig;

/// Load the config file (if any) and apply `--server` overrides.
pub fn load_config(path: Option<&Path>, servers: &[String]) -> anyhow::Result<DiscoveryConfig> {
    let mut config = match path {
        Some(path) => DiscoveryConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => DiscoveryConfig::default(),
    };
    if !servers.is_empty() {
        config.discovery_servers = servers.to_vec();
    }
    config
        .validate()
        .context("no discovery servers: pass --server or --config")?;
    Ok(config)
}
