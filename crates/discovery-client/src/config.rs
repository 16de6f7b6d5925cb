//! Client configuration.
//!
//! Loaded from TOML or built in code. Durations are strings such as
//! `"500ms"`, `"5s"` or `"2m"`; accessors resolve defaults.
//!
//! ```toml
//! discovery_servers = ["ds-1:9020", "ds-2:9020", "ds-3:9020"]
//! rpc_timeout = "2s"
//! server_ban_timeout = "30s"
//! superseded_heartbeats = "ignore"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DiscoveryError, DiscoveryResult};

const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_SERVER_BAN_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// How a heartbeat rejected in favor of a higher-ranked registration is
/// reported to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupersededPolicy {
    /// Return [`DiscoveryError::Superseded`].
    #[default]
    Error,
    /// Log and report success.
    Ignore,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Static discovery server addresses (`host:port`).
    pub discovery_servers: Vec<String>,
    /// `host:port` resolved through DNS when no static servers are given.
    pub discovery_dns: Option<String>,
    /// Timeout for a single attempt against a single server.
    pub rpc_timeout: Option<String>,
    /// Overall deadline for one call across all attempts.
    pub request_timeout: Option<String>,
    /// How long a failed server stays deprioritized.
    pub server_ban_timeout: Option<String>,
    /// Cap on attempts per call. The server count always bounds it too.
    pub max_attempts: Option<usize>,
    /// Period of address re-resolution for dynamic server lists.
    pub refresh_interval: Option<String>,
    pub superseded_heartbeats: SupersededPolicy,
}

impl DiscoveryConfig {
    pub fn with_servers<I, S>(servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            discovery_servers: servers.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn from_file(path: &Path) -> DiscoveryResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DiscoveryError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> DiscoveryResult<Self> {
        let config: DiscoveryConfig =
            toml::from_str(content).map_err(|e| DiscoveryError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that an address source exists and every setting is usable.
    pub fn validate(&self) -> DiscoveryResult<()> {
        if self.discovery_servers.is_empty() && self.discovery_dns.is_none() {
            return Err(DiscoveryError::Config(
                "either discovery_servers or discovery_dns must be set".into(),
            ));
        }
        self.validate_settings()
    }

    /// Check durations and limits, ignoring the address source.
    pub fn validate_settings(&self) -> DiscoveryResult<()> {
        for (name, value) in [
            ("rpc_timeout", &self.rpc_timeout),
            ("request_timeout", &self.request_timeout),
            ("server_ban_timeout", &self.server_ban_timeout),
            ("refresh_interval", &self.refresh_interval),
        ] {
            if let Some(s) = value {
                if parse_duration(s).is_none() {
                    return Err(DiscoveryError::Config(format!("invalid {name}: {s:?}")));
                }
            }
        }
        if self.max_attempts == Some(0) {
            return Err(DiscoveryError::Config("max_attempts must be positive".into()));
        }
        Ok(())
    }

    pub fn rpc_timeout(&self) -> Duration {
        resolve(&self.rpc_timeout, DEFAULT_RPC_TIMEOUT)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout.as_deref().and_then(parse_duration)
    }

    pub fn server_ban_timeout(&self) -> Duration {
        resolve(&self.server_ban_timeout, DEFAULT_SERVER_BAN_TIMEOUT)
    }

    pub fn refresh_interval(&self) -> Duration {
        resolve(&self.refresh_interval, DEFAULT_REFRESH_INTERVAL)
    }
}

fn resolve(value: &Option<String>, default: Duration) -> Duration {
    value.as_deref().and_then(parse_duration).unwrap_or(default)
}

/// Parse a duration string like "5s", "500ms", "1m".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok()?.checked_mul(60).map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
