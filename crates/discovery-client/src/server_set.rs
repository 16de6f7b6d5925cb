//! Candidate discovery servers and their health.
//!
//! A server that fails at the transport level is banned for
//! `ban_timeout`: it stays in the set but sorts after every healthy
//! server when an attempt plan is built. A success clears the ban.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{DiscoveryError, DiscoveryResult};

/// Longest ban a server can receive; larger configured values are clamped.
pub const MAX_BAN_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Point-in-time view of one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerStatus {
    pub address: String,
    pub healthy: bool,
    pub consecutive_failures: u32,
}

#[derive(Debug)]
struct Entry {
    address: String,
    consecutive_failures: u32,
    banned_until: Option<Instant>,
}

impl Entry {
    fn new(address: String) -> Self {
        Self {
            address,
            consecutive_failures: 0,
            banned_until: None,
        }
    }

    fn is_healthy(&self, now: Instant) -> bool {
        self.banned_until.is_none_or(|until| until <= now)
    }
}

#[derive(Debug)]
struct Inner {
    entries: Vec<Entry>,
    /// Rotating start position so concurrent calls spread across servers.
    cursor: usize,
}

#[derive(Debug)]
pub struct ServerSet {
    inner: Mutex<Inner>,
    ban_timeout: Duration,
}

impl ServerSet {
    /// Build a set from addresses. Blank and repeated addresses are
    /// dropped; at least one must remain. The ban timeout is capped at
    /// [`MAX_BAN_TIMEOUT`].
    pub fn new<I, S>(addresses: I, ban_timeout: Duration) -> DiscoveryResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let addresses = normalize(addresses)?;
        Ok(Self {
            inner: Mutex::new(Inner {
                entries: addresses.into_iter().map(Entry::new).collect(),
                cursor: 0,
            }),
            ban_timeout: ban_timeout.min(MAX_BAN_TIMEOUT),
        })
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn addresses(&self) -> Vec<String> {
        self.inner
            .lock()
            .entries
            .iter()
            .map(|e| e.address.clone())
            .collect()
    }

    /// Ordered, distinct servers to try for one call.
    ///
    /// Healthy servers come first in rotation order, then banned servers
    /// by earliest ban expiry. At most `max_attempts` addresses.
    pub fn plan(&self, max_attempts: usize) -> Vec<String> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let n = inner.entries.len();
        if n == 0 {
            return Vec::new();
        }

        let start = inner.cursor % n;
        inner.cursor = inner.cursor.wrapping_add(1);

        let mut healthy = Vec::with_capacity(n);
        let mut banned = Vec::new();
        for offset in 0..n {
            let entry = &inner.entries[(start + offset) % n];
            if entry.is_healthy(now) {
                healthy.push(entry.address.clone());
            } else {
                banned.push((entry.banned_until, entry.address.clone()));
            }
        }
        banned.sort_by_key(|(until, _)| *until);

        healthy
            .into_iter()
            .chain(banned.into_iter().map(|(_, address)| address))
            .take(max_attempts.min(n))
            .collect()
    }

    /// Record a transport failure against `address`.
    pub fn mark_unhealthy(&self, address: &str) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.entries.iter_mut().find(|e| e.address == address) {
            let was_healthy = entry.is_healthy(now);
            entry.consecutive_failures += 1;
            entry.banned_until = Some(now + self.ban_timeout);
            if was_healthy {
                warn!(
                    %address,
                    failures = entry.consecutive_failures,
                    ban = ?self.ban_timeout,
                    "discovery server marked unhealthy"
                );
            }
        }
    }

    /// Record a successful response from `address`.
    pub fn mark_healthy(&self, address: &str) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.entries.iter_mut().find(|e| e.address == address) {
            if entry.banned_until.take().is_some() {
                info!(%address, "discovery server recovered");
            }
            entry.consecutive_failures = 0;
        }
    }

    /// Swap in a freshly resolved address list.
    ///
    /// Addresses present in both lists keep their health state. Returns
    /// whether the membership of the set changed.
    pub fn replace<I, S>(&self, addresses: I) -> DiscoveryResult<bool>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let addresses = normalize(addresses)?;
        let mut inner = self.inner.lock();

        let unchanged = addresses.len() == inner.entries.len()
            && addresses
                .iter()
                .zip(&inner.entries)
                .all(|(a, e)| *a == e.address);
        if unchanged {
            return Ok(false);
        }

        let mut old = std::mem::take(&mut inner.entries);
        inner.entries = addresses
            .into_iter()
            .map(|address| match old.iter().position(|e| e.address == address) {
                Some(i) => old.swap_remove(i),
                None => Entry::new(address),
            })
            .collect();

        debug!(
            servers = inner.entries.len(),
            dropped = old.len(),
            "discovery server set replaced"
        );
        Ok(true)
    }

    pub fn snapshot(&self) -> Vec<ServerStatus> {
        let now = Instant::now();
        self.inner
            .lock()
            .entries
            .iter()
            .map(|e| ServerStatus {
                address: e.address.clone(),
                healthy: e.is_healthy(now),
                consecutive_failures: e.consecutive_failures,
            })
            .collect()
    }
}

fn normalize<I, S>(addresses: I) -> DiscoveryResult<Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut out: Vec<String> = Vec::new();
    for address in addresses {
        let address = address.into().trim().to_string();
        if !address.is_empty() && !out.contains(&address) {
            out.push(address);
        }
    }
    if out.is_empty() {
        return Err(DiscoveryError::Config(
            "at least one discovery server address is required".into(),
        ));
    }
    Ok(out)
}
