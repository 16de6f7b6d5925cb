//! Per-call options.
//!
//! Every option struct carries an optional `timeout`: the overall deadline
//! for the call, across all failover attempts.

use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeartbeatOptions {
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetGroupMetaOptions {
    pub timeout: Option<Duration>,
}

/// Read-path filter for listing members.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListMembersOptions {
    /// Upper bound on returned members. Must be positive when set.
    pub limit: Option<i32>,
    /// Attributes to return for each member. Empty returns all of them.
    pub attribute_keys: Vec<String>,
    pub timeout: Option<Duration>,
}

impl ListMembersOptions {
    pub fn with_limit(limit: i32) -> Self {
        Self {
            limit: Some(limit),
            ..Default::default()
        }
    }
}
