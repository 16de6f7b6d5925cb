//! In-process discovery tier.
//!
//! [`MemoryTransport`] models a replicated discovery tier: several server
//! addresses in front of one shared member table. It enforces leases on
//! the tokio clock, orders competing registrations by
//! `(priority, revision)`, and supports per-address fault injection.
//! Tests and local runs use it in place of a real cluster.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use discovery_types::{GroupMeta, Member};

use crate::error::{RemoteCode, TransportError};
use crate::transport::{
    DiscoveryRequest, DiscoveryResponse, HeartbeatRequest, ListMembersRequest, Transport,
};

/// What the tier does with a heartbeat ranked below the stored record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SupersedeBehavior {
    /// Reply with a superseded error.
    #[default]
    Reject,
    /// Reply with success and leave the stored record alone.
    Ignore,
}

/// Injected failure mode for one address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Fault {
    #[default]
    None,
    /// Connection refused.
    Unreachable,
    /// Connected, but the server reports itself unavailable.
    Unavailable,
}

#[derive(Debug, Default)]
struct ServerState {
    fault: Fault,
    latency: Duration,
    calls: u64,
}

#[derive(Debug)]
struct Record {
    member: Member,
    expires_at: Instant,
}

/// group path → member id → record
type Groups = BTreeMap<String, HashMap<String, Record>>;

#[derive(Debug)]
pub struct MemoryTransport {
    addresses: Vec<String>,
    servers: Mutex<HashMap<String, ServerState>>,
    groups: Mutex<Groups>,
    supersede: SupersedeBehavior,
}

impl MemoryTransport {
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let addresses: Vec<String> = addresses.into_iter().map(Into::into).collect();
        let servers = addresses
            .iter()
            .map(|a| (a.clone(), ServerState::default()))
            .collect();
        Self {
            addresses,
            servers: Mutex::new(servers),
            groups: Mutex::new(BTreeMap::new()),
            supersede: SupersedeBehavior::default(),
        }
    }

    pub fn with_supersede(mut self, behavior: SupersedeBehavior) -> Self {
        self.supersede = behavior;
        self
    }

    pub fn addresses(&self) -> Vec<String> {
        self.addresses.clone()
    }

    pub fn set_fault(&self, address: &str, fault: Fault) {
        if let Some(server) = self.servers.lock().get_mut(address) {
            server.fault = fault;
        }
    }

    pub fn set_reachable(&self, address: &str, reachable: bool) {
        let fault = if reachable { Fault::None } else { Fault::Unreachable };
        self.set_fault(address, fault);
    }

    /// Delay every response from `address`.
    pub fn set_latency(&self, address: &str, latency: Duration) {
        if let Some(server) = self.servers.lock().get_mut(address) {
            server.latency = latency;
        }
    }

    pub fn calls_to(&self, address: &str) -> u64 {
        self.servers.lock().get(address).map_or(0, |s| s.calls)
    }

    pub fn total_calls(&self) -> u64 {
        self.servers.lock().values().map(|s| s.calls).sum()
    }

    pub fn reset_calls(&self) {
        for server in self.servers.lock().values_mut() {
            server.calls = 0;
        }
    }

    fn apply(&self, request: &DiscoveryRequest) -> Result<DiscoveryResponse, TransportError> {
        let now = Instant::now();
        let mut groups = self.groups.lock();
        purge_expired(&mut groups, now);

        match request {
            DiscoveryRequest::Heartbeat(req) => self.heartbeat(&mut groups, req, now),
            DiscoveryRequest::GetGroupMeta { group_path } => {
                let members = lookup(&groups, group_path)?;
                Ok(DiscoveryResponse::GroupMeta(GroupMeta {
                    member_count: members.len() as i32,
                }))
            }
            DiscoveryRequest::ListMembers(req) => list(&groups, req),
        }
    }

    fn heartbeat(
        &self,
        groups: &mut Groups,
        req: &HeartbeatRequest,
        now: Instant,
    ) -> Result<DiscoveryResponse, TransportError> {
        if req.group_path.is_empty() || req.member_id.is_empty() || req.lease_timeout_micros <= 0 {
            return Err(TransportError::remote(
                RemoteCode::InvalidArgument,
                "malformed heartbeat",
            ));
        }

        let member = Member {
            id: req.member_id.clone(),
            priority: req.priority,
            revision: req.revision,
            attributes: req.attributes.clone(),
        };
        let group = groups.entry(req.group_path.clone()).or_default();

        if let Some(held) = group.get(&req.member_id) {
            if held.member.rank() > member.rank() {
                debug!(
                    group = %req.group_path,
                    member = %req.member_id,
                    held = ?held.member.rank(),
                    offered = ?member.rank(),
                    "lower-ranked heartbeat"
                );
                return match self.supersede {
                    SupersedeBehavior::Reject => Err(TransportError::remote(
                        RemoteCode::Superseded,
                        format!(
                            "member {:?} is held at priority {} revision {}",
                            req.member_id, held.member.priority, held.member.revision
                        ),
                    )),
                    SupersedeBehavior::Ignore => Ok(DiscoveryResponse::Heartbeat),
                };
            }
        }

        let lease = Duration::from_micros(req.lease_timeout_micros as u64);
        group.insert(
            req.member_id.clone(),
            Record {
                member,
                expires_at: now + lease,
            },
        );
        Ok(DiscoveryResponse::Heartbeat)
    }
}

#[tonic::async_trait]
impl Transport for MemoryTransport {
    async fn call(
        &self,
        address: &str,
        request: &DiscoveryRequest,
    ) -> Result<DiscoveryResponse, TransportError> {
        let (fault, latency) = {
            let mut servers = self.servers.lock();
            let server = servers
                .get_mut(address)
                .ok_or_else(|| TransportError::Unreachable(format!("no server at {address}")))?;
            server.calls += 1;
            (server.fault, server.latency)
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        match fault {
            Fault::Unreachable => Err(TransportError::Unreachable("connection refused".into())),
            Fault::Unavailable => Err(TransportError::Unavailable("server is not ready".into())),
            Fault::None => self.apply(request),
        }
    }
}

fn purge_expired(groups: &mut Groups, now: Instant) {
    groups.retain(|_, members| {
        members.retain(|_, record| record.expires_at > now);
        !members.is_empty()
    });
}

fn lookup<'a>(
    groups: &'a Groups,
    group_path: &str,
) -> Result<&'a HashMap<String, Record>, TransportError> {
    groups.get(group_path).ok_or_else(|| {
        TransportError::remote(RemoteCode::NotFound, format!("no such group {group_path:?}"))
    })
}

fn list(groups: &Groups, req: &ListMembersRequest) -> Result<DiscoveryResponse, TransportError> {
    if matches!(req.limit, Some(limit) if limit <= 0) {
        return Err(TransportError::remote(
            RemoteCode::InvalidArgument,
            "limit must be positive",
        ));
    }

    let records = lookup(groups, &req.group_path)?;
    let mut members: Vec<Member> = records
        .values()
        .map(|record| {
            let mut member = record.member.clone();
            if !req.attribute_keys.is_empty() {
                member
                    .attributes
                    .retain(|a| req.attribute_keys.iter().any(|k| *k == a.key));
            }
            member
        })
        .collect();

    members.sort_by(|a, b| (Reverse(a.priority), &a.id).cmp(&(Reverse(b.priority), &b.id)));
    if let Some(limit) = req.limit {
        members.truncate(limit as usize);
    }
    Ok(DiscoveryResponse::Members(members))
}
