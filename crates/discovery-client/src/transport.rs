//! Logical request/response shapes and the transport seam.
//!
//! A [`Transport`] sends one request to one server address. It never
//! retries; failover is the dispatcher's job.

use discovery_types::{Attribute, GroupMeta, LeaseTimeoutMicros, Member};

use crate::error::TransportError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatRequest {
    pub group_path: String,
    pub member_id: String,
    pub priority: i64,
    pub revision: i64,
    pub attributes: Vec<Attribute>,
    pub lease_timeout_micros: LeaseTimeoutMicros,
}

impl HeartbeatRequest {
    pub fn new(group_path: &str, member: &Member, lease_timeout_micros: LeaseTimeoutMicros) -> Self {
        Self {
            group_path: group_path.to_string(),
            member_id: member.id.clone(),
            priority: member.priority,
            revision: member.revision,
            attributes: member.attributes.clone(),
            lease_timeout_micros,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListMembersRequest {
    pub group_path: String,
    pub limit: Option<i32>,
    pub attribute_keys: Vec<String>,
}

/// A request understood by a discovery server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryRequest {
    Heartbeat(HeartbeatRequest),
    GetGroupMeta { group_path: String },
    ListMembers(ListMembersRequest),
}

impl DiscoveryRequest {
    /// Short method name, for logs.
    pub fn method(&self) -> &'static str {
        match self {
            DiscoveryRequest::Heartbeat(_) => "Heartbeat",
            DiscoveryRequest::GetGroupMeta { .. } => "GetGroupMeta",
            DiscoveryRequest::ListMembers(_) => "ListMembers",
        }
    }

    pub fn group_path(&self) -> &str {
        match self {
            DiscoveryRequest::Heartbeat(req) => &req.group_path,
            DiscoveryRequest::GetGroupMeta { group_path } => group_path,
            DiscoveryRequest::ListMembers(req) => &req.group_path,
        }
    }

    pub fn member_id(&self) -> Option<&str> {
        match self {
            DiscoveryRequest::Heartbeat(req) => Some(&req.member_id),
            _ => None,
        }
    }
}

/// A successful server response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryResponse {
    Heartbeat,
    GroupMeta(GroupMeta),
    Members(Vec<Member>),
}

/// Sends a single request to a single discovery server.
#[tonic::async_trait]
pub trait Transport: Send + Sync {
    async fn call(
        &self,
        address: &str,
        request: &DiscoveryRequest,
    ) -> Result<DiscoveryResponse, TransportError>;
}
