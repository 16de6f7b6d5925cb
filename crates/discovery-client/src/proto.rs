//! Wire messages for the discovery gRPC service.
//!
//! ```text
//! service DiscoveryService {
//!   rpc Heartbeat(HeartbeatRequest) returns (HeartbeatResponse);
//!   rpc GetGroupMeta(GetGroupMetaRequest) returns (GetGroupMetaResponse);
//!   rpc ListMembers(ListMembersRequest) returns (ListMembersResponse);
//! }
//! ```

use discovery_types as model;

pub const HEARTBEAT_PATH: &str = "/discovery.v1.DiscoveryService/Heartbeat";
pub const GET_GROUP_META_PATH: &str = "/discovery.v1.DiscoveryService/GetGroupMeta";
pub const LIST_MEMBERS_PATH: &str = "/discovery.v1.DiscoveryService/ListMembers";

#[derive(Clone, PartialEq, prost::Message)]
pub struct Attribute {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(bytes = "vec", tag = "2")]
    pub value: Vec<u8>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct MemberInfo {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(int64, tag = "2")]
    pub priority: i64,
    #[prost(int64, tag = "3")]
    pub revision: i64,
    #[prost(message, repeated, tag = "4")]
    pub attributes: Vec<Attribute>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct HeartbeatRequest {
    #[prost(string, tag = "1")]
    pub group_path: String,
    #[prost(message, optional, tag = "2")]
    pub member: Option<MemberInfo>,
    /// Microseconds.
    #[prost(int64, tag = "3")]
    pub lease_timeout: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct HeartbeatResponse {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GetGroupMetaRequest {
    #[prost(string, tag = "1")]
    pub group_path: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GroupMeta {
    #[prost(int32, tag = "1")]
    pub member_count: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GetGroupMetaResponse {
    #[prost(message, optional, tag = "1")]
    pub meta: Option<GroupMeta>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ListMembersOptions {
    #[prost(int32, optional, tag = "1")]
    pub limit: Option<i32>,
    #[prost(string, repeated, tag = "2")]
    pub attribute_keys: Vec<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ListMembersRequest {
    #[prost(string, tag = "1")]
    pub group_path: String,
    #[prost(message, optional, tag = "2")]
    pub options: Option<ListMembersOptions>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ListMembersResponse {
    #[prost(message, repeated, tag = "1")]
    pub members: Vec<MemberInfo>,
}

// ── Conversions ────────────────────────────────────────────────────

impl From<&model::Attribute> for Attribute {
    fn from(a: &model::Attribute) -> Self {
        Self {
            key: a.key.clone(),
            value: a.value.clone(),
        }
    }
}

impl From<Attribute> for model::Attribute {
    fn from(a: Attribute) -> Self {
        Self {
            key: a.key,
            value: a.value,
        }
    }
}

impl From<MemberInfo> for model::Member {
    fn from(m: MemberInfo) -> Self {
        Self {
            id: m.id,
            priority: m.priority,
            revision: m.revision,
            attributes: m.attributes.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<&crate::transport::HeartbeatRequest> for HeartbeatRequest {
    fn from(req: &crate::transport::HeartbeatRequest) -> Self {
        Self {
            group_path: req.group_path.clone(),
            member: Some(MemberInfo {
                id: req.member_id.clone(),
                priority: req.priority,
                revision: req.revision,
                attributes: req.attributes.iter().map(Into::into).collect(),
            }),
            lease_timeout: req.lease_timeout_micros,
        }
    }
}

impl From<&crate::transport::ListMembersRequest> for ListMembersRequest {
    fn from(req: &crate::transport::ListMembersRequest) -> Self {
        Self {
            group_path: req.group_path.clone(),
            options: Some(ListMembersOptions {
                limit: req.limit,
                attribute_keys: req.attribute_keys.clone(),
            }),
        }
    }
}
