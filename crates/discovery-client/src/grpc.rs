//! gRPC transport backed by tonic.
//!
//! Channels are established on first use and cached per address. A
//! transport-level failure drops the cached channel so the next attempt
//! reconnects.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Status};
use tracing::{debug, warn};

use discovery_types::GroupMeta;

use crate::error::{RemoteCode, TransportError};
use crate::proto;
use crate::transport::{DiscoveryRequest, DiscoveryResponse, Transport};

pub struct GrpcTransport {
    connect_timeout: Duration,
    channels: Mutex<HashMap<String, Channel>>,
}

impl GrpcTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            channels: Mutex::new(HashMap::new()),
        }
    }

    async fn channel(&self, address: &str) -> Result<Channel, TransportError> {
        if let Some(channel) = self.channels.lock().get(address).cloned() {
            return Ok(channel);
        }

        let endpoint = format!("http://{address}");
        let ep = Endpoint::from_shared(endpoint.clone())
            .map_err(|e| TransportError::Unreachable(format!("invalid endpoint {endpoint}: {e}")))?
            .connect_timeout(self.connect_timeout);

        let channel = ep.connect().await.map_err(|e| {
            warn!(%address, error = %e, "failed to connect to discovery server");
            TransportError::Unreachable(format!("connect to {endpoint}: {e}"))
        })?;

        debug!(%address, "connected to discovery server");
        self.channels
            .lock()
            .insert(address.to_string(), channel.clone());
        Ok(channel)
    }

    fn forget(&self, address: &str) {
        self.channels.lock().remove(address);
    }

    async fn send(
        &self,
        address: &str,
        request: &DiscoveryRequest,
    ) -> Result<DiscoveryResponse, TransportError> {
        let channel = self.channel(address).await?;

        match request {
            DiscoveryRequest::Heartbeat(req) => {
                let _: proto::HeartbeatResponse =
                    unary(channel, proto::HEARTBEAT_PATH, proto::HeartbeatRequest::from(req))
                        .await
                        .map_err(|s| classify(&s))?;
                Ok(DiscoveryResponse::Heartbeat)
            }
            DiscoveryRequest::GetGroupMeta { group_path } => {
                let resp: proto::GetGroupMetaResponse = unary(
                    channel,
                    proto::GET_GROUP_META_PATH,
                    proto::GetGroupMetaRequest {
                        group_path: group_path.clone(),
                    },
                )
                .await
                .map_err(|s| classify(&s))?;
                Ok(DiscoveryResponse::GroupMeta(group_meta(resp)?))
            }
            DiscoveryRequest::ListMembers(req) => {
                let resp: proto::ListMembersResponse = unary(
                    channel,
                    proto::LIST_MEMBERS_PATH,
                    proto::ListMembersRequest::from(req),
                )
                .await
                .map_err(|s| classify(&s))?;
                Ok(DiscoveryResponse::Members(
                    resp.members.into_iter().map(Into::into).collect(),
                ))
            }
        }
    }
}

#[tonic::async_trait]
impl Transport for GrpcTransport {
    async fn call(
        &self,
        address: &str,
        request: &DiscoveryRequest,
    ) -> Result<DiscoveryResponse, TransportError> {
        let result = self.send(address, request).await;
        if matches!(&result, Err(e) if e.is_transient()) {
            self.forget(address);
        }
        result
    }
}

async fn unary<Req, Resp>(channel: Channel, path: &'static str, request: Req) -> Result<Resp, Status>
where
    Req: prost::Message + Send + Sync + 'static,
    Resp: prost::Message + Default + Send + Sync + 'static,
{
    let mut grpc = tonic::client::Grpc::new(channel);
    grpc.ready()
        .await
        .map_err(|e| Status::unavailable(format!("service not ready: {e}")))?;

    let codec = tonic::codec::ProstCodec::<Req, Resp>::default();
    let response = grpc
        .unary(
            tonic::Request::new(request),
            PathAndQuery::from_static(path),
            codec,
        )
        .await?;
    Ok(response.into_inner())
}

/// A reply without metadata came from a live server, so it is a
/// rejection rather than a reason to fail over.
fn group_meta(resp: proto::GetGroupMetaResponse) -> Result<GroupMeta, TransportError> {
    resp.meta
        .map(|meta| GroupMeta {
            member_count: meta.member_count,
        })
        .ok_or_else(|| TransportError::remote(RemoteCode::Rejected, "response missing group meta"))
}

/// Map a gRPC status onto the transport taxonomy.
pub fn classify(status: &Status) -> TransportError {
    let message = status.message().to_string();
    match status.code() {
        Code::NotFound => TransportError::remote(RemoteCode::NotFound, message),
        Code::InvalidArgument => TransportError::remote(RemoteCode::InvalidArgument, message),
        Code::FailedPrecondition => TransportError::remote(RemoteCode::Superseded, message),
        Code::Unavailable
        | Code::DeadlineExceeded
        | Code::ResourceExhausted
        | Code::Aborted
        | Code::Internal
        | Code::Unknown
        | Code::Cancelled => TransportError::Unavailable(format!("{:?}: {message}", status.code())),
        code => TransportError::remote(RemoteCode::Rejected, format!("{code:?}: {message}")),
    }
}
